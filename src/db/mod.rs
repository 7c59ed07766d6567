//! Catalog store access.
//!
//! Uses SQLx with SQLite. Connection setup enables WAL journaling and
//! foreign keys; schema lives in `./migrations` and is applied
//! idempotently by [`init_db`].
//!
//! Mutating the catalog during a pipeline pass is the single writer's
//! job ([`crate::writer`]); the queries here are either reads or the
//! explicit maintenance operations (`soft_clear`, `hard_reset`).

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::model::{Album, Track, TrackStatus};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_catalog.db";

/// Build a SQLite database URL from a path.
pub fn db_url(path: &Path) -> String {
    format!("sqlite:{}", path.display())
}

/// Current time as fixed-width RFC 3339 UTC, safe for lexicographic
/// comparison in SQL.
pub fn now_iso() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Initialize the connection pool and run migrations.
///
/// Creates the database file if it doesn't exist and applies all pending
/// migrations; safe to call repeatedly.
///
/// # Errors
///
/// Returns an error if the file cannot be created, the connection fails,
/// or a migration fails - all fatal at startup per the error taxonomy.
pub async fn init_db(db_url: &str) -> crate::error::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_url)
        .map_err(sqlx::Error::from)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// All album rows, ordered by folder path.
pub async fn all_albums(pool: &SqlitePool) -> sqlx::Result<Vec<Album>> {
    sqlx::query_as::<_, Album>("SELECT * FROM album ORDER BY folder_path")
        .fetch_all(pool)
        .await
}

/// All track rows belonging to one album.
pub async fn tracks_for_album(pool: &SqlitePool, album_id: i64) -> sqlx::Result<Vec<Track>> {
    sqlx::query_as::<_, Track>("SELECT * FROM track WHERE album_id = ? ORDER BY path")
        .bind(album_id)
        .fetch_all(pool)
        .await
}

/// Look up a track by its unique path.
pub async fn track_by_path(pool: &SqlitePool, path: &str) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>("SELECT * FROM track WHERE path = ?")
        .bind(path)
        .fetch_optional(pool)
        .await
}

/// Select the dirty queue: tracks whose full tags are stale or unread.
///
/// Album-grouped order keeps related tracks' completion close together;
/// no ordering is load-bearing for correctness. A limit of 0 means no
/// limit.
pub async fn select_dirty(pool: &SqlitePool, limit: u32) -> sqlx::Result<Vec<Track>> {
    let mut sql = format!(
        "SELECT * FROM track \
         WHERE status IN ('{}', '{}', '{}') AND is_missing = 0 \
         ORDER BY album_id, path",
        TrackStatus::DirtyMeta.as_str(),
        TrackStatus::New.as_str(),
        TrackStatus::DeepPending.as_str(),
    );
    if limit > 0 {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sqlx::query_as::<_, Track>(&sql).fetch_all(pool).await
}

/// Soft clear: delete catalog rows, keep the schema and the run ledger.
pub async fn soft_clear(pool: &SqlitePool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM track").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM disc").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM album").execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Hard reset: remove the store files entirely. The caller re-creates
/// the schema with [`init_db`] afterwards.
pub fn hard_reset(db_path: &Path) -> std::io::Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        let path = std::path::PathBuf::from(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
