//! The single writer.
//!
//! All catalog mutation funnels through one task consuming [`Intent`]s
//! from a bounded channel. Producers (probe pool, fingerprint engine,
//! deep extractor) hold only the channel sender, never a store handle;
//! the type boundary, not convention, is what enforces the one-writer
//! rule.
//!
//! Intents are applied inside transactions bounded by a batch size:
//! commit every K intents or at stream end, whichever comes first. A
//! crash or store failure therefore leaves only whole committed batches.
//! Upserts are keyed by path/folder id, so intents arriving out of
//! album-grouping order are always safe; within one task no two
//! mutations to the same row ever race.

use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::db::now_iso;
use crate::error::{Error, Result};
use crate::model::{AlbumStatus, TrackStatus};
use crate::probe::HeaderFacts;

/// Log progress every this many applied intents.
const PROGRESS_EVERY: u64 = 2000;

/// A mutation intent produced by one of the pipeline passes.
#[derive(Debug)]
pub enum Intent {
    /// FAST: per-file header probe result, success or per-file failure.
    UpsertFast(Box<FastUpsert>),
    /// CHANGED: stat-level upsert for a new or changed file.
    UpsertStat(StatUpsert),
    /// CHANGED: an unchanged album - touch last_seen/seen_run_id only.
    MarkAlbumSeen { album_id: i64 },
    /// CHANGED: a previously cataloged path is gone; flag, never delete.
    MarkMissing { path: String },
    /// CHANGED: store the recomputed album fingerprint.
    SetAlbumFingerprint { album_id: i64, fingerprint: String },
    /// DEEP: extraction finished; digest on success, reason on failure.
    DeepOutcome {
        path: String,
        outcome: std::result::Result<String, String>,
    },
}

/// Album/disc/track facts for one FAST-probed file.
#[derive(Debug)]
pub struct FastUpsert {
    pub album: AlbumFacts,
    pub disc: Option<DiscFacts>,
    pub path: String,
    pub probe: std::result::Result<HeaderFacts, String>,
}

#[derive(Debug, Clone)]
pub struct AlbumFacts {
    pub id: i64,
    pub folder_path: String,
    pub folder_artist: Option<String>,
    pub folder_title: Option<String>,
    pub tier: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiscFacts {
    pub number: i64,
    pub title: Option<String>,
    pub path: String,
}

/// Stat-only upsert from the changed pass. `status` is `New` for a
/// newly present path, `DirtyMeta` for a changed one.
#[derive(Debug)]
pub struct StatUpsert {
    pub path: String,
    pub album_id: i64,
    pub size_bytes: i64,
    pub mtime_ns: i64,
    pub codec_hint: Option<String>,
    pub status: TrackStatus,
}

/// What the writer did with the intent stream.
#[derive(Debug, Default)]
pub struct WriterReport {
    /// Intents applied (and eventually committed)
    pub processed: u64,
    /// Intents rejected by state-machine validation
    pub rejected: u64,
}

/// Consume intents until the channel closes, committing every
/// `batch_size` intents. On a store failure the current transaction is
/// abandoned and the error surfaces immediately: no further commits this
/// run, already committed batches remain valid.
pub async fn run_writer(
    pool: SqlitePool,
    mut rx: mpsc::Receiver<Intent>,
    batch_size: usize,
    run_id: i64,
) -> Result<WriterReport> {
    let batch_size = batch_size.max(1);
    let started = Instant::now();
    let mut report = WriterReport::default();
    let mut in_batch = 0usize;

    let mut tx = pool.begin().await?;

    while let Some(intent) = rx.recv().await {
        match apply(&mut tx, intent, run_id).await? {
            Applied::Yes => report.processed += 1,
            Applied::Rejected => report.rejected += 1,
        }
        in_batch += 1;

        if in_batch >= batch_size {
            tx.commit().await?;
            tx = pool.begin().await?;
            in_batch = 0;
        }

        if report.processed > 0 && report.processed % PROGRESS_EVERY == 0 {
            let rate = report.processed as f64 / started.elapsed().as_secs_f64().max(1e-6);
            tracing::info!(
                processed = report.processed,
                rate = format!("{rate:.1}/s"),
                "writer progress"
            );
        }
    }

    tx.commit().await?;

    if report.processed > 0 {
        refresh_aggregates(&pool).await?;
    }

    Ok(report)
}

enum Applied {
    Yes,
    Rejected,
}

async fn apply(
    tx: &mut Transaction<'_, Sqlite>,
    intent: Intent,
    run_id: i64,
) -> Result<Applied> {
    match intent {
        Intent::UpsertFast(fast) => apply_fast(tx, *fast, run_id).await,
        Intent::UpsertStat(stat) => apply_stat(tx, stat, run_id).await,
        Intent::MarkAlbumSeen { album_id } => {
            sqlx::query(
                "UPDATE track SET last_seen = ?, seen_run_id = ? \
                 WHERE album_id = ? AND is_missing = 0",
            )
            .bind(now_iso())
            .bind(run_id)
            .bind(album_id)
            .execute(&mut **tx)
            .await?;
            Ok(Applied::Yes)
        }
        Intent::MarkMissing { path } => {
            sqlx::query("UPDATE track SET is_missing = 1 WHERE path = ?")
                .bind(&path)
                .execute(&mut **tx)
                .await?;
            Ok(Applied::Yes)
        }
        Intent::SetAlbumFingerprint {
            album_id,
            fingerprint,
        } => {
            sqlx::query(
                "UPDATE album SET album_fingerprint = ?, status = ?, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(&fingerprint)
            .bind(AlbumStatus::Cataloged.as_str())
            .bind(now_iso())
            .bind(album_id)
            .execute(&mut **tx)
            .await?;
            Ok(Applied::Yes)
        }
        Intent::DeepOutcome { path, outcome } => apply_deep(tx, &path, outcome).await,
    }
}

async fn apply_fast(
    tx: &mut Transaction<'_, Sqlite>,
    fast: FastUpsert,
    run_id: i64,
) -> Result<Applied> {
    let now = now_iso();

    sqlx::query(
        r#"
        INSERT INTO album (id, folder_path, folder_artist, folder_title, tier_declared, status, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            folder_path   = excluded.folder_path,
            folder_artist = COALESCE(excluded.folder_artist, album.folder_artist),
            folder_title  = COALESCE(excluded.folder_title,  album.folder_title),
            tier_declared = COALESCE(excluded.tier_declared, album.tier_declared),
            updated_at    = excluded.updated_at
        "#,
    )
    .bind(fast.album.id)
    .bind(&fast.album.folder_path)
    .bind(&fast.album.folder_artist)
    .bind(&fast.album.folder_title)
    .bind(&fast.album.tier)
    .bind(AlbumStatus::Partial.as_str())
    .bind(&now)
    .execute(&mut **tx)
    .await?;

    let disc_id: Option<i64> = match &fast.disc {
        Some(disc) => {
            let row: (i64,) = sqlx::query_as(
                r#"
                INSERT INTO disc (album_id, disc_number, disc_title, path)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(album_id, disc_number) DO UPDATE SET
                    disc_title = COALESCE(excluded.disc_title, disc.disc_title),
                    path       = excluded.path
                RETURNING id
                "#,
            )
            .bind(fast.album.id)
            .bind(disc.number)
            .bind(&disc.title)
            .bind(&disc.path)
            .fetch_one(&mut **tx)
            .await?;
            Some(row.0)
        }
        None => None,
    };

    match fast.probe {
        Ok(facts) => {
            sqlx::query(
                r#"
                INSERT INTO track (path, album_id, disc_id, size_bytes, mtime_ns, codec,
                                   bit_depth, sample_rate_hz, channels, duration_sec,
                                   status, last_error, last_seen, seen_run_id, is_missing)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, 0)
                ON CONFLICT(path) DO UPDATE SET
                    album_id       = excluded.album_id,
                    disc_id        = excluded.disc_id,
                    size_bytes     = excluded.size_bytes,
                    mtime_ns       = excluded.mtime_ns,
                    codec          = excluded.codec,
                    bit_depth      = excluded.bit_depth,
                    sample_rate_hz = excluded.sample_rate_hz,
                    channels       = excluded.channels,
                    duration_sec   = excluded.duration_sec,
                    status         = excluded.status,
                    last_error     = NULL,
                    last_seen      = excluded.last_seen,
                    seen_run_id    = excluded.seen_run_id,
                    is_missing     = 0
                "#,
            )
            .bind(&fast.path)
            .bind(fast.album.id)
            .bind(disc_id)
            .bind(facts.size_bytes)
            .bind(facts.mtime_ns)
            .bind(&facts.codec)
            .bind(facts.bit_depth)
            .bind(facts.sample_rate_hz)
            .bind(facts.channels)
            .bind(facts.duration_sec)
            .bind(TrackStatus::DirtyMeta.as_str())
            .bind(&now)
            .bind(run_id)
            .execute(&mut **tx)
            .await?;
        }
        Err(reason) => {
            sqlx::query(
                r#"
                INSERT INTO track (path, album_id, disc_id, status, last_error, last_seen, seen_run_id, is_missing)
                VALUES (?, ?, ?, ?, ?, ?, ?, 0)
                ON CONFLICT(path) DO UPDATE SET
                    album_id    = excluded.album_id,
                    status      = excluded.status,
                    last_error  = excluded.last_error,
                    last_seen   = excluded.last_seen,
                    seen_run_id = excluded.seen_run_id,
                    is_missing  = 0
                "#,
            )
            .bind(&fast.path)
            .bind(fast.album.id)
            .bind(disc_id)
            .bind(TrackStatus::Error.as_str())
            .bind(&reason)
            .bind(&now)
            .bind(run_id)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(Applied::Yes)
}

async fn apply_stat(
    tx: &mut Transaction<'_, Sqlite>,
    stat: StatUpsert,
    run_id: i64,
) -> Result<Applied> {
    sqlx::query(
        r#"
        INSERT INTO track (path, album_id, size_bytes, mtime_ns, codec, status, last_seen, seen_run_id, is_missing)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
        ON CONFLICT(path) DO UPDATE SET
            album_id    = excluded.album_id,
            size_bytes  = excluded.size_bytes,
            mtime_ns    = excluded.mtime_ns,
            status      = excluded.status,
            last_seen   = excluded.last_seen,
            seen_run_id = excluded.seen_run_id,
            is_missing  = 0
        "#,
    )
    .bind(&stat.path)
    .bind(stat.album_id)
    .bind(stat.size_bytes)
    .bind(stat.mtime_ns)
    .bind(&stat.codec_hint)
    .bind(stat.status.as_str())
    .bind(now_iso())
    .bind(run_id)
    .execute(&mut **tx)
    .await?;
    Ok(Applied::Yes)
}

/// Apply a deep-extraction outcome, validating the status transition.
/// An invalid transition is rejected with a warning rather than written:
/// the state machine, not the producer, decides what a row may become.
async fn apply_deep(
    tx: &mut Transaction<'_, Sqlite>,
    path: &str,
    outcome: std::result::Result<String, String>,
) -> Result<Applied> {
    let current: Option<(String,)> = sqlx::query_as("SELECT status FROM track WHERE path = ?")
        .bind(path)
        .fetch_optional(&mut **tx)
        .await?;

    let Some((current,)) = current else {
        tracing::warn!(path, "deep outcome for unknown track, rejected");
        return Ok(Applied::Rejected);
    };
    let current = TrackStatus::from_str(&current)
        .map_err(|e| Error::WriterFailed(format!("corrupt status for {path}: {e}")))?;

    let target = match &outcome {
        Ok(_) => TrackStatus::Tagged,
        Err(_) => TrackStatus::Error,
    };
    if !current.can_transition(target) {
        tracing::warn!(
            path,
            from = current.as_str(),
            to = target.as_str(),
            "transition not allowed, rejected"
        );
        return Ok(Applied::Rejected);
    }

    match outcome {
        Ok(digest) => {
            sqlx::query(
                "UPDATE track SET status = ?, tag_digest = ?, last_error = NULL WHERE path = ?",
            )
            .bind(target.as_str())
            .bind(&digest)
            .bind(path)
            .execute(&mut **tx)
            .await?;
        }
        Err(reason) => {
            sqlx::query("UPDATE track SET status = ?, last_error = ? WHERE path = ?")
                .bind(target.as_str())
                .bind(&reason)
                .bind(path)
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(Applied::Yes)
}

/// Roll track facts up into album and disc aggregates. Runs once per
/// writer invocation, after the last batch commits.
async fn refresh_aggregates(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE album SET
            track_count = (SELECT COUNT(*) FROM track WHERE track.album_id = album.id AND track.is_missing = 0),
            item_count  = (SELECT COUNT(*) FROM track WHERE track.album_id = album.id),
            disc_count  = (SELECT COUNT(*) FROM disc WHERE disc.album_id = album.id),
            format_observed = (SELECT GROUP_CONCAT(DISTINCT codec) FROM track
                               WHERE track.album_id = album.id AND codec IS NOT NULL),
            bit_depth_set = (SELECT GROUP_CONCAT(DISTINCT bit_depth) FROM track
                             WHERE track.album_id = album.id AND bit_depth IS NOT NULL),
            sample_rates_set = (SELECT GROUP_CONCAT(DISTINCT sample_rate_hz) FROM track
                                WHERE track.album_id = album.id AND sample_rate_hz IS NOT NULL),
            dsd_rates_set = (SELECT GROUP_CONCAT(DISTINCT sample_rate_hz) FROM track
                             WHERE track.album_id = album.id AND codec = 'DSF'
                               AND sample_rate_hz IS NOT NULL)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "UPDATE disc SET track_count = \
         (SELECT COUNT(*) FROM track WHERE track.disc_id = disc.id AND track.is_missing = 0)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
