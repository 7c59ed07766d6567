//! Run ledger.
//!
//! Every pipeline invocation is wrapped by exactly one `run_event` row.
//! The row is created at run start so the run id exists for track
//! `seen_run_id` back-references; item count and duration are finalized
//! once when the run ends, regardless of success or partial failure.
//! Past rows are never touched again.

use sqlx::sqlite::SqlitePool;
use std::time::Instant;

use crate::db::now_iso;
use crate::error::Result;
use crate::model::RunEvent;

/// An open run ledger entry.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: i64,
    started: Instant,
}

/// Open a ledger row for this invocation.
pub async fn begin_run(pool: &SqlitePool, command: &str, config_hash: &str) -> Result<RunHandle> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO run_event (started_at, command, config_hash) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(now_iso())
    .bind(command)
    .bind(config_hash)
    .fetch_one(pool)
    .await?;

    tracing::debug!(run_id = row.0, command, "run ledger opened");
    Ok(RunHandle {
        run_id: row.0,
        started: Instant::now(),
    })
}

/// Finalize the ledger row with the item count and wall-clock duration.
pub async fn finalize_run(pool: &SqlitePool, handle: &RunHandle, items: u64) -> Result<()> {
    let duration_ms = handle.started.elapsed().as_millis() as i64;
    sqlx::query("UPDATE run_event SET items_processed = ?, duration_ms = ? WHERE id = ?")
        .bind(items as i64)
        .bind(duration_ms)
        .bind(handle.run_id)
        .execute(pool)
        .await?;
    tracing::debug!(run_id = handle.run_id, items, duration_ms, "run ledger finalized");
    Ok(())
}

/// The most recent ledger row, if any.
pub async fn latest_run(pool: &SqlitePool) -> sqlx::Result<Option<RunEvent>> {
    sqlx::query_as::<_, RunEvent>("SELECT * FROM run_event ORDER BY id DESC LIMIT 1")
        .fetch_optional(pool)
        .await
}
