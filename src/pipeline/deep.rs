//! The deep pass: full tag extraction for the dirty queue.
//!
//! Works from the store, not the filesystem: any track whose status is
//! dirty (and not missing) gets a full tag read, a normalized digest,
//! and a `TAGGED` or `ERROR` outcome. Re-running the pass retries
//! whatever stayed dirty; a limit caps one run without losing the rest.

use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use sqlx::sqlite::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::Result;
use crate::ledger;
use crate::probe;
use crate::writer::Intent;

use super::{RunSummary, interrupt_flag, join_writer, spawn_writer};

/// Run the deep pass over the dirty queue. `limit` of 0 means no limit.
pub async fn run_deep(pool: &SqlitePool, config: &Config, limit: u32) -> Result<RunSummary> {
    let started = Instant::now();
    let dirty = db::select_dirty(pool, limit).await?;
    tracing::info!(queued = dirty.len(), limit, "deep pass starting");

    let run = ledger::begin_run(pool, "deep", &config.hash()?).await?;
    let (tx, writer) = spawn_writer(pool, config.inventory.batch_size, run.run_id);
    let (stop, watcher) = interrupt_flag();

    let workers = config.inventory.workers.max(1);
    futures::stream::iter(dirty)
        .for_each_concurrent(workers, |track| {
            let tx = tx.clone();
            let stop = Arc::clone(&stop);
            async move {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                let path = PathBuf::from(&track.path);
                let outcome = match tokio::task::spawn_blocking(move || probe::extract(&path))
                    .await
                {
                    Ok(Ok(snapshot)) => Ok(probe::digest_tags(&snapshot)),
                    Ok(Err(reason)) => Err(reason),
                    Err(e) => Err(format!("extract task failed: {e}")),
                };
                let intent = Intent::DeepOutcome {
                    path: track.path,
                    outcome,
                };
                if tx.send(intent).await.is_err() {
                    stop.store(true, Ordering::Relaxed);
                }
            }
        })
        .await;

    drop(tx);
    let report = join_writer(writer).await?;
    watcher.abort();
    ledger::finalize_run(pool, &run, report.processed).await?;

    let summary = RunSummary {
        run_id: run.run_id,
        processed: report.processed,
        rejected: report.rejected,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    tracing::info!(
        run_id = summary.run_id,
        extracted = summary.processed,
        rejected = summary.rejected,
        duration_ms = summary.duration_ms,
        "deep pass complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::run_fast;
    use crate::test_utils::{temp_db, test_config, write_wav};
    use std::fs;

    #[tokio::test]
    async fn test_deep_tags_dirty_tracks() {
        let (pool, dir) = temp_db().await;
        let root = dir.path().join("library");
        let album = root.join("Artist - Album");
        fs::create_dir_all(&album).unwrap();
        write_wav(&album.join("01.wav"), 300);
        write_wav(&album.join("02.wav"), 400);
        let config = test_config(&root, &dir.path().join("test.db"));
        run_fast(&pool, &config, 2).await.unwrap();

        let summary = run_deep(&pool, &config, 0).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.rejected, 0);

        let track = crate::db::track_by_path(&pool, &album.join("01.wav").display().to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(track.status, "TAGGED");
        assert!(track.tag_digest.is_some());
        assert!(track.last_error.is_none());
    }

    #[tokio::test]
    async fn test_deep_limit_converges_over_runs() {
        let (pool, dir) = temp_db().await;
        let root = dir.path().join("library");
        let album = root.join("Artist - Album");
        fs::create_dir_all(&album).unwrap();
        for i in 0..5 {
            write_wav(&album.join(format!("0{i}.wav")), 300 + i);
        }
        let config = test_config(&root, &dir.path().join("test.db"));
        run_fast(&pool, &config, 2).await.unwrap();

        let first = run_deep(&pool, &config, 2).await.unwrap();
        assert_eq!(first.processed, 2);
        assert_eq!(crate::db::select_dirty(&pool, 0).await.unwrap().len(), 3);

        let second = run_deep(&pool, &config, 2).await.unwrap();
        assert_eq!(second.processed, 2);
        let third = run_deep(&pool, &config, 2).await.unwrap();
        assert_eq!(third.processed, 1);
        assert!(crate::db::select_dirty(&pool, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deep_failure_records_error() {
        let (pool, dir) = temp_db().await;
        let root = dir.path().join("library");
        let album = root.join("Artist - Album");
        fs::create_dir_all(&album).unwrap();
        write_wav(&album.join("01.wav"), 300);
        let config = test_config(&root, &dir.path().join("test.db"));
        run_fast(&pool, &config, 2).await.unwrap();

        // corrupt the file between fast and deep
        fs::write(album.join("01.wav"), b"no longer audio").unwrap();
        run_deep(&pool, &config, 0).await.unwrap();

        let track = crate::db::track_by_path(&pool, &album.join("01.wav").display().to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(track.status, "ERROR");
        assert!(track.last_error.is_some());
        assert!(track.tag_digest.is_none());
    }

    #[tokio::test]
    async fn test_deep_with_empty_queue_is_a_noop() {
        let (pool, dir) = temp_db().await;
        let config = test_config(dir.path(), &dir.path().join("test.db"));
        let summary = run_deep(&pool, &config, 0).await.unwrap();
        assert_eq!(summary.processed, 0);
    }
}
