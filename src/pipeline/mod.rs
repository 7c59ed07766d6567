//! The inventory pipeline.
//!
//! Three passes over the library, cheapest first:
//! - `fast`: walk everything, header-probe every track concurrently
//! - `changed`: stat-only reconciliation against stored fingerprints
//! - `deep`: full tag extraction for the dirty queue
//!
//! Each pass follows the same shape: open a run ledger row, spawn the
//! single writer, stream intents into it, close the channel, join the
//! writer, finalize the ledger. Producers only ever hold the intent
//! sender.

use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::writer::{Intent, WriterReport, run_writer};

pub mod changed;
pub mod deep;
pub mod fast;

pub use changed::run_changed;
pub use deep::run_deep;
pub use fast::run_fast;

/// Intents buffered between producers and the writer. Small on purpose:
/// backpressure here is what keeps probing from racing ahead of commits.
const INTENT_BUFFER: usize = 256;

/// What one pipeline pass did.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: i64,
    /// Intents applied by the writer
    pub processed: u64,
    /// Intents rejected by state-machine validation
    pub rejected: u64,
    pub duration_ms: u64,
}

/// Spawn the single writer for this pass.
fn spawn_writer(
    pool: &SqlitePool,
    batch_size: usize,
    run_id: i64,
) -> (mpsc::Sender<Intent>, JoinHandle<Result<WriterReport>>) {
    let (tx, rx) = mpsc::channel(INTENT_BUFFER);
    let handle = tokio::spawn(run_writer(pool.clone(), rx, batch_size, run_id));
    (tx, handle)
}

/// Join the writer after the last sender is dropped.
async fn join_writer(handle: JoinHandle<Result<WriterReport>>) -> Result<WriterReport> {
    handle
        .await
        .map_err(|e| Error::WriterFailed(e.to_string()))?
}

/// A flag flipped by Ctrl-C. Passes poll it between units of work and
/// wind down with everything already sent still committed.
fn interrupt_flag() -> (Arc<AtomicBool>, JoinHandle<()>) {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing in-flight work");
            flag.store(true, Ordering::Relaxed);
        }
    });
    (stop, watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::select_dirty;
    use crate::test_utils::{temp_db, test_config, touch_grow, write_wav};
    use std::fs;

    /// Two albums, five tracks, the full three-pass life cycle.
    #[tokio::test]
    async fn test_end_to_end_pipeline() {
        let (pool, dir) = temp_db().await;
        let root = dir.path().join("library");
        let a = root.join("Alpha - First");
        let b = root.join("Beta - Second");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        for i in 1..=3 {
            write_wav(&a.join(format!("0{i}.wav")), 400 + i);
        }
        write_wav(&b.join("01.wav"), 500);
        write_wav(&b.join("02.wav"), 600);
        let config = test_config(&root, &dir.path().join("test.db"));

        let summary = run_fast(&pool, &config, config.inventory.workers)
            .await
            .unwrap();
        assert_eq!(summary.processed, 5);

        let albums = crate::db::all_albums(&pool).await.unwrap();
        assert_eq!(albums.len(), 2);
        assert!(albums.iter().all(|a| a.status == "PARTIAL"));
        assert_eq!(select_dirty(&pool, 0).await.unwrap().len(), 5);

        // deep drains the dirty queue
        let summary = run_deep(&pool, &config, 0).await.unwrap();
        assert_eq!(summary.processed, 5);
        assert!(select_dirty(&pool, 0).await.unwrap().is_empty());

        // changed settles the fingerprints
        run_changed(&pool, &config, 0).await.unwrap();
        let albums = crate::db::all_albums(&pool).await.unwrap();
        assert!(albums.iter().all(|a| a.status == "CATALOGED"));
        assert!(albums.iter().all(|a| a.album_fingerprint.is_some()));

        // touch one file: exactly one track re-enters the dirty queue
        touch_grow(&a.join("01.wav"));
        run_changed(&pool, &config, 0).await.unwrap();
        let dirty = select_dirty(&pool, 0).await.unwrap();
        assert_eq!(dirty.len(), 1);
        assert!(dirty[0].path.ends_with("01.wav"));
        assert_eq!(dirty[0].status, "DIRTY_META");
    }

    #[tokio::test]
    async fn test_fast_pass_is_idempotent() {
        let (pool, dir) = temp_db().await;
        let root = dir.path().join("library");
        let album = root.join("Solo - Album");
        fs::create_dir_all(&album).unwrap();
        write_wav(&album.join("01.wav"), 300);
        let config = test_config(&root, &dir.path().join("test.db"));

        run_fast(&pool, &config, 2).await.unwrap();
        let first = crate::db::all_albums(&pool).await.unwrap();
        let first_track = crate::db::select_dirty(&pool, 0).await.unwrap();

        run_fast(&pool, &config, 2).await.unwrap();
        let second = crate::db::all_albums(&pool).await.unwrap();
        let second_track = crate::db::select_dirty(&pool, 0).await.unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first_track.len(), second_track.len());
        assert_eq!(first_track[0].id, second_track[0].id);
        assert_eq!(first_track[0].size_bytes, second_track[0].size_bytes);
        assert_eq!(first_track[0].mtime_ns, second_track[0].mtime_ns);
    }
}
