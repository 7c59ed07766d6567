//! The fast pass: full walk plus concurrent header probing.
//!
//! Every album candidate from the walker is expanded into per-track
//! probe jobs. Probing is blocking I/O, so each job runs on the blocking
//! pool; results flow to the writer as intents, failures included. A
//! track that fails to probe still gets a row, in `ERROR`, with the
//! reason attached.

use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use sqlx::sqlite::SqlitePool;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fingerprint::album_id_from_path;
use crate::ledger;
use crate::probe;
use crate::walker;
use crate::writer::{AlbumFacts, DiscFacts, FastUpsert, Intent};

use super::{RunSummary, interrupt_flag, join_writer, spawn_writer};

/// Run the fast pass over all configured roots.
pub async fn run_fast(pool: &SqlitePool, config: &Config, workers: usize) -> Result<RunSummary> {
    if config.roots.is_empty() {
        return Err(Error::config("no library roots configured"));
    }
    for root in &config.roots {
        if !root.path.is_dir() {
            return Err(Error::RootUnavailable(root.path.clone()));
        }
    }
    let workers = workers.max(1);
    let started = Instant::now();

    let run = ledger::begin_run(pool, "fast", &config.hash()?).await?;
    let (tx, writer) = spawn_writer(pool, config.inventory.batch_size, run.run_id);
    let (stop, watcher) = interrupt_flag();

    let albums = walker::walk_albums(
        config.roots.clone(),
        config.scan.clone(),
        Arc::clone(&stop),
    );
    futures::pin_mut!(albums);

    let wrapper_names = config.scan.wrapper_names.as_slice();
    while let Some(candidate) = albums.next().await {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let (artist, title) = probe::parse_album_folder(&candidate.folder);
        let album = AlbumFacts {
            id: album_id_from_path(&candidate.folder),
            folder_path: candidate.folder.display().to_string(),
            folder_artist: artist,
            folder_title: title,
            tier: candidate.tier.clone(),
        };

        futures::stream::iter(candidate.tracks)
            .for_each_concurrent(workers, |path| {
                let tx = tx.clone();
                let album = album.clone();
                let stop = Arc::clone(&stop);
                async move {
                    let disc = probe::locate(&path, wrapper_names).disc.map(|d| DiscFacts {
                        number: d.number,
                        title: d.title,
                        path: d.path.display().to_string(),
                    });
                    let probe_path = path.clone();
                    let outcome = match tokio::task::spawn_blocking(move || {
                        probe::quick_probe(&probe_path)
                    })
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(e) => Err(format!("probe task failed: {e}")),
                    };
                    let intent = Intent::UpsertFast(Box::new(FastUpsert {
                        album,
                        disc,
                        path: path.display().to_string(),
                        probe: outcome,
                    }));
                    // send failure means the writer is gone; wind down
                    if tx.send(intent).await.is_err() {
                        stop.store(true, Ordering::Relaxed);
                    }
                }
            })
            .await;
    }

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
        tracks = summary.processed,
        duration_ms = summary.duration_ms,
        "fast pass complete"
    );
    Ok(summary)
}
