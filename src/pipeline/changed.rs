//! The changed pass: stat-only reconciliation.
//!
//! Walks nothing. For every stored album the current directory listing
//! is compared against the stored track rows and the stored album
//! fingerprint; only files whose size or mtime differ become dirty
//! again. Paths that vanished are flagged missing, never deleted.
//!
//! Files modified within the debounce window are assumed to still be
//! copying and are excluded entirely; an album with any debounced file
//! keeps its old fingerprint so the next pass reconsiders it whole.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use sqlx::sqlite::SqlitePool;
use tokio::sync::mpsc;

use crate::config::{Config, ScanConfig};
use crate::db;
use crate::error::{Error, Result};
use crate::fingerprint::{StatEntry, album_fingerprint};
use crate::ledger;
use crate::model::{Album, TrackStatus};
use crate::probe;
use crate::walker;
use crate::writer::{Intent, StatUpsert};

use super::{RunSummary, interrupt_flag, join_writer, spawn_writer};

/// Run the changed pass over every stored album.
pub async fn run_changed(
    pool: &SqlitePool,
    config: &Config,
    debounce_secs: u64,
) -> Result<RunSummary> {
    let started = Instant::now();
    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    let debounce_ns = (debounce_secs as i64).saturating_mul(1_000_000_000);

    let run = ledger::begin_run(pool, "changed", &config.hash()?).await?;
    let (tx, writer) = spawn_writer(pool, config.inventory.batch_size, run.run_id);
    let (stop, watcher) = interrupt_flag();

    let albums = db::all_albums(pool).await?;
    let album_count = albums.len();
    for album in albums {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        reconcile_album(pool, &tx, &album, &config.scan, now_ns, debounce_ns).await?;
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
        albums = album_count,
        intents = summary.processed,
        duration_ms = summary.duration_ms,
        "changed pass complete"
    );
    Ok(summary)
}

async fn reconcile_album(
    pool: &SqlitePool,
    tx: &mpsc::Sender<Intent>,
    album: &Album,
    scan: &ScanConfig,
    now_ns: i64,
    debounce_ns: i64,
) -> Result<()> {
    let stored = db::tracks_for_album(pool, album.id).await?;

    let folder = PathBuf::from(&album.folder_path);
    let scan_owned = scan.clone();
    let listed = tokio::task::spawn_blocking(move || {
        walker::list_album_tracks(&folder, &scan_owned)
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    let listed = match listed {
        Ok(listed) => listed,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // the whole folder is gone; flag every track, keep the rows
            tracing::warn!(album = %album.folder_path, "album folder missing");
            for track in &stored {
                if track.is_missing == 0 {
                    send(tx, Intent::MarkMissing {
                        path: track.path.clone(),
                    })
                    .await?;
                }
            }
            return Ok(());
        }
        Err(e) => {
            tracing::warn!(album = %album.folder_path, error = %e, "listing failed, album skipped");
            return Ok(());
        }
    };

    // stat every current file; anything inside the debounce window is
    // assumed mid-copy and excluded from this pass
    let mut facts: Vec<(PathBuf, i64, i64)> = Vec::with_capacity(listed.len());
    let mut debounced = false;
    for (path, meta) in &listed {
        let mtime = match probe::mtime_ns(meta) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "mtime unreadable, skipped");
                continue;
            }
        };
        if now_ns - mtime < debounce_ns {
            debounced = true;
        }
        facts.push((path.clone(), meta.len() as i64, mtime));
    }

    for (path, size, mtime) in &facts {
        if now_ns - mtime < debounce_ns {
            continue;
        }
        let key = path.display().to_string();
        let existing = stored.iter().find(|t| t.path == key);
        let status = match existing {
            None => Some(TrackStatus::New),
            Some(t)
                if t.size_bytes != Some(*size)
                    || t.mtime_ns != Some(*mtime)
                    || t.is_missing != 0 =>
            {
                Some(TrackStatus::DirtyMeta)
            }
            Some(_) => None,
        };
        if let Some(status) = status {
            send(tx, Intent::UpsertStat(StatUpsert {
                path: key,
                album_id: album.id,
                size_bytes: *size,
                mtime_ns: *mtime,
                codec_hint: codec_hint(path),
                status,
            }))
            .await?;
        }
    }

    // stored paths no longer on disk
    let on_disk: HashSet<String> = facts.iter().map(|(p, _, _)| p.display().to_string()).collect();
    for track in &stored {
        if track.is_missing != 0 || on_disk.contains(&track.path) {
            continue;
        }
        // a fresh stored mtime can mean the file is mid-replace; wait it out
        if track.mtime_ns.is_some_and(|m| now_ns - m < debounce_ns) {
            debounced = true;
            continue;
        }
        send(tx, Intent::MarkMissing {
            path: track.path.clone(),
        })
        .await?;
    }

    send(tx, Intent::MarkAlbumSeen { album_id: album.id }).await?;

    if debounced {
        tracing::debug!(album = %album.folder_path, "debounced files present, fingerprint deferred");
        return Ok(());
    }

    let base = Path::new(&album.folder_path);
    let entries: Vec<StatEntry> = facts
        .iter()
        .map(|(path, size, mtime)| {
            let rel = path
                .strip_prefix(base)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();
            StatEntry::new(rel, *size, *mtime)
        })
        .collect();
    let fingerprint = album_fingerprint(&entries);
    if album.album_fingerprint.as_deref() != Some(fingerprint.as_str()) {
        send(tx, Intent::SetAlbumFingerprint {
            album_id: album.id,
            fingerprint,
        })
        .await?;
    }

    Ok(())
}

async fn send(tx: &mpsc::Sender<Intent>, intent: Intent) -> Result<()> {
    tx.send(intent)
        .await
        .map_err(|_| Error::WriterFailed("intent channel closed".into()))
}

fn codec_hint(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_uppercase())
}
