//! Album directory enumeration.
//!
//! Walks one or more library roots and yields album candidates: leaf
//! directories that directly contain track files, with disc folders
//! ("Disc 1", "CD02", ...) and configured box-set wrapper directories
//! rolled up into their parent album. Enumeration is lazy - candidates
//! stream out over a channel while the walk is still running - and pure:
//! the walker never touches the store.
//!
//! Permission failures on a subtree are logged and skipped; symlinked
//! directories are never followed, so a link back to an ancestor cannot
//! produce a cycle.

use futures::stream::Stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::config::{RootConfig, ScanConfig};
use crate::probe;

/// One album directory candidate with its track files.
#[derive(Debug, Clone)]
pub struct AlbumCandidate {
    pub folder: PathBuf,
    pub tracks: Vec<PathBuf>,
    /// Tier declared by the library root this candidate was found under
    pub tier: Option<String>,
}

/// Walk the configured roots, yielding album candidates as they are
/// discovered. Setting `stop` causes the walk to wind down promptly;
/// candidates already in flight are still delivered.
pub fn walk_albums(
    roots: Vec<RootConfig>,
    scan: ScanConfig,
    stop: Arc<AtomicBool>,
) -> impl Stream<Item = AlbumCandidate> {
    let (tx, rx) = mpsc::channel(64);

    tokio::task::spawn_blocking(move || {
        for root in &roots {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if !root.path.is_dir() {
                tracing::warn!(root = %root.path.display(), "root is not a directory, skipping");
                continue;
            }
            visit(&root.path, root.tier.as_deref(), &scan, &stop, &tx);
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|candidate| (candidate, rx))
    })
}

fn visit(
    dir: &Path,
    tier: Option<&str>,
    scan: &ScanConfig,
    stop: &Arc<AtomicBool>,
    tx: &mpsc::Sender<AlbumCandidate>,
) {
    if stop.load(Ordering::Relaxed) {
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot enumerate directory, skipping");
            return;
        }
    };

    let mut tracks = Vec::new();
    let mut subdirs = Vec::new();

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(_) => continue,
        };

        if file_type.is_file() {
            if is_audio(&path, scan) {
                tracks.push(path);
            }
        } else if file_type.is_dir() && !is_ignored(&name, scan) {
            subdirs.push((path, name));
        }
        // symlinks fall through: never followed
    }

    for (subdir, name) in subdirs {
        if probe::is_disc_folder(&name) {
            // disc folders roll up into this album
            collect_direct_audio(&subdir, scan, &mut tracks);
        } else if is_wrapper(&name, scan) {
            // a wrapper is transparent: loose files belong to this album,
            // child directories are albums of their own
            collect_direct_audio(&subdir, scan, &mut tracks);
            visit_children(&subdir, tier, scan, stop, tx);
        } else {
            visit(&subdir, tier, scan, stop, tx);
        }
    }

    if !tracks.is_empty() {
        tracks.sort();
        let candidate = AlbumCandidate {
            folder: dir.to_path_buf(),
            tracks,
            tier: tier.map(String::from),
        };
        // receiver dropped means the consumer is gone; stop walking
        if tx.blocking_send(candidate).is_err() {
            stop.store(true, Ordering::Relaxed);
        }
    }
}

fn visit_children(
    dir: &Path,
    tier: Option<&str>,
    scan: &ScanConfig,
    stop: &Arc<AtomicBool>,
    tx: &mpsc::Sender<AlbumCandidate>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot enumerate directory, skipping");
            return;
        }
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || is_ignored(&name, scan) {
            continue;
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            visit(&entry.path(), tier, scan, stop, tx);
        }
    }
}

fn collect_direct_audio(dir: &Path, scan: &ScanConfig, out: &mut Vec<PathBuf>) {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                let hidden = entry.file_name().to_string_lossy().starts_with('.');
                if !hidden
                    && entry.file_type().map(|t| t.is_file()).unwrap_or(false)
                    && is_audio(&path, scan)
                {
                    out.push(path);
                }
            }
        }
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot enumerate directory, skipping");
        }
    }
}

/// List the current track files of one known album folder, with their
/// stat data. Used by the changed pass; mirrors exactly what the album
/// walker would attribute to this folder (direct files plus disc and
/// wrapper subdirectories, one level deep).
pub fn list_album_tracks(
    folder: &Path,
    scan: &ScanConfig,
) -> std::io::Result<Vec<(PathBuf, std::fs::Metadata)>> {
    if !folder.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("album folder missing: {}", folder.display()),
        ));
    }

    let mut out = Vec::new();
    let walk = WalkDir::new(folder)
        .max_depth(2)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') || is_ignored(&name, scan) {
                return false;
            }
            if entry.file_type().is_dir() && entry.depth() == 1 {
                // only disc folders and wrappers roll up
                return probe::is_disc_folder(&name) || is_wrapper(&name, scan);
            }
            true
        });

    for entry in walk {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(folder = %folder.display(), error = %e, "listing error, entry skipped");
                continue;
            }
        };
        if entry.file_type().is_file() && is_audio(entry.path(), scan) {
            match entry.metadata() {
                Ok(meta) => out.push((entry.into_path(), meta)),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "stat failed, entry skipped");
                }
            }
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn is_audio(path: &Path, scan: &ScanConfig) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_lowercase();
            scan.audio_exts.iter().any(|a| a == &ext)
        })
        .unwrap_or(false)
}

fn is_ignored(name: &str, scan: &ScanConfig) -> bool {
    scan.ignore_names.iter().any(|i| i.eq_ignore_ascii_case(name))
}

fn is_wrapper(name: &str, scan: &ScanConfig) -> bool {
    scan.wrapper_names
        .iter()
        .any(|w| w.eq_ignore_ascii_case(name))
}
