//! Per-file metadata probing via lofty.
//!
//! Two entry points, matching the two pipeline passes:
//! - [`quick_probe`]: cheap header-only facts (codec, bit depth, sample
//!   rate, channels, duration) plus stat data. Used by the fast pass.
//! - [`extract`]: full tag and artwork read, feeding the normalized tag
//!   digest. Used by the deep pass.
//!
//! Both return a plain `Result` per file; a failure is recorded on the
//! track row by the caller and never aborts a pass.
//!
//! This module also owns the pure path logic that places a file in the
//! catalog: disc-folder detection, box-set wrapper unwrapping, and
//! `Artist - Title` folder name parsing.

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{ItemKey, ItemValue};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::UNIX_EPOCH;

// Accept common disc-folder spellings: "Disc 1", "CD1", "Disk 02", "D3 - Bonus"
static DISC_FOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:disc|disk|cd|d)\s*[-_ ]*(\d{1,2})(?:\s*[-_:]\s*(.+))?$").unwrap()
});

static ALBUM_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<artist>.+?)\s*-\s*(?P<title>.+)$").unwrap());

/// Cheap header facts for one file.
#[derive(Debug, Clone)]
pub struct HeaderFacts {
    pub size_bytes: i64,
    pub mtime_ns: i64,
    pub codec: String,
    pub bit_depth: Option<i64>,
    pub sample_rate_hz: Option<i64>,
    pub channels: Option<i64>,
    pub duration_sec: Option<f64>,
}

/// Full-tag snapshot for one file.
#[derive(Debug, Clone, Default)]
pub struct TagSnapshot {
    /// Tag key -> values, keys upper-cased, values trimmed
    pub tags: BTreeMap<String, Vec<String>>,
    pub has_artwork: bool,
}

/// Where a file sits in the album/disc hierarchy. Derived purely from
/// the path, never from file contents.
#[derive(Debug, Clone)]
pub struct TrackLocation {
    pub album_folder: PathBuf,
    pub disc: Option<DiscFolder>,
}

#[derive(Debug, Clone)]
pub struct DiscFolder {
    pub number: i64,
    pub title: Option<String>,
    pub path: PathBuf,
}

/// Modification time in nanoseconds since the epoch.
pub fn mtime_ns(meta: &std::fs::Metadata) -> std::io::Result<i64> {
    let modified = meta.modified()?;
    let ns = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    Ok(ns)
}

/// Header-only probe: stat the file and read audio properties without
/// touching full tags or artwork.
pub fn quick_probe(path: &Path) -> std::result::Result<HeaderFacts, String> {
    let meta = std::fs::metadata(path).map_err(|e| format!("stat failed: {e}"))?;
    let mtime = mtime_ns(&meta).map_err(|e| format!("mtime unavailable: {e}"))?;

    let tagged = Probe::open(path)
        .map_err(|e| format!("open failed: {e}"))?
        .read()
        .map_err(|e| format!("header read failed: {e}"))?;

    let props = tagged.properties();
    Ok(HeaderFacts {
        size_bytes: meta.len() as i64,
        mtime_ns: mtime,
        codec: codec_name(&tagged, path),
        bit_depth: props.bit_depth().map(i64::from),
        sample_rate_hz: props.sample_rate().map(i64::from),
        channels: props.channels().map(i64::from),
        duration_sec: Some(props.duration().as_secs_f64()),
    })
}

/// Full tag/artwork read for the deep pass.
pub fn extract(path: &Path) -> std::result::Result<TagSnapshot, String> {
    let tagged = Probe::open(path)
        .map_err(|e| format!("open failed: {e}"))?
        .read()
        .map_err(|e| format!("tag read failed: {e}"))?;

    let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut has_artwork = false;

    for tag in tagged.tags() {
        if !tag.pictures().is_empty() {
            has_artwork = true;
        }
        for item in tag.items() {
            let value = match item.value() {
                ItemValue::Text(s) | ItemValue::Locator(s) => s.trim().to_string(),
                ItemValue::Binary(_) => continue,
            };
            tags.entry(item_key_name(item.key()))
                .or_default()
                .push(value);
        }
    }

    Ok(TagSnapshot { tags, has_artwork })
}

/// Digest of a normalized tag snapshot.
///
/// Keys are upper-cased and sorted, values trimmed, so cosmetically
/// different but semantically identical tags digest identically across
/// runs. Artwork presence participates so that adding cover art to an
/// otherwise unchanged file registers as a metadata change.
pub fn digest_tags(snapshot: &TagSnapshot) -> String {
    let mut hasher = Sha256::new();
    for (key, values) in &snapshot.tags {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(values.join("|").as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(if snapshot.has_artwork {
        b"ARTWORK=1"
    } else {
        b"ARTWORK=0"
    });
    format!("{:x}", hasher.finalize())
}

/// Resolve a track file's album folder and optional disc folder.
///
/// A parent directory named like a disc folder ("Disc 1", "CD02", ...)
/// pushes the album up one level; a parent named like a configured box
/// set wrapper is unwrapped one level deep.
pub fn locate(path: &Path, wrapper_names: &[String]) -> TrackLocation {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let parent_name = parent
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (mut album_folder, disc) = match DISC_FOLDER_RE.captures(&parent_name) {
        Some(caps) => {
            let number = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .unwrap_or(1);
            let title = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|t| !t.is_empty());
            let album = parent.parent().unwrap_or(parent).to_path_buf();
            (
                album,
                Some(DiscFolder {
                    number,
                    title,
                    path: parent.to_path_buf(),
                }),
            )
        }
        None => (parent.to_path_buf(), None),
    };

    if is_wrapper(&album_folder, wrapper_names)
        && let Some(up) = album_folder.parent()
    {
        album_folder = up.to_path_buf();
    }

    TrackLocation { album_folder, disc }
}

/// Parse `Artist - Title` from an album folder name.
pub fn parse_album_folder(folder: &Path) -> (Option<String>, Option<String>) {
    let base = match folder.file_name() {
        Some(name) => name.to_string_lossy(),
        None => return (None, None),
    };
    match ALBUM_NAME_RE.captures(&base) {
        Some(caps) => (
            Some(caps["artist"].trim().to_string()),
            Some(caps["title"].trim().to_string()),
        ),
        None => (None, None),
    }
}

/// Whether a directory name is one of the disc-folder spellings.
pub fn is_disc_folder(name: &str) -> bool {
    DISC_FOLDER_RE.is_match(name)
}

fn is_wrapper(dir: &Path, wrapper_names: &[String]) -> bool {
    dir.file_name()
        .map(|n| {
            let name = n.to_string_lossy();
            wrapper_names.iter().any(|w| w.eq_ignore_ascii_case(&name))
        })
        .unwrap_or(false)
}

fn codec_name(tagged: &lofty::file::TaggedFile, path: &Path) -> String {
    use lofty::file::FileType;
    match tagged.file_type() {
        FileType::Flac => "FLAC".to_string(),
        FileType::Mpeg => "MP3".to_string(),
        FileType::Mp4 => "ALAC/AAC".to_string(),
        FileType::Opus => "OPUS".to_string(),
        FileType::Vorbis => "VORBIS".to_string(),
        FileType::Wav => "WAV".to_string(),
        FileType::Aiff => "AIFF".to_string(),
        FileType::WavPack => "WAVPACK".to_string(),
        FileType::Ape => "APE".to_string(),
        _ => path
            .extension()
            .map(|e| e.to_string_lossy().to_uppercase())
            .unwrap_or_else(|| "UNKNOWN".to_string()),
    }
}

fn item_key_name(key: &ItemKey) -> String {
    match key {
        ItemKey::Unknown(name) => name.to_uppercase(),
        known => format!("{known:?}").to_uppercase(),
    }
}
