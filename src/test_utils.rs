//! Shared test fixtures.

use sqlx::sqlite::SqlitePool;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

use crate::config::{Config, RootConfig};
use crate::fingerprint::album_id_from_path;
use crate::probe::HeaderFacts;
use crate::writer::{AlbumFacts, FastUpsert, Intent};

/// Fresh migrated database in a temp directory. The directory guard must
/// stay alive for the pool's lifetime.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = crate::db::db_url(&dir.path().join("test.db"));
    let pool = crate::db::init_db(&url).await.unwrap();
    (pool, dir)
}

/// A successful FAST intent with fabricated header facts.
pub fn fast_intent(folder: &str, path: &str) -> Intent {
    Intent::UpsertFast(Box::new(FastUpsert {
        album: AlbumFacts {
            id: album_id_from_path(Path::new(folder)),
            folder_path: folder.to_string(),
            folder_artist: None,
            folder_title: None,
            tier: None,
        },
        disc: None,
        path: path.to_string(),
        probe: Ok(HeaderFacts {
            size_bytes: 1000,
            mtime_ns: 1_700_000_000_000_000_000,
            codec: "FLAC".to_string(),
            bit_depth: Some(16),
            sample_rate_hz: Some(44_100),
            channels: Some(2),
            duration_sec: Some(180.0),
        }),
    }))
}

/// Write a minimal valid 16-bit stereo PCM WAV file with `frames`
/// silent sample frames. Real enough for header probing and tag reads.
pub fn write_wav(path: &Path, frames: u32) {
    let channels: u16 = 2;
    let sample_rate: u32 = 44_100;
    let bits: u16 = 16;
    let block_align = channels * (bits / 8);
    let data_len = frames * block_align as u32;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(out.len() + data_len as usize, 0);

    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&out).unwrap();
}

/// Grow a file so both its size and mtime change.
pub fn touch_grow(path: &Path) {
    let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(&[0u8; 16]).unwrap();
}

/// Config pointed at one library root, tuned for tests: WAV fixtures
/// accepted, debounce off, small batches.
pub fn test_config(root: &Path, db_path: &Path) -> Config {
    let mut config = Config::default();
    config.db_path = db_path.to_path_buf();
    config.roots.push(RootConfig {
        path: root.to_path_buf(),
        tier: Some("standard".to_string()),
    });
    config.scan.audio_exts = vec!["flac".to_string(), "dsf".to_string(), "wav".to_string()];
    config.inventory.workers = 2;
    config.inventory.batch_size = 10;
    config.inventory.debounce_secs = 0;
    config
}
