//! Album change signatures from stat data.
//!
//! A fingerprint is computed purely from the multiset of
//! `(relative_path, size_bytes, mtime_ns)` tuples of an album's tracks,
//! sorted and then hashed, so it is invariant to enumeration order and
//! never reads file contents. A content-only change with unchanged size
//! and mtime is therefore invisible to it; that is a documented
//! limitation of the design, not a bug.

use sha2::{Digest, Sha256};
use std::path::Path;

/// One track's stat signature, relative to its album folder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatEntry {
    pub rel_path: String,
    pub size_bytes: i64,
    pub mtime_ns: i64,
}

impl StatEntry {
    pub fn new(rel_path: impl Into<String>, size_bytes: i64, mtime_ns: i64) -> Self {
        Self {
            rel_path: rel_path.into(),
            size_bytes,
            mtime_ns,
        }
    }
}

/// Compute the album fingerprint over a set of stat entries.
///
/// The entries are sorted before hashing, so any enumeration order
/// produces the same signature. Returns a lowercase SHA-256 hex string.
pub fn album_fingerprint(entries: &[StatEntry]) -> String {
    let mut sorted: Vec<&StatEntry> = entries.iter().collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    for entry in sorted {
        hasher.update(entry.rel_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(entry.size_bytes.to_le_bytes());
        hasher.update(entry.mtime_ns.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Derive a stable album id from its folder path.
///
/// First 8 bytes of SHA-256, masked into the positive 63-bit space so the
/// value is safe as a signed SQLite INTEGER primary key.
pub fn album_id_from_path(folder_path: &Path) -> i64 {
    let digest = Sha256::digest(folder_path.to_string_lossy().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(bytes) & (i64::MAX as u64)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn sample_entries() -> Vec<StatEntry> {
        vec![
            StatEntry::new("01 - Intro.flac", 31_337_000, 1_700_000_000_000_000_001),
            StatEntry::new("02 - Song.flac", 45_000_123, 1_700_000_000_000_000_002),
            StatEntry::new("Disc 2/01 - More.flac", 50_111_222, 1_700_000_000_000_000_003),
        ]
    }

    #[test]
    fn test_fingerprint_is_order_independent() {
        let entries = sample_entries();
        let mut reversed = entries.clone();
        reversed.reverse();
        assert_eq!(album_fingerprint(&entries), album_fingerprint(&reversed));
    }

    #[test]
    fn test_fingerprint_changes_on_single_mtime() {
        let entries = sample_entries();
        let mut touched = entries.clone();
        touched[1].mtime_ns += 1;
        assert_ne!(album_fingerprint(&entries), album_fingerprint(&touched));
    }

    #[test]
    fn test_fingerprint_changes_on_added_track() {
        let mut entries = sample_entries();
        let before = album_fingerprint(&entries);
        entries.push(StatEntry::new("03 - Hidden.flac", 1, 2));
        assert_ne!(before, album_fingerprint(&entries));
    }

    #[test]
    fn test_empty_fingerprint_is_stable() {
        assert_eq!(album_fingerprint(&[]), album_fingerprint(&[]));
    }

    #[test]
    fn test_album_id_is_positive_and_stable() {
        let p = PathBuf::from("/mnt/nas/music/Artist - Album");
        let id = album_id_from_path(&p);
        assert!(id >= 0);
        assert_eq!(id, album_id_from_path(&p));
        assert_ne!(id, album_id_from_path(&PathBuf::from("/mnt/other")));
    }

    proptest! {
        #[test]
        fn prop_fingerprint_invariant_to_permutation(
            mut entries in proptest::collection::vec(
                (any::<u16>(), any::<i64>(), any::<i64>())
                    .prop_map(|(n, s, m)| StatEntry::new(format!("track-{n}.flac"), s, m)),
                0..16,
            ),
            rotation in 0usize..16,
        ) {
            let before = album_fingerprint(&entries);
            if !entries.is_empty() {
                let r = rotation % entries.len();
                entries.rotate_left(r);
            }
            entries.reverse();
            prop_assert_eq!(before, album_fingerprint(&entries));
        }
    }
}
