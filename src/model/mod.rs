//! Core data models for the catalog.
//!
//! Defines the persisted entities ([`Album`], [`Disc`], [`Track`],
//! [`RunEvent`]) and the closed status enums stored in their `status`
//! columns. Track status is a small state machine; transitions outside
//! it are rejected at the writer boundary instead of trusting whatever
//! string a producer happened to send.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `album` - One row per library folder of tracks
//! - `disc` - Sub-grouping of tracks within an album
//! - `track` - One row per media file
//! - `run_event` - Append-only ledger, one row per pipeline invocation

use serde::Serialize;
use sqlx::FromRow;

/// Status of a cataloged track.
///
/// The state machine is `NEW -> DIRTY_META -> {TAGGED | ERROR}`, with
/// `DEEP_PENDING` as an alternate queued state before extraction.
/// `TAGGED` is terminal until a CHANGED pass demotes the track back to
/// `DIRTY_META`; `ERROR` is terminal for the current run and re-attempted
/// by the next FAST/CHANGED pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackStatus {
    /// Discovered but not yet probed
    New,
    /// Header/stat data is fresh, full tags are stale or unread
    DirtyMeta,
    /// Queued for deep extraction
    DeepPending,
    /// Full tags extracted, digest stored
    Tagged,
    /// Probe or extraction failed; `last_error` holds the reason
    Error,
}

impl TrackStatus {
    /// String representation stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::New => "NEW",
            TrackStatus::DirtyMeta => "DIRTY_META",
            TrackStatus::DeepPending => "DEEP_PENDING",
            TrackStatus::Tagged => "TAGGED",
            TrackStatus::Error => "ERROR",
        }
    }

    /// Whether the state machine permits moving from `self` to `to`.
    ///
    /// Identity transitions are allowed so that idempotent re-runs are
    /// not treated as violations.
    pub fn can_transition(&self, to: TrackStatus) -> bool {
        use TrackStatus::*;
        if *self == to {
            return true;
        }
        matches!(
            (*self, to),
            (New, DirtyMeta)
                | (New, DeepPending)
                | (New, Tagged)
                | (New, Error)
                | (DirtyMeta, DeepPending)
                | (DirtyMeta, Tagged)
                | (DirtyMeta, Error)
                | (DeepPending, Tagged)
                | (DeepPending, Error)
                // stat-level change demotes a finished track
                | (Tagged, DirtyMeta)
                // re-running a pass retries errored files
                | (Error, DirtyMeta)
                | (Error, New)
        )
    }
}

impl std::str::FromStr for TrackStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NEW" => TrackStatus::New,
            "DIRTY_META" => TrackStatus::DirtyMeta,
            "DEEP_PENDING" => TrackStatus::DeepPending,
            "TAGGED" => TrackStatus::Tagged,
            "ERROR" => TrackStatus::Error,
            other => return Err(format!("unknown track status: {other}")),
        })
    }
}

/// Status of an album row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlbumStatus {
    /// Header facts only; no fingerprint stored yet
    Partial,
    /// Fingerprint stored by a CHANGED pass
    Cataloged,
}

impl AlbumStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumStatus::Partial => "PARTIAL",
            AlbumStatus::Cataloged => "CATALOGED",
        }
    }
}

impl std::str::FromStr for AlbumStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PARTIAL" => AlbumStatus::Partial,
            "CATALOGED" => AlbumStatus::Cataloged,
            other => return Err(format!("unknown album status: {other}")),
        })
    }
}

/// One catalog entry per library directory that is a leaf collection of
/// tracks. Identity is the folder path, hashed into `id`.
#[derive(Debug, Clone, FromRow)]
pub struct Album {
    pub id: i64,
    /// Absolute folder path (unique identity)
    pub folder_path: String,
    /// Artist parsed from an `Artist - Title` folder name
    pub folder_artist: Option<String>,
    /// Title parsed from an `Artist - Title` folder name
    pub folder_title: Option<String>,
    /// Tier declared by the library root this album was found under
    pub tier_declared: Option<String>,
    /// Distinct codecs observed across tracks (comma separated)
    pub format_observed: Option<String>,
    pub bit_depth_set: Option<String>,
    pub sample_rates_set: Option<String>,
    pub dsd_rates_set: Option<String>,
    pub disc_count: Option<i64>,
    pub track_count: Option<i64>,
    pub status: String,
    pub updated_at: Option<String>,
    /// Order-independent signature over (rel_path, size, mtime_ns)
    pub album_fingerprint: Option<String>,
    /// Total track rows including missing ones
    pub item_count: Option<i64>,
}

/// A disc sub-grouping, unique on (album_id, disc_number).
#[derive(Debug, Clone, FromRow)]
pub struct Disc {
    pub id: i64,
    pub album_id: i64,
    pub disc_number: i64,
    pub disc_title: Option<String>,
    pub path: Option<String>,
    pub track_count: Option<i64>,
}

/// One catalog entry per media file.
#[derive(Debug, Clone, FromRow)]
pub struct Track {
    pub id: i64,
    /// Absolute file path (unique identity)
    pub path: String,
    pub album_id: Option<i64>,
    pub disc_id: Option<i64>,
    pub size_bytes: Option<i64>,
    /// Modification time in nanoseconds since the epoch
    pub mtime_ns: Option<i64>,
    pub codec: Option<String>,
    pub bit_depth: Option<i64>,
    pub sample_rate_hz: Option<i64>,
    pub channels: Option<i64>,
    pub duration_sec: Option<f64>,
    /// SHA-256 over normalized tags, populated by the deep pass
    pub tag_digest: Option<String>,
    pub status: String,
    pub last_error: Option<String>,
    pub last_seen: Option<String>,
    /// Id of the run that last saw this path (non-owning)
    pub seen_run_id: Option<i64>,
    pub is_missing: i64,
}

/// Append-only ledger row, one per pipeline invocation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RunEvent {
    pub id: i64,
    pub started_at: String,
    pub command: String,
    pub config_hash: Option<String>,
    pub items_processed: i64,
    pub duration_ms: Option<i64>,
}
