//! Read-only catalog status report.
//!
//! Aggregates the store into one [`StatusReport`]; no mutation, so this
//! module talks to the pool directly rather than going through the
//! writer. Rendered as text for the terminal or JSON for scripts.

use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::db::now_iso;
use crate::error::Result;
use crate::ledger;
use crate::model::{AlbumStatus, RunEvent, TrackStatus};

/// Point-in-time snapshot of catalog health.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub albums: i64,
    pub albums_cataloged: i64,
    pub discs: i64,
    pub tracks: i64,
    /// Track counts keyed by status
    pub by_status: BTreeMap<String, i64>,
    /// Track counts keyed by codec
    pub by_codec: BTreeMap<String, i64>,
    /// Track counts keyed by "bit_depth/sample_rate"
    pub by_quality: BTreeMap<String, i64>,
    /// Tracks awaiting deep extraction
    pub dirty_queue: i64,
    /// Tracks flagged missing from disk
    pub missing: i64,
    /// Tracks seen within the activity window
    pub recent_tracks: i64,
    pub window_hours: u64,
    pub latest_run: Option<RunEvent>,
    pub generated_at: String,
}

/// Collect the report.
pub async fn collect(pool: &SqlitePool, window_hours: u64) -> Result<StatusReport> {
    let albums: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM album")
        .fetch_one(pool)
        .await?;
    let albums_cataloged: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM album WHERE status = ?")
            .bind(AlbumStatus::Cataloged.as_str())
            .fetch_one(pool)
            .await?;
    let discs: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM disc")
        .fetch_one(pool)
        .await?;
    let tracks: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM track")
        .fetch_one(pool)
        .await?;

    let by_status = grouped(pool, "SELECT status, COUNT(*) FROM track GROUP BY status").await?;
    let by_codec = grouped(
        pool,
        "SELECT codec, COUNT(*) FROM track WHERE codec IS NOT NULL GROUP BY codec",
    )
    .await?;

    let quality_rows: Vec<(Option<i64>, Option<i64>, i64)> = sqlx::query_as(
        "SELECT bit_depth, sample_rate_hz, COUNT(*) FROM track \
         WHERE sample_rate_hz IS NOT NULL GROUP BY bit_depth, sample_rate_hz",
    )
    .fetch_all(pool)
    .await?;
    let mut by_quality = BTreeMap::new();
    for (bit_depth, rate, count) in quality_rows {
        let key = match (bit_depth, rate) {
            (Some(bits), Some(rate)) => format!("{bits}bit/{rate}Hz"),
            (None, Some(rate)) => format!("{rate}Hz"),
            _ => continue,
        };
        *by_quality.entry(key).or_insert(0) += count;
    }

    let dirty_queue: (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM track \
         WHERE status IN ('{}', '{}', '{}') AND is_missing = 0",
        TrackStatus::DirtyMeta.as_str(),
        TrackStatus::New.as_str(),
        TrackStatus::DeepPending.as_str(),
    ))
    .fetch_one(pool)
    .await?;
    let missing: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM track WHERE is_missing = 1")
        .fetch_one(pool)
        .await?;

    let cutoff = (chrono::Utc::now() - chrono::Duration::hours(window_hours as i64))
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let recent: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM track WHERE last_seen >= ?")
        .bind(&cutoff)
        .fetch_one(pool)
        .await?;

    let latest_run = ledger::latest_run(pool).await?;

    Ok(StatusReport {
        albums: albums.0,
        albums_cataloged: albums_cataloged.0,
        discs: discs.0,
        tracks: tracks.0,
        by_status,
        by_codec,
        by_quality,
        dirty_queue: dirty_queue.0,
        missing: missing.0,
        recent_tracks: recent.0,
        window_hours,
        latest_run,
        generated_at: now_iso(),
    })
}

async fn grouped(pool: &SqlitePool, sql: &str) -> Result<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

impl StatusReport {
    /// Human-readable rendering for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Catalog status ({})", self.generated_at);
        let _ = writeln!(
            out,
            "  albums: {} ({} cataloged), discs: {}, tracks: {}",
            self.albums, self.albums_cataloged, self.discs, self.tracks
        );

        if !self.by_status.is_empty() {
            let _ = writeln!(out, "  by status:");
            for (status, count) in &self.by_status {
                let _ = writeln!(out, "    {status:<12} {count}");
            }
        }
        if !self.by_codec.is_empty() {
            let _ = writeln!(out, "  by codec:");
            for (codec, count) in &self.by_codec {
                let _ = writeln!(out, "    {codec:<12} {count}");
            }
        }
        if !self.by_quality.is_empty() {
            let _ = writeln!(out, "  by quality:");
            for (quality, count) in &self.by_quality {
                let _ = writeln!(out, "    {quality:<16} {count}");
            }
        }

        let _ = writeln!(
            out,
            "  dirty queue: {}, missing: {}",
            self.dirty_queue, self.missing
        );
        let _ = writeln!(
            out,
            "  seen in last {}h: {}",
            self.window_hours, self.recent_tracks
        );
        match &self.latest_run {
            Some(run) => {
                let _ = writeln!(
                    out,
                    "  last run: #{} {} at {} ({} items, {} ms)",
                    run.id,
                    run.command,
                    run.started_at,
                    run.items_processed,
                    run.duration_ms.unwrap_or(0)
                );
            }
            None => {
                let _ = writeln!(out, "  last run: none");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_db;

    async fn seed(pool: &SqlitePool) {
        sqlx::query("INSERT INTO album (id, folder_path, status) VALUES (1, '/a', 'CATALOGED')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO track (path, album_id, codec, bit_depth, sample_rate_hz, status, last_seen, is_missing) VALUES \
             ('/a/1.flac', 1, 'FLAC', 16, 44100, 'TAGGED', ?, 0), \
             ('/a/2.flac', 1, 'FLAC', 24, 96000, 'DIRTY_META', ?, 0), \
             ('/a/3.dsf',  1, 'DSF', NULL, 2822400, 'TAGGED', '2020-01-01T00:00:00Z', 1)",
        )
        .bind(now_iso())
        .bind(now_iso())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_collect_counts() {
        let (pool, _dir) = temp_db().await;
        seed(&pool).await;

        let report = collect(&pool, 24).await.unwrap();
        assert_eq!(report.albums, 1);
        assert_eq!(report.albums_cataloged, 1);
        assert_eq!(report.tracks, 3);
        assert_eq!(report.by_status["TAGGED"], 2);
        assert_eq!(report.by_status["DIRTY_META"], 1);
        assert_eq!(report.by_codec["FLAC"], 2);
        assert_eq!(report.by_quality["16bit/44100Hz"], 1);
        assert_eq!(report.by_quality["2822400Hz"], 1);
        assert_eq!(report.dirty_queue, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(report.recent_tracks, 2);
    }

    #[tokio::test]
    async fn test_empty_catalog_report() {
        let (pool, _dir) = temp_db().await;
        let report = collect(&pool, 24).await.unwrap();
        assert_eq!(report.tracks, 0);
        assert!(report.latest_run.is_none());
        assert!(report.render_text().contains("last run: none"));
    }

    #[tokio::test]
    async fn test_report_serializes_to_json() {
        let (pool, _dir) = temp_db().await;
        seed(&pool).await;
        let report = collect(&pool, 24).await.unwrap();
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("\"dirty_queue\": 1"));
        assert!(json.contains("\"FLAC\": 2"));
    }

    #[tokio::test]
    async fn test_text_render_mentions_core_numbers() {
        let (pool, _dir) = temp_db().await;
        seed(&pool).await;
        let report = collect(&pool, 24).await.unwrap();
        let text = report.render_text();
        assert!(text.contains("tracks: 3"));
        assert!(text.contains("dirty queue: 1, missing: 1"));
    }
}
