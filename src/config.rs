//! Configuration system using TOML files.
//!
//! Config is resolved in order: `--config PATH`, the
//! `MUSIC_CATALOG_CONFIG` environment variable, then the OS-standard
//! config directory:
//! - Linux: ~/.config/music-catalog/config.toml
//! - macOS: ~/Library/Application Support/music-catalog/config.toml
//!
//! A hash of the effective configuration is recorded on every run ledger
//! row so drift between runs is auditable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite catalog store
    pub db_path: PathBuf,

    /// Library roots to catalog
    pub roots: Vec<RootConfig>,

    /// Walker settings
    pub scan: ScanConfig,

    /// Per-pass defaults
    pub inventory: InventoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("music_catalog.db"),
            roots: Vec::new(),
            scan: ScanConfig::default(),
            inventory: InventoryConfig::default(),
        }
    }
}

/// One library root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootConfig {
    /// Directory to walk
    pub path: PathBuf,

    /// Declared quality tier for albums under this root (e.g. "hires")
    pub tier: Option<String>,
}

/// Walker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory names skipped entirely (case-insensitive)
    pub ignore_names: Vec<String>,

    /// "Box set wrapper" directory names unwrapped one level deep
    pub wrapper_names: Vec<String>,

    /// Audio file extensions considered (lowercase, no dot)
    pub audio_exts: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ignore_names: vec!["@eaDir".to_string()],
            wrapper_names: Vec::new(),
            audio_exts: vec!["flac".to_string(), "dsf".to_string()],
        }
    }
}

/// Per-pass defaults, overridable from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Header-probe worker count for the fast pass
    pub workers: usize,

    /// Intents per store transaction
    pub batch_size: usize,

    /// Files modified within this many seconds are excluded from the
    /// changed pass (half-written file guard)
    pub debounce_secs: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            batch_size: 1000,
            debounce_secs: 10,
        }
    }
}

impl Config {
    /// Content hash of the effective configuration, recorded on every
    /// run ledger row. Uses the canonical TOML rendering so that two
    /// configs hash identically iff they are semantically identical.
    /// A config that fails to render would poison the drift audit, so
    /// that is an error, not an empty hash.
    pub fn hash(&self) -> Result<String> {
        let rendered = toml::to_string(self)
            .map_err(|e| Error::config(format!("cannot serialize config: {e}")))?;
        let digest = Sha256::digest(rendered.as_bytes());
        Ok(format!("{digest:x}"))
    }
}

/// Get the default config file path in the OS config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-catalog").join("config.toml"))
}

/// Load configuration.
///
/// An explicitly given path must exist and parse; that is a startup
/// failure, not something to paper over. When no path is given and no
/// file exists at the default location, defaults are returned (commands
/// that need roots will refuse to run on an empty root list).
pub fn load(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return read_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => read_config(&path),
        _ => {
            tracing::info!("no config file found, using defaults");
            Ok(Config::default())
        }
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| Error::config(format!("cannot parse {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "loaded config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[scan]"));
        assert!(toml.contains("[inventory]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.db_path = PathBuf::from("/var/lib/mc/catalog.db");
        config.roots.push(RootConfig {
            path: PathBuf::from("/mnt/nas/music"),
            tier: Some("hires".to_string()),
        });
        config.inventory.workers = 8;

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.db_path, PathBuf::from("/var/lib/mc/catalog.db"));
        assert_eq!(parsed.roots.len(), 1);
        assert_eq!(parsed.roots[0].tier.as_deref(), Some("hires"));
        assert_eq!(parsed.inventory.workers, 8);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
db_path = "test.db"

[[roots]]
path = "/music"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.db_path, PathBuf::from("test.db"));
        assert_eq!(config.roots[0].path, PathBuf::from("/music"));
        assert!(config.roots[0].tier.is_none());

        // Unspecified sections use defaults
        assert_eq!(config.inventory.workers, 6);
        assert_eq!(config.inventory.batch_size, 1000);
        assert_eq!(config.scan.ignore_names, vec!["@eaDir"]);
    }

    #[test]
    fn test_config_hash_tracks_content() {
        let a = Config::default();
        let mut b = Config::default();
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());

        b.inventory.debounce_secs = 30;
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn test_explicit_missing_path_is_fatal() {
        let err = load(Some(Path::new("/no/such/config.toml"))).unwrap_err();
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "db_path = \"x.db\"").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.db_path, PathBuf::from("x.db"));
    }
}
