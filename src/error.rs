//! Application-wide error types.
//!
//! Library modules return typed errors via `thiserror`; the CLI boundary
//! uses `anyhow` for convenient propagation. Per-file probe failures are
//! NOT represented here - they are ordinary values recorded on the track
//! row - so this enum covers only failures that abort an operation.

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog store error (fatal to the current batch/run)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration error (fatal at startup)
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A root directory is absent or unreadable
    #[error("Library root not accessible: {0}")]
    RootUnavailable(PathBuf),

    /// The writer task ended unexpectedly
    #[error("Writer task failed: {0}")]
    WriterFailed(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::RootUnavailable(PathBuf::from("/mnt/nas/music"));
        assert!(err.to_string().contains("/mnt/nas/music"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::config("missing roots").context("loading config");
        let msg = err.to_string();
        assert!(msg.contains("loading config"));
        assert!(msg.contains("missing roots"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(Error::WriterFailed("channel closed".into()));
        let with_ctx = result.with_context("during fast pass");
        assert!(
            with_ctx
                .unwrap_err()
                .to_string()
                .contains("during fast pass")
        );
    }
}
