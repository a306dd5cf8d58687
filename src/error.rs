//! Application-wide error types.
//!
//! Library modules return [`Result`] over the [`Error`] enum below, while
//! the CLI and `main` use `anyhow` for convenient error propagation.
//!
//! # Taxonomy
//!
//! - [`Error::Io`]: unreadable files, hashing failures, rename failures
//! - [`Error::ExternalTool`] / [`Error::Extraction`]: probe and extraction subprocesses
//! - [`Error::NotFoundOrRace`]: find-or-create could not recover an identifier
//! - [`Error::InvalidArgument`]: malformed fingerprints, bad worker counts
//! - [`Error::Database`]: store connectivity and write failures
//!
//! Per-file errors are logged by the pipeline and the file is abandoned for
//! this run; only startup-level errors abort the process.

use std::path::PathBuf;

use crate::enrichment::EnrichmentError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog store error (connectivity, constraint, write failure)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failure while opening the catalog
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An external tool could not be run or exited unsuccessfully
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// Cover art extraction produced no usable image
    #[error("Cover extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    /// Find-or-create reported a conflict but the row could not be read back
    #[error("{kind} not found after upsert: {key}")]
    NotFoundOrRace { kind: &'static str, key: String },

    /// Caller supplied a malformed argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Metadata reading error
    #[error("Metadata error for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// Artist enrichment lookup error
    #[error("Enrichment error: {0}")]
    Enrichment(#[from] EnrichmentError),

    /// JSON (de)serialization of stored blobs
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking task panicked or was cancelled
    #[error("Task join error: {0}")]
    TaskJoin(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a metadata error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an external tool error.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a cover extraction error.
    pub fn extraction(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// Returns `true` when retrying the same operation may succeed.
    ///
    /// Covers read-back misses after an upsert conflict and SQLite lock
    /// contention or uniqueness conflicts between concurrent writers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NotFoundOrRace { .. } => true,
            Error::Database(sqlx::Error::Database(db)) => {
                if db.is_unique_violation() {
                    return true;
                }
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
                db.code()
                    .and_then(|c| c.parse::<i32>().ok())
                    .map(|c| matches!(c & 0xff, 5 | 6))
                    .unwrap_or(false)
            }
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            Error::WithContext { source, .. } => source.is_retryable(),
            _ => false,
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
