//! Database module for the catalog.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage. One
//! pool is shared by the persist consumer and every enrichment worker, so
//! the connection runs in WAL mode with a busy timeout: readers never block
//! the writer, and concurrent writers queue instead of failing.
//!
//! - [`tracks`] - scanned records, the pending-work query and the final commit
//! - [`catalog`] - find-or-create for artists and albums
//! - [`record_cover_art`] - the `coverart` index of stored blobs
//! - [`catalog_stats`] - row counts for the end-of-run report
//!
//! # Example
//!
//! ```ignore
//! use music_catalog::db::{init_db, tracks};
//!
//! let pool = init_db("sqlite:catalog.db", &DatabaseConfig::default()).await?;
//! let pending = tracks::pending_page(&pool, 0, 100).await?;
//! ```

pub mod catalog;
pub mod tracks;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::model::TrackStatus;
use crate::store::StoredBlob;

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_catalog.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist and runs all pending
/// migrations. Failure here is fatal to the run.
///
/// # Errors
///
/// Returns an error if:
/// - The URL cannot be parsed
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str, config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::debug!(target: "db", url = db_url, "Catalog ready");
    Ok(pool)
}

/// Record a stored cover image in the `coverart` collection.
///
/// Keyed by fingerprint, so the same image extracted from many files maps to
/// one row.
///
/// # Returns
///
/// The database ID of the (existing or new) row.
pub async fn record_cover_art(pool: &SqlitePool, blob: &StoredBlob) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO coverart (hash, path)
        VALUES (?, ?)
        ON CONFLICT(hash) DO UPDATE SET path = excluded.path
        RETURNING id
        "#,
    )
    .bind(blob.fingerprint.as_str())
    .bind(blob.path.to_string_lossy().into_owned())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Row counts across the catalog, reported after each run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    /// Tracks still at `new` or `updated`
    pub pending: i64,
    /// Tracks at `cover`
    pub enriched: i64,
    pub artists: i64,
    pub albums: i64,
    pub covers: i64,
}

impl fmt::Display for CatalogStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} enriched, {} pending, {} artists, {} albums, {} covers",
            self.enriched, self.pending, self.artists, self.albums, self.covers
        )
    }
}

/// Count tracks by status and the catalog entities.
pub async fn catalog_stats(pool: &SqlitePool) -> Result<CatalogStats> {
    let new = tracks::count_by_status(pool, TrackStatus::New).await?;
    let updated = tracks::count_by_status(pool, TrackStatus::Updated).await?;
    let enriched = tracks::count_by_status(pool, TrackStatus::Cover).await?;

    let (artists, albums, covers): (i64, i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM artists), (SELECT COUNT(*) FROM albums), (SELECT COUNT(*) FROM coverart)",
    )
    .fetch_one(pool)
    .await?;

    Ok(CatalogStats {
        pending: new + updated,
        enriched,
        artists,
        albums,
        covers,
    })
}
