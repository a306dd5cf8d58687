//! Test utilities and fixtures for music-catalog tests.
//!
//! This module provides common test helpers, mock factories, and
//! database utilities to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use music_catalog::test_utils::{temp_db, mock_record};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let record = mock_record("Albums", "song.mp3");
//!     // ... test logic
//! }
//! ```

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::sqlite::SqlitePool;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use crate::config::DatabaseConfig;
use crate::cover::CoverExtractor;
use crate::error::{Error, Result};
use crate::hash;
use crate::metadata::{TagReader, TrackTags};
use crate::model::{MediaFileRecord, TrackStatus};

/// Creates a temporary database for testing.
///
/// The database is a real file (WAL mode, busy timeout) in a temporary
/// directory that is automatically cleaned up when the returned `TempDir` is
/// dropped. Migrations are run automatically.
///
/// # Returns
///
/// A tuple of (connection pool, temp directory handle).
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url, &DatabaseConfig::default())
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// An artist row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    /// Opaque MusicBrainz payload as JSON text
    pub musicbrainz: Option<String>,
}

/// An album row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub album_artist: String,
    pub artist_id: Option<i64>,
    pub cover_hash: Option<String>,
}

/// A `coverart` row as stored.
#[derive(Debug, Clone, FromRow)]
pub struct CoverArt {
    pub id: i64,
    pub hash: String,
    pub path: String,
}

/// Get an artist by name.
pub async fn find_artist(pool: &SqlitePool, name: &str) -> Result<Option<Artist>> {
    let artist = sqlx::query_as::<_, Artist>("SELECT id, name, musicbrainz FROM artists WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(artist)
}

/// Get all artists, ordered by ID.
pub async fn all_artists(pool: &SqlitePool) -> Result<Vec<Artist>> {
    let artists = sqlx::query_as::<_, Artist>("SELECT id, name, musicbrainz FROM artists ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(artists)
}

/// Get all albums, ordered by ID.
pub async fn all_albums(pool: &SqlitePool) -> Result<Vec<Album>> {
    let albums = sqlx::query_as::<_, Album>(
        "SELECT id, name, album_artist, artist_id, cover_hash FROM albums ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(albums)
}

/// Get every recorded cover image, ordered by ID.
pub async fn all_cover_art(pool: &SqlitePool) -> Result<Vec<CoverArt>> {
    let rows = sqlx::query_as::<_, CoverArt>("SELECT id, hash, path FROM coverart ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Creates a mock MediaFileRecord with sensible defaults.
///
/// The root is `/music`; the fingerprint is derived from the file name so
/// distinct names get distinct fingerprints. Customize with field updates:
///
/// ```ignore
/// let mut record = mock_record("", "a.mp3");
/// record.tags.artist = Some("Custom Artist".to_string());
/// ```
pub fn mock_record(sub_dir: &str, file_name: &str) -> MediaFileRecord {
    let modified = DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc);

    MediaFileRecord {
        id: None,
        root_dir: "/music".to_string(),
        sub_dir: sub_dir.to_string(),
        file_name: file_name.to_string(),
        extension: Path::new(file_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default(),
        created_at: Some(modified),
        modified_at: Some(modified),
        tags: TrackTags {
            title: Some("Test Track".to_string()),
            artist: Some("Test Artist".to_string()),
            album: Some("Test Album".to_string()),
            duration: Duration::from_secs(180),
            track_number: Some(1),
            ..Default::default()
        },
        probe: None,
        status: TrackStatus::New,
        file_hash: hash::fingerprint_bytes(file_name.as_bytes()).into_string(),
        cover_hash: None,
        cover_path: None,
        artist_id: None,
        album_id: None,
    }
}

/// Tag reader returning the same artist/album for every file.
///
/// The title is the file stem, so records stay distinguishable.
#[derive(Debug, Clone)]
pub struct FixedTagReader {
    pub artist: String,
    pub album: String,
    pub album_artist: Option<String>,
}

impl FixedTagReader {
    pub fn new(artist: &str, album: &str) -> Self {
        Self {
            artist: artist.to_string(),
            album: album.to_string(),
            album_artist: None,
        }
    }
}

impl TagReader for FixedTagReader {
    fn read(&self, path: &Path) -> Result<TrackTags> {
        Ok(TrackTags {
            title: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
            artist: Some(self.artist.clone()),
            album: Some(self.album.clone()),
            album_artist: self.album_artist.clone(),
            duration: Duration::from_secs(200),
            ..Default::default()
        })
    }
}

/// Extractor that writes fixed bytes as the cover of every file.
#[derive(Debug, Clone)]
pub struct FakeExtractor {
    bytes: Vec<u8>,
}

impl FakeExtractor {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

impl CoverExtractor for FakeExtractor {
    fn extract(&self, _media: &Path, dest: &Path) -> Result<()> {
        fs::write(dest, &self.bytes)?;
        Ok(())
    }
}

/// Extractor that always fails, like a tool exiting non-zero.
#[derive(Debug, Clone, Copy)]
pub struct FailingExtractor;

impl CoverExtractor for FailingExtractor {
    fn extract(&self, media: &Path, _dest: &Path) -> Result<()> {
        Err(Error::extraction(media, "tool exited with status 1"))
    }
}
