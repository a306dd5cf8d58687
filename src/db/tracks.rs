//! Persistence for scanned track records.
//!
//! Rows are keyed by (root directory, subdirectory, file name). A rescan
//! refreshes the scanned fields in place; status only moves forward, with
//! one exception: an enriched record whose file content changed goes back to
//! `updated` so the next enrichment pass picks up the new version.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::sqlite::SqlitePool;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::metadata::TrackTags;
use crate::model::{MediaFileRecord, TrackStatus};

const TRACK_COLUMNS: &str = "id, root_dir, sub_dir, file_name, extension, created_at, \
     modified_at, title, artist, album, album_artist, year, genre, bit_rate, sample_rate, \
     channels, duration_ms, track_number, musicbrainz_artist_id, probe, status, file_hash, \
     cover_hash, cover_path, artist_id, album_id";

/// Fields written when a record finishes enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub cover_hash: String,
    /// Cover location relative to the store root
    pub cover_path: String,
    pub artist_id: i64,
    pub album_id: i64,
}

/// Raw `tracks` row.
#[derive(Debug, FromRow)]
struct TrackRow {
    id: i64,
    root_dir: String,
    sub_dir: String,
    file_name: String,
    extension: String,
    created_at: Option<String>,
    modified_at: Option<String>,
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    album_artist: Option<String>,
    year: Option<i64>,
    genre: Option<String>,
    bit_rate: Option<i64>,
    sample_rate: Option<i64>,
    channels: Option<i64>,
    duration_ms: Option<i64>,
    track_number: Option<i64>,
    musicbrainz_artist_id: Option<String>,
    probe: Option<String>,
    status: String,
    file_hash: String,
    cover_hash: Option<String>,
    cover_path: Option<String>,
    artist_id: Option<i64>,
    album_id: Option<i64>,
}

impl TrackRow {
    fn into_record(self) -> Result<MediaFileRecord> {
        let probe = self.probe.as_deref().map(serde_json::from_str).transpose()?;

        Ok(MediaFileRecord {
            id: Some(self.id),
            root_dir: self.root_dir,
            sub_dir: self.sub_dir,
            file_name: self.file_name,
            extension: self.extension,
            created_at: parse_timestamp(self.created_at.as_deref()),
            modified_at: parse_timestamp(self.modified_at.as_deref()),
            tags: TrackTags {
                title: self.title,
                artist: self.artist,
                album: self.album,
                album_artist: self.album_artist,
                year: self.year.and_then(|v| u32::try_from(v).ok()),
                genre: self.genre,
                bit_rate: self.bit_rate.and_then(|v| u32::try_from(v).ok()),
                sample_rate: self.sample_rate.and_then(|v| u32::try_from(v).ok()),
                channels: self.channels.and_then(|v| u8::try_from(v).ok()),
                duration: Duration::from_millis(
                    self.duration_ms.and_then(|v| u64::try_from(v).ok()).unwrap_or(0),
                ),
                track_number: self.track_number.and_then(|v| u32::try_from(v).ok()),
                musicbrainz_artist_id: self.musicbrainz_artist_id,
            },
            probe,
            status: self.status.parse()?,
            file_hash: self.file_hash,
            cover_hash: self.cover_hash,
            cover_path: self.cover_path,
            artist_id: self.artist_id,
            album_id: self.album_id,
        })
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn format_timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|dt| dt.to_rfc3339())
}

/// Insert or refresh a scanned record by its natural key.
///
/// On conflict the scanned fields are overwritten and enrichment results are
/// kept. The stored status is preserved unless the record was already
/// enriched and its content fingerprint changed, in which case it becomes
/// `updated`.
///
/// # Returns
///
/// The row ID and the status the row has after the upsert.
pub async fn upsert_scanned(
    pool: &SqlitePool,
    record: &MediaFileRecord,
) -> Result<(i64, TrackStatus)> {
    let probe = record.probe.as_ref().map(serde_json::to_string).transpose()?;
    let tags = &record.tags;

    let (id, status): (i64, String) = sqlx::query_as(
        r#"
        INSERT INTO tracks (
            root_dir, sub_dir, file_name, extension, created_at, modified_at,
            title, artist, album, album_artist, year, genre, bit_rate, sample_rate,
            channels, duration_ms, track_number, musicbrainz_artist_id, probe,
            status, file_hash, scanned_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(root_dir, sub_dir, file_name) DO UPDATE SET
            extension = excluded.extension,
            created_at = excluded.created_at,
            modified_at = excluded.modified_at,
            title = excluded.title,
            artist = excluded.artist,
            album = excluded.album,
            album_artist = excluded.album_artist,
            year = excluded.year,
            genre = excluded.genre,
            bit_rate = excluded.bit_rate,
            sample_rate = excluded.sample_rate,
            channels = excluded.channels,
            duration_ms = excluded.duration_ms,
            track_number = excluded.track_number,
            musicbrainz_artist_id = excluded.musicbrainz_artist_id,
            probe = excluded.probe,
            status = CASE
                WHEN tracks.status = 'cover' AND tracks.file_hash <> excluded.file_hash
                THEN 'updated'
                ELSE tracks.status
            END,
            file_hash = excluded.file_hash,
            scanned_at = excluded.scanned_at
        RETURNING id, status
        "#,
    )
    .bind(&record.root_dir)
    .bind(&record.sub_dir)
    .bind(&record.file_name)
    .bind(&record.extension)
    .bind(format_timestamp(record.created_at))
    .bind(format_timestamp(record.modified_at))
    .bind(&tags.title)
    .bind(&tags.artist)
    .bind(&tags.album)
    .bind(&tags.album_artist)
    .bind(tags.year.map(i64::from))
    .bind(&tags.genre)
    .bind(tags.bit_rate.map(i64::from))
    .bind(tags.sample_rate.map(i64::from))
    .bind(tags.channels.map(i64::from))
    .bind(duration_ms(tags.duration))
    .bind(tags.track_number.map(i64::from))
    .bind(&tags.musicbrainz_artist_id)
    .bind(probe)
    .bind(record.status.as_str())
    .bind(&record.file_hash)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(pool)
    .await?;

    Ok((id, status.parse()?))
}

/// One page of records awaiting enrichment (`new` or `updated`).
///
/// Keyset-paginated on the row ID: pass the last ID of the previous page as
/// `after_id` (0 for the first page). Records committed between pages simply
/// drop out of later pages.
pub async fn pending_page(
    pool: &SqlitePool,
    after_id: i64,
    limit: u32,
) -> Result<Vec<MediaFileRecord>> {
    let sql = format!(
        "SELECT {TRACK_COLUMNS} FROM tracks \
         WHERE status IN ('new', 'updated') AND id > ? \
         ORDER BY id LIMIT ?"
    );
    let rows = sqlx::query_as::<_, TrackRow>(&sql)
        .bind(after_id)
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(TrackRow::into_record).collect()
}

/// Write enrichment results and advance the record to `cover`.
///
/// A single conditional update: it only applies while the record is still
/// pending, so the status never regresses and a record is committed at most
/// once per pending period.
///
/// # Errors
///
/// Returns [`Error::NotFoundOrRace`] if no pending row with this ID exists.
pub async fn commit_enrichment(
    pool: &SqlitePool,
    id: i64,
    enrichment: &Enrichment,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE tracks SET
            cover_hash = ?,
            cover_path = ?,
            artist_id = ?,
            album_id = ?,
            status = 'cover',
            enriched_at = ?
        WHERE id = ? AND status IN ('new', 'updated')
        "#,
    )
    .bind(&enrichment.cover_hash)
    .bind(&enrichment.cover_path)
    .bind(enrichment.artist_id)
    .bind(enrichment.album_id)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFoundOrRace {
            kind: "pending track",
            key: id.to_string(),
        });
    }
    Ok(())
}

/// Duration in whole milliseconds; `None` when it does not fit the column.
fn duration_ms(duration: Duration) -> Option<i64> {
    i64::try_from(duration.as_millis()).ok()
}

/// Get a track by its database ID.
#[cfg(test)]
pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<MediaFileRecord>> {
    let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?");
    sqlx::query_as::<_, TrackRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(TrackRow::into_record)
        .transpose()
}

/// Number of tracks currently at `status`.
pub async fn count_by_status(pool: &SqlitePool, status: TrackStatus) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM tracks WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Get all tracks, ordered by ID.
#[cfg(test)]
pub async fn all(pool: &SqlitePool) -> Result<Vec<MediaFileRecord>> {
    let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks ORDER BY id");
    let rows = sqlx::query_as::<_, TrackRow>(&sql).fetch_all(pool).await?;
    rows.into_iter().map(TrackRow::into_record).collect()
}
