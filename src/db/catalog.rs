//! Find-or-create for catalog entities.
//!
//! Artists and albums are identified by natural keys (artist name; album
//! name plus album artist). Uniqueness is enforced by a unique index on the
//! key, and every resolution is a single `INSERT ... ON CONFLICT` statement,
//! so two workers resolving the same key at the same time converge on one
//! row. There is no client-side "look up, then insert" step.
//!
//! Mutable attributes follow two rules: `None` never clobbers a stored
//! value, and `Some` is last-write-wins.

use std::time::Duration;

use sqlx::sqlite::SqlitePool;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::MediaFileRecord;

/// Delay before the first retry; doubles on each further attempt.
const RETRY_BASE_DELAY_MS: u64 = 10;

/// A value bound to a mutable attribute column.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(Option<String>),
    Integer(Option<i64>),
}

impl AttributeValue {
    fn is_set(&self) -> bool {
        match self {
            AttributeValue::Text(v) => v.is_some(),
            AttributeValue::Integer(v) => v.is_some(),
        }
    }
}

/// An entity that can be resolved by natural key.
pub trait CatalogEntity: Send + Sync {
    /// Human-readable kind, used in logs and errors
    const KIND: &'static str;
    const TABLE: &'static str;
    /// Columns of the natural key (backed by a unique index)
    const KEY_COLUMNS: &'static [&'static str];
    /// Columns updated in place when the row already exists
    const ATTRIBUTE_COLUMNS: &'static [&'static str];

    /// Values for [`CatalogEntity::KEY_COLUMNS`], in order.
    fn key_values(&self) -> Vec<String>;

    /// Values for [`CatalogEntity::ATTRIBUTE_COLUMNS`], in order.
    fn attribute_values(&self) -> Vec<AttributeValue>;

    /// Natural key rendered for log lines.
    fn describe(&self) -> String {
        self.key_values().join(" / ")
    }
}

/// Artist keyed by name, with an optional MusicBrainz payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistUpsert {
    pub name: String,
    pub musicbrainz: Option<serde_json::Value>,
}

impl ArtistUpsert {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            musicbrainz: None,
        }
    }

    /// The artist a track refers to.
    pub fn for_record(record: &MediaFileRecord, musicbrainz: Option<serde_json::Value>) -> Self {
        Self {
            musicbrainz,
            ..Self::new(record.artist_name())
        }
    }
}

impl CatalogEntity for ArtistUpsert {
    const KIND: &'static str = "artist";
    const TABLE: &'static str = "artists";
    const KEY_COLUMNS: &'static [&'static str] = &["name"];
    const ATTRIBUTE_COLUMNS: &'static [&'static str] = &["musicbrainz"];

    fn key_values(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn attribute_values(&self) -> Vec<AttributeValue> {
        vec![AttributeValue::Text(
            self.musicbrainz.as_ref().map(|v| v.to_string()),
        )]
    }
}

/// Album keyed by (name, album artist).
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumUpsert {
    pub name: String,
    pub album_artist: String,
    pub artist_id: Option<i64>,
    pub cover_hash: Option<String>,
}

impl AlbumUpsert {
    pub fn new(name: impl Into<String>, album_artist: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            album_artist: album_artist.into(),
            artist_id: None,
            cover_hash: None,
        }
    }

    /// The album a track belongs to; the album artist falls back to the
    /// track artist when the tag is missing or blank.
    pub fn for_record(record: &MediaFileRecord, artist_id: i64, cover_hash: Option<String>) -> Self {
        Self {
            artist_id: Some(artist_id),
            cover_hash,
            ..Self::new(record.album_name(), record.album_artist_name())
        }
    }
}

impl CatalogEntity for AlbumUpsert {
    const KIND: &'static str = "album";
    const TABLE: &'static str = "albums";
    const KEY_COLUMNS: &'static [&'static str] = &["name", "album_artist"];
    const ATTRIBUTE_COLUMNS: &'static [&'static str] = &["artist_id", "cover_hash"];

    fn key_values(&self) -> Vec<String> {
        vec![self.name.clone(), self.album_artist.clone()]
    }

    fn attribute_values(&self) -> Vec<AttributeValue> {
        vec![
            AttributeValue::Integer(self.artist_id),
            AttributeValue::Text(self.cover_hash.clone()),
        ]
    }
}

/// Find or create `entity`, returning its row ID.
///
/// Conflicts that may clear on their own (a locked database, a read-back
/// that missed the row) are retried up to `attempts` times with a short,
/// growing, jittered delay. Anything else propagates immediately.
///
/// # Errors
///
/// Returns [`Error::NotFoundOrRace`] if the row could not be recovered after
/// all attempts, or the underlying store error.
pub async fn resolve<E: CatalogEntity>(pool: &SqlitePool, entity: &E, attempts: u32) -> Result<i64> {
    let attempts = attempts.max(1);
    let mut delay_ms = RETRY_BASE_DELAY_MS;
    let mut attempt = 1;

    loop {
        match upsert_once(pool, entity).await {
            Ok(id) => {
                debug!(target: "catalog", kind = E::KIND, key = %entity.describe(), id, "Resolved");
                return Ok(id);
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(
                    target: "catalog",
                    kind = E::KIND,
                    key = %entity.describe(),
                    attempt,
                    error = %e,
                    "Find-or-create conflict, retrying"
                );
                let jitter = rand::random_range(0..=delay_ms);
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = delay_ms.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!("resolving {} {:?}", E::KIND, entity.describe())));
            }
        }
    }
}

/// One atomic conditional insert against the natural key.
async fn upsert_once<E: CatalogEntity>(pool: &SqlitePool, entity: &E) -> Result<i64> {
    let keys = entity.key_values();
    let attributes = entity.attribute_values();
    let updates_attributes = attributes.iter().any(AttributeValue::is_set);

    let sql = upsert_sql::<E>(updates_attributes);
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for key in &keys {
        query = query.bind(key.clone());
    }
    for value in attributes {
        query = match value {
            AttributeValue::Text(v) => query.bind(v),
            AttributeValue::Integer(v) => query.bind(v),
        };
    }

    if let Some(id) = query.fetch_optional(pool).await? {
        return Ok(id);
    }

    // DO NOTHING returns no row on conflict; the existing row must be there
    let sql = select_id_sql::<E>();
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for key in keys {
        query = query.bind(key);
    }
    query
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFoundOrRace {
            kind: E::KIND,
            key: entity.describe(),
        })
}

fn upsert_sql<E: CatalogEntity>(updates_attributes: bool) -> String {
    let columns: Vec<&str> = E::KEY_COLUMNS
        .iter()
        .chain(E::ATTRIBUTE_COLUMNS)
        .copied()
        .collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let conflict_target = E::KEY_COLUMNS.join(", ");

    let on_conflict = if updates_attributes && !E::ATTRIBUTE_COLUMNS.is_empty() {
        let assignments: Vec<String> = E::ATTRIBUTE_COLUMNS
            .iter()
            .map(|c| format!("{c} = COALESCE(excluded.{c}, {table}.{c})", table = E::TABLE))
            .chain(std::iter::once(
                "updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')".to_string(),
            ))
            .collect();
        format!("DO UPDATE SET {}", assignments.join(", "))
    } else {
        "DO NOTHING".to_string()
    };

    format!(
        "INSERT INTO {table} ({columns}) VALUES ({placeholders}) \
         ON CONFLICT({conflict_target}) {on_conflict} RETURNING id",
        table = E::TABLE,
        columns = columns.join(", "),
    )
}

fn select_id_sql<E: CatalogEntity>() -> String {
    let filter: Vec<String> = E::KEY_COLUMNS.iter().map(|c| format!("{c} = ?")).collect();
    format!("SELECT id FROM {} WHERE {}", E::TABLE, filter.join(" AND "))
}
