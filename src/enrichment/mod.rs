//! Artist enrichment from external services.
//!
//! When enabled, the worker looks each artist up by the MusicBrainz artist
//! id found in the file's tags and stores the returned document on the
//! artist row as an opaque payload. Lookups are best-effort: a failure is
//! logged and the artist is resolved without a payload.
//!
//! The pipeline depends on the [`ArtistLookup`] trait so tests can substitute
//! a fake for the HTTP client.

mod musicbrainz;
mod rate_limit;

pub use musicbrainz::MusicBrainzClient;
pub use rate_limit::RateLimiter;

use async_trait::async_trait;

/// Errors from enrichment lookups.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EnrichmentError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("No entry found for {0}")]
    NotFound(String),

    #[error("Rate limited - try again later")]
    RateLimited,
}

/// Looks up an artist by external identifier.
#[async_trait]
pub trait ArtistLookup: Send + Sync {
    /// Fetch the artist document for `id` as an opaque JSON value.
    async fn lookup_artist(&self, id: &str) -> Result<serde_json::Value, EnrichmentError>;
}
