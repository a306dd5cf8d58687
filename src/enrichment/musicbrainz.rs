//! MusicBrainz HTTP client
//!
//! Handles communication with the MusicBrainz web service.
//! See: https://musicbrainz.org/doc/MusicBrainz_API
//!
//! IMPORTANT: MusicBrainz requires a User-Agent header and rate limits to 1 req/sec.

use async_trait::async_trait;
use std::time::Duration;

use super::{ArtistLookup, EnrichmentError, RateLimiter};
use crate::config::EnrichmentConfig;

/// User agent string - MusicBrainz requires this
const USER_AGENT: &str = concat!(
    "MusicCatalog/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/music-catalog)"
);

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// MusicBrainz API client
#[derive(Debug, Clone)]
pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl MusicBrainzClient {
    /// Create a client for the configured service root and request spacing.
    pub fn new(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EnrichmentError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(Duration::from_millis(config.min_interval_ms)),
        })
    }

    fn artist_url(&self, artist_id: &str) -> String {
        format!("{}/artist/{}?fmt=json", self.base_url, artist_id)
    }
}

#[async_trait]
impl ArtistLookup for MusicBrainzClient {
    async fn lookup_artist(&self, artist_id: &str) -> Result<serde_json::Value, EnrichmentError> {
        self.limiter.acquire().await;

        let url = self.artist_url(artist_id);
        tracing::debug!(target: "enrichment", url = %url, "MusicBrainz artist lookup");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EnrichmentError::NotFound(artist_id.to_string()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(EnrichmentError::RateLimited);
        }

        if !status.is_success() {
            // Error bodies look like {"error": "..."}
            let body = response.json::<serde_json::Value>().await.ok();
            if let Some(message) = body
                .as_ref()
                .and_then(|b| b.get("error"))
                .and_then(|m| m.as_str())
            {
                return Err(EnrichmentError::ApiError(message.to_string()));
            }
            return Err(EnrichmentError::Network(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| EnrichmentError::Parse(e.to_string()))
    }
}
