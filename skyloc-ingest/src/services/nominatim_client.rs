//! Nominatim geocoding client
//!
//! One `geocode` call is exactly one HTTP request. Rate limiting, retries and
//! memoization are owned by the resolver cache so every attempt passes through
//! the shared gate.
//!
//! API Documentation: https://nominatim.org/release-docs/latest/api/Search/

use async_trait::async_trait;
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::StatusCode;
use serde_json::Value;
use skyloc_common::config::GeocoderConfig;
use skyloc_common::events::OsmPlace;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Transport-level geocoding failures; all are worth retrying
#[derive(Debug, Clone, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned HTTP {0}")]
    Status(u16),
}

/// Free-text geocoding collaborator
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Look up `query`
    ///
    /// # Returns
    /// * `Ok(Some(place))` - Best match
    /// * `Ok(None)` - No match, or a response that could not be understood
    /// * `Err(_)` - The provider could not be reached
    async fn geocode(&self, query: &str) -> Result<Option<OsmPlace>, GeocodeError>;
}

/// Nominatim `/search` client
pub struct NominatimClient {
    http_client: reqwest::Client,
    search_url: String,
}

impl NominatimClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, GeocodeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            search_url: format!("{}/search", base_url.trim_end_matches('/')),
        })
    }

    pub fn from_config(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        Self::new(&config.base_url, &config.user_agent(), config.timeout())
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn geocode(&self, query: &str) -> Result<Option<OsmPlace>, GeocodeError> {
        debug!(query = %query, "Querying Nominatim");

        let response = self
            .http_client
            .get(&self.search_url)
            .query(&[("q", query), ("format", "jsonv2"), ("limit", "1")])
            .header(ACCEPT_LANGUAGE, "en-US,en")
            .send()
            .await
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(GeocodeError::Status(status.as_u16()));
        }

        if !status.is_success() {
            warn!(query = %query, status = %status, "Nominatim rejected query");
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        Ok(parse_search_response(query, &body))
    }
}

/// First place in a jsonv2 search response
///
/// Empty arrays and anything that does not match the expected shape read as
/// "no match".
pub fn parse_search_response(query: &str, body: &str) -> Option<OsmPlace> {
    let results: Vec<Value> = match serde_json::from_str(body) {
        Ok(results) => results,
        Err(e) => {
            debug!(query = %query, "Malformed Nominatim response: {}", e);
            return None;
        }
    };

    let first = results.into_iter().next()?;
    match serde_json::from_value::<OsmPlace>(first) {
        Ok(place) => Some(place),
        Err(e) => {
            debug!(query = %query, "Unexpected Nominatim place shape: {}", e);
            None
        }
    }
}
