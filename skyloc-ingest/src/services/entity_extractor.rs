//! Named-entity extraction client
//!
//! The extraction engine runs as a separate HTTP service:
//!
//! ```text
//! POST {url}  {"text": "..."}
//!   -> 200    {"entities": [{"type": "GPE", "text": "...", "start_char": 0, "end_char": 5}]}
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use skyloc_common::config::ExtractorConfig;
use skyloc_common::events::TextSpan;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Delay before the first retry; later retries wait proportionally longer
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The service could not be reached or kept failing; fatal for the pipeline
    #[error("Entity extractor unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },

    /// The service answered with something other than an entity list
    #[error("Invalid extractor response: {0}")]
    InvalidResponse(String),
}

/// Text in, typed spans out (document order)
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<TextSpan>, ExtractionError>;
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    entities: Vec<TextSpan>,
}

/// HTTP client for the extraction service
pub struct HttpEntityExtractor {
    http_client: reqwest::Client,
    url: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpEntityExtractor {
    pub fn new(url: impl Into<String>, timeout: Duration, max_attempts: u32) -> Result<Self, ExtractionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(skyloc_common::config::get_user_agent())
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Unavailable {
                attempts: 0,
                reason: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            url: url.into(),
            max_attempts: max_attempts.max(1),
            retry_delay: RETRY_BASE_DELAY,
        })
    }

    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ExtractionError> {
        Self::new(config.url.clone(), config.timeout(), config.max_attempts)
    }

    /// Override the backoff step (tests)
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// One request; `Err(reason)` means the attempt may be retried
    async fn attempt(&self, text: &str) -> Result<Result<Vec<TextSpan>, ExtractionError>, String> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&ExtractRequest { text })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(format!("HTTP {}", status));
        }
        if !status.is_success() {
            return Ok(Err(ExtractionError::InvalidResponse(format!("HTTP {}", status))));
        }

        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(parse_entities(&body))
    }
}

#[async_trait]
impl EntityExtractor for HttpEntityExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<TextSpan>, ExtractionError> {
        let mut attempt = 1;
        loop {
            match self.attempt(text).await {
                Ok(result) => return result,
                Err(reason) if attempt < self.max_attempts => {
                    warn!(attempt, "Entity extractor call failed, retrying: {}", reason);
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(reason) => {
                    return Err(ExtractionError::Unavailable {
                        attempts: attempt,
                        reason,
                    });
                }
            }
        }
    }
}

/// Decode an extraction response body
pub fn parse_entities(body: &str) -> Result<Vec<TextSpan>, ExtractionError> {
    let response: ExtractResponse =
        serde_json::from_str(body).map_err(|e| ExtractionError::InvalidResponse(e.to_string()))?;
    debug!("Extracted {} entities", response.entities.len());
    Ok(response.entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyloc_common::events::EntityKind;

    #[test]
    fn test_parse_entities() {
        let body = r#"{"entities": [
            {"type": "FAC", "text": "Golden Gate Bridge", "start_char": 15, "end_char": 33},
            {"type": "GPE", "text": "San Francisco", "start_char": 35, "end_char": 48},
            {"type": "CARDINAL", "text": "two", "start_char": 50, "end_char": 53}
        ]}"#;

        let spans = parse_entities(body).unwrap();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].kind, EntityKind::Fac);
        assert_eq!(spans[1].text, "San Francisco");
        assert_eq!(spans[2].kind, EntityKind::Other("CARDINAL".to_string()));
    }

    #[test]
    fn test_parse_no_entities() {
        assert!(parse_entities(r#"{"entities": []}"#).unwrap().is_empty());
        assert!(parse_entities("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_invalid_response() {
        assert!(matches!(
            parse_entities("Internal Server Error"),
            Err(ExtractionError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Nothing listens on the discard port
        let extractor = HttpEntityExtractor::new("http://127.0.0.1:9/entities", Duration::from_millis(500), 2)
            .unwrap()
            .with_retry_delay(Duration::from_millis(10));

        match extractor.extract("Paris in spring").await {
            Err(ExtractionError::Unavailable { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let extractor = HttpEntityExtractor::new("http://localhost/entities", Duration::from_secs(1), 0).unwrap();
        assert_eq!(extractor.max_attempts, 1);
    }
}
