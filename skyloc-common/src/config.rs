//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every section and every
//! key is optional; anything missing falls back to the built-in defaults below.
//!
//! Config file resolution order:
//! 1. Command-line argument (highest priority)
//! 2. `SKYLOC_CONFIG` environment variable
//! 3. `<config_dir>/skyloc/skyloc.toml` when it exists
//! 4. No file: built-in defaults only

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "SKYLOC_CONFIG";

/// Jetstream endpoint filtered to post records
pub const DEFAULT_FEED_URL: &str =
    "wss://jetstream2.us-east.bsky.network/subscribe?wantedCollections=app.bsky.feed.post";

/// Public Nominatim instance
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub feed: FeedConfig,
    pub queue: QueueConfig,
    pub extractor: ExtractorConfig,
    pub geocoder: GeocoderConfig,
    pub subscribers: SubscriberConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address subscribers connect to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Upstream event feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    /// A feed silent for this long is considered lost
    pub idle_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            idle_timeout_secs: 30 * 60,
        }
    }
}

impl FeedConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Ingest queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum buffered events; the oldest is dropped beyond this
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Entity extraction service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Attempts per text before the extractor is declared unavailable
    pub max_attempts: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5005/entities".to_string(),
            timeout_secs: 10,
            max_attempts: 3,
        }
    }
}

impl ExtractorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Geocoding provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    /// Overrides the standard skyloc User-Agent; required for the public
    /// Nominatim instance, whose usage policy asks for contact details
    pub user_agent: Option<String>,
    /// Minimum spacing between outbound calls, across all callers
    pub min_interval_ms: u64,
    /// Distinct queries remembered before LRU eviction
    pub cache_capacity: usize,
    /// Extra attempts after a transport failure
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEOCODER_URL.to_string(),
            user_agent: None,
            min_interval_ms: 1000,
            cache_capacity: 10_000,
            max_retries: 2,
            timeout_secs: 15,
        }
    }
}

impl GeocoderConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured User-Agent, or the standard one
    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(get_user_agent)
    }

    pub fn is_public_instance(&self) -> bool {
        self.base_url.trim_end_matches('/') == DEFAULT_GEOCODER_URL
    }
}

/// Subscriber fan-out configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Per-subscriber buffered results before deliveries start failing
    pub buffer: usize,
    /// Recent results replayed to a newly connected subscriber
    pub history: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            buffer: 64,
            history: 1024,
        }
    }
}

impl TomlConfig {
    /// Reject values that would stall or disable the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.queue.capacity == 0 {
            return Err(Error::Config("queue.capacity must be at least 1".to_string()));
        }
        if self.geocoder.cache_capacity == 0 {
            return Err(Error::Config(
                "geocoder.cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.geocoder.min_interval_ms == 0 {
            return Err(Error::Config(
                "geocoder.min_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.extractor.max_attempts == 0 {
            return Err(Error::Config(
                "extractor.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.subscribers.buffer == 0 {
            return Err(Error::Config(
                "subscribers.buffer must be at least 1".to_string(),
            ));
        }
        if self.feed.idle_timeout_secs == 0 {
            return Err(Error::Config(
                "feed.idle_timeout_secs must be greater than 0".to_string(),
            ));
        }
        let has_contact = self
            .geocoder
            .user_agent
            .as_deref()
            .is_some_and(|ua| !ua.trim().is_empty());
        if self.geocoder.is_public_instance() && !has_contact {
            return Err(Error::Config(format!(
                "geocoder.user_agent must identify you (e.g. \"myapp/1.0 (you@example.org)\") when using {}",
                DEFAULT_GEOCODER_URL
            )));
        }
        Ok(())
    }
}

/// Standard User-Agent for outbound HTTP clients
pub fn get_user_agent() -> String {
    format!("skyloc/{}", env!("CARGO_PKG_VERSION"))
}

/// Resolve which config file to read, if any
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file, only if present
    default_config_path().filter(|path| path.exists())
}

/// `<config_dir>/skyloc/skyloc.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("skyloc").join("skyloc.toml"))
}

/// Read and parse a TOML config file
///
/// Not validated here: overrides may still fix individual values.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {:?}: {}", path, e)))?;

    Ok(config)
}

/// Load the resolved config file, or built-in defaults when there is none
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            let config = load_toml_config(&path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => {
            info!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let mut config = TomlConfig::default();
        assert_eq!(config.queue.capacity, 100);
        assert_eq!(config.geocoder.min_interval(), Duration::from_millis(1000));
        assert_eq!(config.geocoder.cache_capacity, 10_000);
        assert_eq!(config.feed.idle_timeout(), Duration::from_secs(1800));
        assert_eq!(config.subscribers.history, 1024);

        // Public Nominatim needs a contact before the defaults are usable
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.geocoder.user_agent = Some("skyloc-test/0.1 (ops@example.org)".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_private_geocoder_needs_no_contact() {
        let mut config = TomlConfig::default();
        config.geocoder.base_url = "http://nominatim.internal:8080".to_string();
        assert!(config.validate().is_ok());

        config.geocoder.base_url = format!("{}/", DEFAULT_GEOCODER_URL);
        config.geocoder.user_agent = Some("   ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [queue]
            capacity = 5

            [geocoder]
            min_interval_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.geocoder.min_interval_ms, 1500);
        assert_eq!(config.geocoder.cache_capacity, 10_000);
        assert_eq!(config.geocoder.base_url, DEFAULT_GEOCODER_URL);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = TomlConfig::default();
        config.queue.capacity = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = TomlConfig::default();
        config.geocoder.min_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_user_agent_override() {
        let mut config = GeocoderConfig::default();
        assert_eq!(config.user_agent(), format!("skyloc/{}", env!("CARGO_PKG_VERSION")));

        config.user_agent = Some("custom/1.0".to_string());
        assert_eq!(config.user_agent(), "custom/1.0");
    }

    #[test]
    fn test_cli_path_wins() {
        let path = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(resolve_config_path(Some(path.as_path())), Some(path.clone()));
    }
}
