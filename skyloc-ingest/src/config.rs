//! Configuration resolution for skyloc-ingest
//!
//! Priority: command line / environment (via clap) → TOML file → built-in defaults.
//! The file itself only supplies the middle layer; the values gathered by
//! clap are applied on top as [`ConfigOverrides`].

use skyloc_common::config::{load_config, TomlConfig};
use skyloc_common::Result;
use std::path::Path;

/// Values that take precedence over the TOML file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub bind: Option<String>,
    pub feed_url: Option<String>,
    pub extractor_url: Option<String>,
    pub geocoder_url: Option<String>,
    pub geocoder_user_agent: Option<String>,
    pub geocoder_min_interval_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
}

impl ConfigOverrides {
    /// Overwrite every field of `config` that has an override
    pub fn apply(self, config: &mut TomlConfig) {
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(url) = self.feed_url {
            config.feed.url = url;
        }
        if let Some(url) = self.extractor_url {
            config.extractor.url = url;
        }
        if let Some(url) = self.geocoder_url {
            config.geocoder.base_url = url;
        }
        if let Some(user_agent) = self.geocoder_user_agent {
            config.geocoder.user_agent = Some(user_agent);
        }
        if let Some(interval) = self.geocoder_min_interval_ms {
            config.geocoder.min_interval_ms = interval;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue.capacity = capacity;
        }
    }
}

/// Load the config file (if any), apply overrides, and validate the result
pub fn resolve_config(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<TomlConfig> {
    let mut config = load_config(config_path)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}
