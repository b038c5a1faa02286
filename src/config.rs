use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which fields an attempt must yield before the item counts as succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredFields {
    #[default]
    TitleImage,
    TitlePriceImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub required_fields: RequiredFields,
    pub max_items: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.amazon.com".into(),
            max_attempts: 5,
            request_timeout_secs: 20,
            backoff_base_ms: 2_000,
            jitter_min_ms: 2_000,
            jitter_max_ms: 7_000,
            required_fields: RequiredFields::TitleImage,
            max_items: None,
        }
    }
}

impl EngineConfig {
    /// Three attempts instead of five.
    pub fn simplified() -> Self {
        Self {
            max_attempts: 3,
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.jitter_min_ms > self.jitter_max_ms {
            return Err(ConfigError::InvertedJitter {
                min: self.jitter_min_ms,
                max: self.jitter_max_ms,
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn product_url(&self, identifier: &str) -> String {
        format!("{}/dp/{}", self.base_url.trim_end_matches('/'), identifier)
    }
}
