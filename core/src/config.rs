use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;
use crate::gateway::MAX_SCORE;

pub const DEFAULT_VALIDATION_TIMEOUT_MS: u64 = 12_000;
/// Pause before auto-advancing so the user sees the success state.
pub const DEFAULT_AUTO_ADVANCE_DELAY_MS: u64 = 1_500;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Runtime knobs of an intake workflow, usually read from `intake.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntakeConfig {
    pub validation_timeout_ms: u64,
    pub auto_advance_delay_ms: u64,
    pub event_capacity: usize,
    pub mock: MockGatewayConfig,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            validation_timeout_ms: DEFAULT_VALIDATION_TIMEOUT_MS,
            auto_advance_delay_ms: DEFAULT_AUTO_ADVANCE_DELAY_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            mock: MockGatewayConfig::default(),
        }
    }
}

/// Settings for the random stand-in gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MockGatewayConfig {
    pub min_score: u8,
    pub max_score: u8,
    pub latency_ms: u64,
}

impl Default for MockGatewayConfig {
    fn default() -> Self {
        Self {
            min_score: 60,
            max_score: 100,
            latency_ms: 800,
        }
    }
}

impl IntakeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: IntakeConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validation_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "validation_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "event_capacity",
                reason: "must be positive".to_string(),
            });
        }
        if self.mock.min_score > self.mock.max_score || self.mock.max_score > MAX_SCORE {
            return Err(ConfigError::Invalid {
                field: "mock",
                reason: format!(
                    "score range {}..={} must sit inside 0..={MAX_SCORE}",
                    self.mock.min_score, self.mock.max_score
                ),
            });
        }
        Ok(())
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn auto_advance_delay(&self) -> Duration {
        Duration::from_millis(self.auto_advance_delay_ms)
    }
}
