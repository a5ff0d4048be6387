use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::DeviceTier;

use crate::errors::ConfigError;
use crate::recovery::RecoveryConfig;
use crate::session::HeartbeatConfig;
use crate::tuning::ProfileOverrides;

/// Engine configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Platform backend settings
    pub server: ServerConfig,

    /// Session keep-alive settings
    pub heartbeat: HeartbeatSettings,

    /// Playback failure recovery settings
    pub recovery: RecoverySettings,

    /// Stream tuning settings
    pub tuning: TuningSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the session backend
    pub base_url: String,

    /// Per-request timeout
    #[serde(with = "crate::serde_helpers::duration_millis")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    /// Interval between heartbeat rounds
    #[serde(with = "crate::serde_helpers::duration_millis")]
    pub interval: Duration,

    /// Maximum concurrently open sessions (multi-view grid bound)
    pub max_sessions: usize,

    /// Server-side eviction budget; collaborator contract value
    #[serde(with = "crate::serde_helpers::duration_millis")]
    pub server_eviction_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// First retry delay
    #[serde(with = "crate::serde_helpers::duration_millis")]
    pub backoff_base: Duration,

    /// Upper bound on a single retry delay
    #[serde(with = "crate::serde_helpers::duration_millis")]
    pub backoff_cap: Duration,

    /// Automatic retries before surfacing a terminal failure
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TuningSettings {
    /// Pin the device tier instead of probing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_tier: Option<DeviceTier>,

    /// Pin the mobile flag instead of probing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_mobile: Option<bool>,

    /// Field overrides applied over every computed profile
    pub overrides: ProfileOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter, overridden by RUST_LOG
    pub level: String,

    /// Include module targets in log lines
    pub show_target: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        let defaults = HeartbeatConfig::default();
        Self {
            interval: defaults.interval,
            max_sessions: defaults.max_sessions,
            server_eviction_timeout: defaults.server_eviction_timeout,
        }
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        let defaults = RecoveryConfig::default();
        Self {
            backoff_base: defaults.backoff_base,
            backoff_cap: defaults.backoff_cap,
            max_retries: defaults.max_retries,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            heartbeat: HeartbeatSettings::default(),
            recovery: RecoverySettings::default(),
            tuning: TuningSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl From<&HeartbeatSettings> for HeartbeatConfig {
    fn from(settings: &HeartbeatSettings) -> Self {
        Self {
            interval: settings.interval,
            max_sessions: settings.max_sessions,
            server_eviction_timeout: settings.server_eviction_timeout,
        }
    }
}

impl From<&RecoverySettings> for RecoveryConfig {
    fn from(settings: &RecoverySettings) -> Self {
        Self {
            backoff_base: settings.backoff_base,
            backoff_cap: settings.backoff_cap,
            max_retries: settings.max_retries,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML, for generating a starter file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat.interval.is_zero() {
            return Err(ConfigError::Invalid {
                message: "heartbeat.interval must be positive".to_string(),
            });
        }
        if self.heartbeat.max_sessions == 0 {
            return Err(ConfigError::Invalid {
                message: "heartbeat.max_sessions must be at least 1".to_string(),
            });
        }
        // Two full missed heartbeats of slack against server-side eviction.
        if self.heartbeat.interval * 3 > self.heartbeat.server_eviction_timeout {
            return Err(ConfigError::Invalid {
                message: format!(
                    "heartbeat.interval {:?} leaves no slack against server eviction budget {:?}",
                    self.heartbeat.interval, self.heartbeat.server_eviction_timeout
                ),
            });
        }
        if self.recovery.backoff_base.is_zero() {
            return Err(ConfigError::Invalid {
                message: "recovery.backoff_base must be positive".to_string(),
            });
        }
        if self.recovery.backoff_base > self.recovery.backoff_cap {
            return Err(ConfigError::Invalid {
                message: "recovery.backoff_base must not exceed recovery.backoff_cap".to_string(),
            });
        }
        if self.server.base_url.is_empty() {
            return Err(ConfigError::Invalid {
                message: "server.base_url must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat.interval, Duration::from_secs(5));
        assert_eq!(config.recovery.max_retries, 4);
        assert_eq!(config.heartbeat.max_sessions, 4);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = AppConfig::default();
        config.heartbeat.interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_without_eviction_slack_rejected() {
        let mut config = AppConfig::default();
        config.heartbeat.interval = Duration::from_secs(10);
        config.heartbeat.server_eviction_timeout = Duration::from_secs(15);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_base_above_cap_rejected() {
        let mut config = AppConfig::default();
        config.recovery.backoff_base = Duration::from_secs(10);
        config.recovery.backoff_cap = Duration::from_secs(8);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("viewer.toml");

        let mut config = AppConfig::default();
        config.heartbeat.interval = Duration::from_millis(4_000);
        config.recovery.max_retries = 6;
        config.tuning.force_tier = Some(DeviceTier::Low);
        config.save_to_file(&path).expect("save");

        let loaded = AppConfig::load_from_file(&path).expect("load");
        assert_eq!(loaded.heartbeat.interval, Duration::from_millis(4_000));
        assert_eq!(loaded.recovery.max_retries, 6);
        assert_eq!(loaded.tuning.force_tier, Some(DeviceTier::Low));
    }

    #[test]
    fn test_invalid_file_rejected_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("viewer.toml");

        let mut config = AppConfig::default();
        config.heartbeat.interval = Duration::ZERO;
        config.save_to_file(&path).expect("save");

        assert!(AppConfig::load_from_file(&path).is_err());
    }
}
