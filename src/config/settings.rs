//! Configuration settings for stockflow.
//!
//! Settings are loaded from `~/.stockflow/config.yaml`. Every section is
//! optional; missing values fall back to defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::error::StockflowError;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Remote inventory settings.
    pub remote: RemoteConfig,
    /// Queue draining settings.
    pub sync: SyncConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    pub default_output: OutputFormat,
    /// Color output setting.
    pub color: ColorSetting,
    /// Currency symbol used in action descriptions.
    pub currency_symbol: String,
}

/// Color output setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorSetting {
    /// Auto-detect based on terminal.
    #[default]
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

/// Remote inventory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the inventory API. Unset means the device is always offline.
    pub base_url: Option<String>,
    /// API key sent as `X-Api-Key`.
    pub api_key: Option<String>,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

/// Queue draining settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Transient failures tolerated before an action is marked failed.
    pub max_attempts: u32,
    /// Seconds between connectivity probes in `watch` mode.
    pub probe_interval_secs: u64,
    /// Base retry delay in seconds.
    pub retry_base_secs: u64,
    /// Cap on the retry delay in seconds.
    pub retry_max_secs: u64,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable logs.
    pub json: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: OutputFormat::Pretty,
            color: ColorSetting::Auto,
            currency_symbol: "E".to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            probe_interval_secs: 15,
            retry_base_secs: 5,
            retry_max_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl RemoteConfig {
    /// Per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SyncConfig {
    /// Interval between connectivity probes.
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// First retry delay after a drain hit a transient failure.
    #[must_use]
    pub const fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }

    /// Longest retry delay.
    #[must_use]
    pub const fn retry_max(&self) -> Duration {
        Duration::from_secs(self.retry_max_secs)
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, StockflowError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            StockflowError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            StockflowError::Config(format!("Failed to parse config file {}: {e}", path.display()))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), StockflowError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| StockflowError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            StockflowError::Config(format!("Failed to write config file {}: {e}", path.display()))
        })
    }

    /// Reject values the sync machinery cannot work with.
    fn validate(&self) -> Result<(), StockflowError> {
        if self.sync.max_attempts == 0 {
            return Err(StockflowError::Config(
                "sync.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.remote.timeout_secs == 0 {
            return Err(StockflowError::Config(
                "remote.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.sync.probe_interval_secs == 0 {
            return Err(StockflowError::Config(
                "sync.probe_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.sync.retry_base_secs > self.sync.retry_max_secs {
            return Err(StockflowError::Config(
                "sync.retry_base_secs cannot exceed sync.retry_max_secs".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.general.default_output, OutputFormat::Pretty);
        assert_eq!(config.general.color, ColorSetting::Auto);
        assert_eq!(config.general.currency_symbol, "E");
        assert!(config.remote.base_url.is_none());
        assert_eq!(config.remote.timeout(), Duration::from_secs(10));
        assert_eq!(config.sync.max_attempts, 10);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from_path(&temp_dir.path().join("config.yaml")).unwrap();

        assert_eq!(config.sync.probe_interval_secs, 15);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.remote.base_url = Some("https://inventory.example".to_string());
        config.sync.max_attempts = 4;
        config.save_to_path(&config_path).unwrap();

        let loaded = Config::load_from_path(&config_path).unwrap();
        assert_eq!(
            loaded.remote.base_url.as_deref(),
            Some("https://inventory.example")
        );
        assert_eq!(loaded.sync.max_attempts, 4);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let partial_yaml = r"
remote:
  base_url: http://localhost:8080
sync:
  retry_base_secs: 2
";
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.remote.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.remote.timeout_secs, 10);
        assert_eq!(config.sync.retry_base_secs, 2);
        assert_eq!(config.sync.retry_max_secs, 300);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "sync:\n  max_attempts: 0\n").unwrap();

        let err = Config::load_from_path(&config_path).unwrap_err();
        assert!(matches!(err, StockflowError::Config(_)));
    }
}
