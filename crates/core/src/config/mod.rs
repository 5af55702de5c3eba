//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CACHET_*)
//! 2. TOML config file (if CACHET_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::model::Settings;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CACHET_*)
/// 2. TOML config file (if CACHET_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite asset store.
    ///
    /// Set via CACHET_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for secondary fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Secondary fetch timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Largest body the pipeline will store, in bytes.
    ///
    /// Set via CACHET_MAX_RESOURCE_BYTES environment variable.
    #[serde(default = "default_max_resource_bytes")]
    pub max_resource_bytes: usize,

    /// Number of origins kept resident in the working set.
    #[serde(default = "default_max_resident_origins")]
    pub max_resident_origins: usize,

    /// Interval between stats flushes, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Interval between age-based eviction sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Default eviction age used until settings are saved explicitly.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Compress script and stylesheet bodies before storing them.
    #[serde(default = "default_true")]
    pub compress_text: bool,

    /// Purge an origin's cached resources when caching is disabled for it.
    #[serde(default = "default_true")]
    pub purge_on_disable: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./cachet.sqlite")
}

fn default_user_agent() -> String {
    "cachet/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_resource_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

fn default_max_resident_origins() -> usize {
    30
}

fn default_flush_interval_ms() -> u64 {
    1_500
}

fn default_sweep_interval_secs() -> u64 {
    3_600
}

fn default_max_age_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_resource_bytes: default_max_resource_bytes(),
            max_resident_origins: default_max_resident_origins(),
            flush_interval_ms: default_flush_interval_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_age_days: default_max_age_days(),
            compress_text: true,
            purge_on_disable: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Settings used when the store has none saved.
    pub fn default_settings(&self) -> Settings {
        Settings { max_age_days: self.max_age_days }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CACHET_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CACHET_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./cachet.sqlite"));
        assert_eq!(config.user_agent, "cachet/0.1");
        assert_eq!(config.max_resource_bytes, 10 * 1024 * 1024);
        assert_eq!(config.max_resident_origins, 30);
        assert_eq!(config.flush_interval_ms, 1_500);
        assert_eq!(config.max_age_days, 30);
        assert!(config.compress_text);
        assert!(config.purge_on_disable);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.flush_interval(), Duration::from_millis(1_500));
        assert_eq!(config.sweep_interval(), Duration::from_secs(3_600));
    }

    #[test]
    fn test_default_settings_follow_config() {
        let config = AppConfig { max_age_days: 3, ..Default::default() };
        assert_eq!(config.default_settings(), Settings { max_age_days: 3 });
    }

    #[test]
    fn test_load_from_toml_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("cachet.toml", "max_resident_origins = 12\ncompress_text = false")?;
            jail.set_env("CACHET_CONFIG_FILE", "cachet.toml");
            jail.set_env("CACHET_FLUSH_INTERVAL_MS", "2000");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.max_resident_origins, 12);
            assert!(!config.compress_text);
            assert_eq!(config.flush_interval_ms, 2_000);
            Ok(())
        });
    }
}
