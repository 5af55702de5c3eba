//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_resident_origins` is 0
    /// - `max_resource_bytes` is 0 or exceeds 100MB
    /// - `flush_interval_ms` is outside 100ms..=60s
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_resident_origins == 0 {
            return Err(ConfigError::Invalid {
                field: "max_resident_origins".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.max_resource_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_resource_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_resource_bytes > 100 * 1024 * 1024 {
            return Err(ConfigError::Invalid {
                field: "max_resource_bytes".into(),
                reason: "must not exceed 100MB".into(),
            });
        }

        if !(100..=60_000).contains(&self.flush_interval_ms) {
            return Err(ConfigError::Invalid {
                field: "flush_interval_ms".into(),
                reason: "must be between 100ms and 60000ms".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.sweep_interval_secs == 0 && self.max_age_days > 0 {
            tracing::warn!(
                max_age_days = self.max_age_days,
                "sweep_interval_secs is 0; age-based eviction will only run on demand"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_resident_origins() {
        let config = AppConfig { max_resident_origins: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_resident_origins"));
    }

    #[test]
    fn test_validate_max_resource_bytes_bounds() {
        let zero = AppConfig { max_resource_bytes: 0, ..Default::default() };
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid { field, .. }) if field == "max_resource_bytes"));

        let huge = AppConfig { max_resource_bytes: 101 * 1024 * 1024, ..Default::default() };
        assert!(matches!(huge.validate(), Err(ConfigError::Invalid { field, .. }) if field == "max_resource_bytes"));
    }

    #[test]
    fn test_validate_flush_interval_bounds() {
        let fast = AppConfig { flush_interval_ms: 50, ..Default::default() };
        assert!(matches!(fast.validate(), Err(ConfigError::Invalid { field, .. }) if field == "flush_interval_ms"));

        let slow = AppConfig { flush_interval_ms: 60_001, ..Default::default() };
        assert!(slow.validate().is_err());
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));

        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "user_agent"));
    }

    #[test]
    fn test_validate_edge_values() {
        let config = AppConfig {
            max_resident_origins: 1,
            max_resource_bytes: 100 * 1024 * 1024,
            flush_interval_ms: 100,
            timeout_ms: 300_000,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
