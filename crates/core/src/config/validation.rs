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

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `model_name` is empty
    /// - `temperature` is outside 0.0..=2.0
    /// - `daily_limit` is 0
    /// - `cache_ttl_secs` is under a minute or over 90 days
    /// - `store_max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_name.is_empty() {
            return Err(ConfigError::Invalid { field: "model_name".into(), reason: "must not be empty".into() });
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid {
                field: "temperature".into(),
                reason: "must be between 0.0 and 2.0".into(),
            });
        }

        if self.daily_limit == 0 {
            return Err(ConfigError::Invalid { field: "daily_limit".into(), reason: "must be at least 1".into() });
        }

        if self.cache_ttl_secs < 60 {
            return Err(ConfigError::Invalid {
                field: "cache_ttl_secs".into(),
                reason: "must be at least 60 seconds".into(),
            });
        }
        if self.cache_ttl_secs > 90 * 24 * 60 * 60 {
            return Err(ConfigError::Invalid {
                field: "cache_ttl_secs".into(),
                reason: "must not exceed 90 days".into(),
            });
        }

        if self.store_max_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "store_max_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.store_max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid {
                field: "store_max_bytes".into(),
                reason: "must not exceed 50MB".into(),
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

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_model_name() {
        let config = AppConfig { model_name: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "model_name"));
    }

    #[test]
    fn test_validate_temperature_out_of_range() {
        let config = AppConfig { temperature: 2.5, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "temperature"));

        let config = AppConfig { temperature: -0.1, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_daily_limit_zero() {
        let config = AppConfig { daily_limit: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "daily_limit"));
    }

    #[test]
    fn test_validate_ttl_bounds() {
        let config = AppConfig { cache_ttl_secs: 30, ..Default::default() };
        assert!(config.validate().is_err());

        let config = AppConfig { cache_ttl_secs: 91 * 24 * 60 * 60, ..Default::default() };
        assert!(config.validate().is_err());

        let config = AppConfig { cache_ttl_secs: 60, ..Default::default() }; // minimum valid
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_store_max_bytes() {
        let config = AppConfig { store_max_bytes: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "store_max_bytes"));

        let config = AppConfig { store_max_bytes: 51 * 1024 * 1024, ..Default::default() }; // 51MB
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        assert!(config.validate().is_err());

        let config = AppConfig { timeout_ms: 301_000, ..Default::default() }; // 5min 1sec
        assert!(config.validate().is_err());

        let config = AppConfig { timeout_ms: 300_000, ..Default::default() }; // exactly 5 minutes
        assert!(config.validate().is_ok());
    }
}
