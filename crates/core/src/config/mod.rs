//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CITEFLOW_*)
//! 2. TOML config file (if CITEFLOW_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// One week, the default lifetime of a cached response.
const DEFAULT_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CITEFLOW_*)
/// 2. TOML config file (if CITEFLOW_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider API key.
    ///
    /// Set via CITEFLOW_API_KEY environment variable. Required only when a
    /// query actually reaches the provider; its absence short-circuits the
    /// pipeline with a notice instead of an error.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Path to the SQLite key-value store backing cache and usage data.
    ///
    /// Set via CITEFLOW_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Model to query.
    ///
    /// Set via CITEFLOW_MODEL_NAME environment variable.
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Sampling temperature passed to the provider.
    ///
    /// Set via CITEFLOW_TEMPERATURE environment variable.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Optional system instructions sent with every query.
    #[serde(default)]
    pub instructions: Option<String>,

    /// Maximum provider calls per calendar day.
    ///
    /// Set via CITEFLOW_DAILY_LIMIT environment variable.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Lifetime of a cached response, in seconds.
    ///
    /// Set via CITEFLOW_CACHE_TTL_SECS environment variable.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Byte budget for the key-value store, after which writes are rejected.
    ///
    /// Set via CITEFLOW_STORE_MAX_BYTES environment variable.
    #[serde(default = "default_store_max_bytes")]
    pub store_max_bytes: usize,

    /// When true, usage checks report unlimited and nothing is recorded.
    ///
    /// Set via CITEFLOW_UNMETERED environment variable. An explicit flag,
    /// never inferred from the build profile.
    #[serde(default)]
    pub unmetered: bool,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via CITEFLOW_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./citeflow-store.sqlite")
}

fn default_model_name() -> String {
    "gemini-2.5-flash".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_daily_limit() -> u32 {
    20
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_store_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            db_path: default_db_path(),
            model_name: default_model_name(),
            temperature: default_temperature(),
            instructions: None,
            daily_limit: default_daily_limit(),
            cache_ttl_secs: default_cache_ttl_secs(),
            store_max_bytes: default_store_max_bytes(),
            unmetered: false,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CITEFLOW_`
    /// 2. TOML file from `CITEFLOW_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CITEFLOW_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CITEFLOW_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check if the provider API key is available (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the API key is not set.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "api_key".into(),
            hint: "Set CITEFLOW_API_KEY environment variable".into(),
        })
    }
}
