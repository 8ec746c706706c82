//! Ingestion configuration
//!
//! Everything is read from the environment (after `.env` is loaded by the
//! binary). Unset variables fall back to defaults; set but unparsable
//! variables are errors.

use larder_common::{LarderError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::db::DbConfig;

/// Default FoodData Central API root
pub const DEFAULT_FDC_BASE_URL: &str = "https://api.nal.usda.gov/fdc/v1";

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Postgres settings; `None` selects the in-memory store
    pub database: Option<DbConfig>,
    /// Upper bound on jobs executing at the same time
    pub max_concurrent_jobs: usize,
    /// Write a progress message every N rows
    pub progress_interval: u64,
    /// CSV files larger than this are not pre-counted (TotalRecords stays null)
    pub count_threshold_bytes: u64,
    /// External nutrient lookup
    pub nutrient_lookup: NutrientLookupConfig,
}

/// FoodData Central lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutrientLookupConfig {
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub search_limit: usize,
}

impl Default for NutrientLookupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: DEFAULT_FDC_BASE_URL.to_string(),
            timeout_secs: 10,
            search_limit: 5,
        }
    }
}

impl NutrientLookupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: None,
            max_concurrent_jobs: 4,
            progress_interval: 25,
            count_threshold_bytes: 64 * 1024 * 1024,
            nutrient_lookup: NutrientLookupConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let database = match std::env::var("DATABASE_URL") {
            Ok(_) => Some(DbConfig::from_env()?),
            Err(_) => None,
        };

        let nutrient_lookup = NutrientLookupConfig {
            enabled: env_or("NUTRIENT_LOOKUP_ENABLED", defaults.nutrient_lookup.enabled)?,
            api_key: std::env::var("FDC_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            base_url: std::env::var("FDC_BASE_URL")
                .unwrap_or(defaults.nutrient_lookup.base_url),
            timeout_secs: env_or(
                "NUTRIENT_LOOKUP_TIMEOUT_SECS",
                defaults.nutrient_lookup.timeout_secs,
            )?,
            search_limit: env_or("NUTRIENT_SEARCH_LIMIT", defaults.nutrient_lookup.search_limit)?,
        };

        let config = Self {
            database,
            max_concurrent_jobs: env_or("INGEST_MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?,
            progress_interval: env_or("INGEST_PROGRESS_INTERVAL", defaults.progress_interval)?,
            count_threshold_bytes: env_or(
                "INGEST_COUNT_THRESHOLD_BYTES",
                defaults.count_threshold_bytes,
            )?,
            nutrient_lookup,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(LarderError::config("INGEST_MAX_CONCURRENT_JOBS must be at least 1"));
        }
        if self.progress_interval == 0 {
            return Err(LarderError::config("INGEST_PROGRESS_INTERVAL must be at least 1"));
        }
        if self.nutrient_lookup.timeout_secs == 0 {
            return Err(LarderError::config("NUTRIENT_LOOKUP_TIMEOUT_SECS must be at least 1"));
        }
        if self.nutrient_lookup.enabled && self.nutrient_lookup.api_key.is_none() {
            return Err(LarderError::config(
                "FDC_API_KEY is required when NUTRIENT_LOOKUP_ENABLED=true",
            ));
        }
        Ok(())
    }
}

/// Parse `key` from the environment, or return `default` when unset
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| LarderError::invalid_setting(key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "DATABASE_URL",
        "INGEST_MAX_CONCURRENT_JOBS",
        "INGEST_PROGRESS_INTERVAL",
        "NUTRIENT_LOOKUP_ENABLED",
        "FDC_API_KEY",
        "NUTRIENT_LOOKUP_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = IngestConfig::from_env().unwrap();

        assert!(config.database.is_none());
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.progress_interval, 25);
        assert!(!config.nutrient_lookup.enabled);
        assert_eq!(config.nutrient_lookup.base_url, DEFAULT_FDC_BASE_URL);
    }

    #[test]
    #[serial]
    fn test_database_url_selects_postgres() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgresql://localhost/larder_test");
        std::env::set_var("INGEST_MAX_CONCURRENT_JOBS", "2");

        let config = IngestConfig::from_env().unwrap();
        clear_env();

        let db = config.database.unwrap();
        assert!(db.url.contains("larder_test"));
        assert_eq!(config.max_concurrent_jobs, 2);
    }

    #[test]
    #[serial]
    fn test_unparsable_value_is_rejected() {
        clear_env();
        std::env::set_var("INGEST_PROGRESS_INTERVAL", "often");
        let result = IngestConfig::from_env();
        clear_env();

        assert!(matches!(result, Err(LarderError::InvalidSetting { .. })));
    }

    #[test]
    #[serial]
    fn test_lookup_requires_api_key() {
        clear_env();
        std::env::set_var("NUTRIENT_LOOKUP_ENABLED", "true");
        let result = IngestConfig::from_env();
        clear_env();

        assert!(matches!(result, Err(LarderError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = IngestConfig {
            max_concurrent_jobs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = IngestConfig::default();
        config.nutrient_lookup.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
