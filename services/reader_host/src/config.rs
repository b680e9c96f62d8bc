//! services/reader_host/src/config.rs
//!
//! Defines the host's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use note_access_core::gateway::DEFAULT_AD_KEYWORDS;
use tracing::Level;

/// Test unit IDs published by the ad network; safe to use outside production.
pub const TEST_REWARDED_INTERSTITIAL_UNIT: &str = "ca-app-pub-3940256099942544/5354046379";
pub const TEST_INTERSTITIAL_UNIT: &str = "ca-app-pub-3940256099942544/1033173712";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub allowed_origin: String,
    pub backend_base_url: String,
    pub backend_token: Option<String>,
    pub backend_timeout: Duration,
    pub rewarded_ad_unit_id: String,
    pub interstitial_ad_unit_id: String,
    pub ad_keywords: Vec<String>,
    pub access_store_key: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and storage ---
        let bind_address_str = var_or("BIND_ADDRESS", "127.0.0.1:4100");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = var_or("DATABASE_URL", "sqlite://reader_host.db");

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin = var_or("ALLOWED_ORIGIN", "http://localhost:8081");

        // --- Notes backend ---
        let backend_base_url = lookup("BACKEND_BASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("BACKEND_BASE_URL".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let backend_token = lookup("BACKEND_TOKEN").filter(|t| !t.trim().is_empty());
        let timeout_str = var_or("BACKEND_TIMEOUT_MS", "15000");
        let backend_timeout = timeout_str
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue("BACKEND_TIMEOUT_MS".to_string(), e.to_string()))?;

        // --- Ads ---
        let rewarded_ad_unit_id = var_or("REWARDED_AD_UNIT_ID", TEST_REWARDED_INTERSTITIAL_UNIT);
        let interstitial_ad_unit_id = var_or("INTERSTITIAL_AD_UNIT_ID", TEST_INTERSTITIAL_UNIT);
        let ad_keywords = match lookup("AD_KEYWORDS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_AD_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        };

        let access_store_key = var_or("ACCESS_STORE_KEY", "psc-ad-store");

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            allowed_origin,
            backend_base_url,
            backend_token,
            backend_timeout,
            rewarded_ad_unit_id,
            interstitial_ad_unit_id,
            ad_keywords,
            access_store_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_fill_everything_but_the_backend() {
        let config = load(&[("BACKEND_BASE_URL", "https://api.example.com/api/")]).unwrap();
        assert_eq!(config.backend_base_url, "https://api.example.com/api");
        assert_eq!(config.access_store_key, "psc-ad-store");
        assert_eq!(config.ad_keywords, vec!["education", "exam", "study", "learning"]);
        assert_eq!(config.backend_timeout, Duration::from_millis(15000));
        assert_eq!(config.rewarded_ad_unit_id, TEST_REWARDED_INTERSTITIAL_UNIT);
        assert!(config.backend_token.is_none());
    }

    #[test]
    fn backend_url_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(var)) if var == "BACKEND_BASE_URL"));
    }

    #[test]
    fn invalid_values_are_reported_by_name() {
        let err = load(&[
            ("BACKEND_BASE_URL", "https://api.example.com"),
            ("BACKEND_TIMEOUT_MS", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "BACKEND_TIMEOUT_MS"));

        let err = load(&[
            ("BACKEND_BASE_URL", "https://api.example.com"),
            ("RUST_LOG", "chatty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "RUST_LOG"));
    }

    #[test]
    fn keywords_are_split_and_trimmed() {
        let config = load(&[
            ("BACKEND_BASE_URL", "https://api.example.com"),
            ("AD_KEYWORDS", " loksewa, exam ,,gk "),
            ("BACKEND_TOKEN", "  "),
        ])
        .unwrap();
        assert_eq!(config.ad_keywords, vec!["loksewa", "exam", "gk"]);
        assert!(config.backend_token.is_none());
    }
}
