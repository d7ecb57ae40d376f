//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;

use crypto_bird_core::DEFAULT_BONUS_PER_REFERRAL;
use tracing::Level;

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
    pub db_max_connections: u32,
    pub cors_allowed_origin: Option<String>,
    pub leaderboard_default_limit: u32,
    pub leaderboard_max_limit: u32,
    pub referral_bonus: i64,
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

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address: SocketAddr =
            parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", Some(5))?;
        require_positive("DB_MAX_CONNECTIONS", db_max_connections)?;

        let cors_allowed_origin = lookup("CORS_ALLOWED_ORIGIN").filter(|v| !v.trim().is_empty());

        // --- Read Path Settings ---
        let leaderboard_default_limit = parse_or(&lookup, "LEADERBOARD_DEFAULT_LIMIT", Some(10))?;
        require_positive("LEADERBOARD_DEFAULT_LIMIT", leaderboard_default_limit)?;
        let leaderboard_max_limit = parse_or(&lookup, "LEADERBOARD_MAX_LIMIT", Some(100))?;
        if leaderboard_max_limit < leaderboard_default_limit {
            return Err(ConfigError::InvalidValue(
                "LEADERBOARD_MAX_LIMIT".to_string(),
                "must not be smaller than LEADERBOARD_DEFAULT_LIMIT".to_string(),
            ));
        }

        let referral_bonus =
            parse_or(&lookup, "REFERRAL_BONUS_PER_REFERRAL", Some(DEFAULT_BONUS_PER_REFERRAL))?;
        if referral_bonus < 0 {
            return Err(ConfigError::InvalidValue(
                "REFERRAL_BONUS_PER_REFERRAL".to_string(),
                "must not be negative".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            db_max_connections,
            cors_allowed_origin,
            leaderboard_default_limit,
            leaderboard_max_limit,
            referral_bonus,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}

fn require_positive(key: &str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_database_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/bird")]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.cors_allowed_origin, None);
        assert_eq!(config.leaderboard_default_limit, 10);
        assert_eq!(config.leaderboard_max_limit, 100);
        assert_eq!(config.referral_bonus, 100);
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(var)) if var == "DATABASE_URL"));
    }

    #[test]
    fn bad_values_are_reported_by_name() {
        let err = load(&[("DATABASE_URL", "x"), ("BIND_ADDRESS", "nowhere")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "BIND_ADDRESS"));

        let err = load(&[("DATABASE_URL", "x"), ("RUST_LOG", "chatty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "RUST_LOG"));

        let err = load(&[("DATABASE_URL", "x"), ("LEADERBOARD_DEFAULT_LIMIT", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "LEADERBOARD_DEFAULT_LIMIT"));
    }

    #[test]
    fn max_limit_cannot_undercut_default() {
        let err = load(&[
            ("DATABASE_URL", "x"),
            ("LEADERBOARD_DEFAULT_LIMIT", "20"),
            ("LEADERBOARD_MAX_LIMIT", "10"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "LEADERBOARD_MAX_LIMIT"));
    }
}
