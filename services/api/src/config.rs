//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;

use luna_core::{progress::TICK_INTERVAL, PointsPolicy};
use tracing::Level;

/// Selects the in-process store instead of SQLite.
pub const MEMORY_DATABASE_URL: &str = "memory";

const DEFAULT_CHAT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

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
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
    pub chat_api_base: String,
    pub points_policy: PointsPolicy,
    pub progress_tick: Duration,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Storage ---
        let bind_address_str = var_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000")?;
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = var_or(&lookup, "DATABASE_URL", "sqlite://luna.db?mode=rwc")?;

        let log_level_str = var_or(&lookup, "RUST_LOG", "INFO")?;
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = var_or(&lookup, "CORS_ORIGIN", "http://localhost:8081")?;

        // --- Language Model ---
        // An empty key is the same as no key.
        let gemini_api_key = lookup("GEMINI_API_KEY").filter(|key| !key.trim().is_empty());
        let chat_model = var_or(&lookup, "CHAT_MODEL", "gemini-2.0-flash")?;
        let chat_api_base = var_or(&lookup, "CHAT_API_BASE", DEFAULT_CHAT_API_BASE)?;

        // --- Progress ---
        let points_policy = var_or(&lookup, "POINTS_POLICY", "streak")?
            .parse::<PointsPolicy>()
            .map_err(|e| ConfigError::InvalidValue("POINTS_POLICY".to_string(), e))?;

        let default_tick = TICK_INTERVAL.as_secs().to_string();
        let tick_str = var_or(&lookup, "PROGRESS_TICK_SECS", &default_tick)?;
        let tick_secs = tick_str
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PROGRESS_TICK_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", tick_str),
                )
            })?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            gemini_api_key,
            chat_model,
            chat_api_base,
            points_policy,
            progress_tick: Duration::from_secs(tick_secs),
            cors_origin,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }
}

/// An unset variable takes `default`; a set but blank one is an error.
fn var_or<F>(lookup: &F, name: &str, default: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default.to_string()),
        Some(value) if value.trim().is_empty() => Err(ConfigError::MissingVar(name.to_string())),
        Some(value) => Ok(value),
    }
}
