//! services/api/src/error.rs
//!
//! The error type returned by the service's startup path.

use crate::config::ConfigError;
use luna_core::ports::PortError;

/// Anything that can stop the `luna_api` server from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The environment did not describe a usable configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A core component failed while the server was being wired up.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The SQLite pool could not be opened.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// The schema migrations could not be applied.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Binding the listener or serving failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
