//! Keel worker — startup error types.

use keel_core::error::DomainError;
use thiserror::Error;

/// Startup and runtime errors for the worker.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Saga recovery or another store operation failed.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Signal handling or other I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
