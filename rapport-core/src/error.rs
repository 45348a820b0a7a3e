//! Error types for the rapport core library.

use thiserror::Error;

/// Top-level error type for all core-engine operations.
#[derive(Error, Debug)]
pub enum RapportError {
    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A custom stat definition is malformed (unknown kind, empty option list, ...).
    #[error("Invalid custom stat '{id}': {reason}")]
    InvalidCustomStat {
        /// Identifier of the offending definition.
        id: String,
        /// Why the definition was rejected.
        reason: String,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RapportError {
    fn from(err: serde_json::Error) -> Self {
        RapportError::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, RapportError>;
