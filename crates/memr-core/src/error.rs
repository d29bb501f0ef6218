//! Error types for memr-core

use thiserror::Error;

use crate::models::EntityKind;

/// Result type alias using memr-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in memr-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity is missing or already soft-deleted
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored timestamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    Timestamp(String),
}

impl Error {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether this error reports a missing or tombstoned entity.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
