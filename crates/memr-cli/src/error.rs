use std::io;

use memr_core::config::ConfigError;
use memr_core::models::EntityKind;
use memr_core::sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] memr_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record ID cannot be empty")]
    EmptyId,
    #[error("Nothing to update; pass at least one field flag")]
    NothingToUpdate,
    #[error("--{field} does not apply to a {kind}")]
    UnsupportedField {
        field: &'static str,
        kind: EntityKind,
    },
    #[error("{0} records do not track views")]
    NotViewable(EntityKind),
    #[error("Invalid due date '{0}'; expected RFC 3339 like 2024-05-01T09:00:00Z")]
    InvalidDueDate(String),
    #[error("Could not resolve a data directory; pass --db-path or set MEMR_DB_PATH")]
    DataDirUnavailable,
    #[error("Sync is not configured. Set MEMR_SYNC_ENDPOINT (and MEMR_SYNC_TOKEN if the server needs one).")]
    SyncNotConfigured,
}
