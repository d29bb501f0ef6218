//! Database layer for memr

mod change_log;
mod connection;
mod conflicts;
mod migrations;
mod repository;
mod rows;
mod settings_repository;

pub use change_log::SqliteChangeLog;
pub use connection::Database;
pub use conflicts::SqliteConflictRepository;
pub use repository::{EntityRepository, SqliteEntityRepository, UpsertOutcome};
pub use rows::StoredEntity;
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
