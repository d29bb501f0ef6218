//! Shared services used by all clients

mod autosave;
mod database;

pub use autosave::AutosaveDebouncer;
pub use database::{ApplySummary, DatabaseService, LiveQuery, OutgoingBatch};
