//! Synchronization with the remote authority.
//!
//! The [`SyncCoordinator`] collects an outgoing batch (merged change log or
//! dirty-record snapshot), exchanges it with a [`RemoteSyncEndpoint`] and
//! applies the returned remote changes through the same repositories used
//! for local edits.

mod coordinator;
mod endpoint;
mod memory;
mod protocol;

use thiserror::Error;

pub use coordinator::{SyncCoordinator, SyncOutcome, SyncReport, SyncStatus};
pub use endpoint::{HttpSyncEndpoint, RemoteSyncEndpoint, SYNC_PATH};
pub use memory::InMemorySyncEndpoint;
pub use protocol::{SyncEnvelope, SyncRequest, SyncResponse};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid sync configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Sync API error: {0}")]
    Api(String),
    #[error("Invalid sync payload: {0}")]
    InvalidPayload(String),
    #[error("Local store error during sync: {0}")]
    Store(#[from] crate::Error),
}

impl SyncError {
    /// Whether the failure came from the network or the remote.
    ///
    /// These are retried on the next tick without any local state change.
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Api(_) | Self::InvalidPayload(_))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
