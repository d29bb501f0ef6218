//! Wire types for the sync endpoint

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Change;

/// `POST` body: local changes plus the client's watermark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub changes: Vec<Change>,
    pub last_sync_time: DateTime<Utc>,
}

/// Remote changes newer than the request watermark, plus the new watermark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(default)]
    pub changes: Vec<Change>,
    pub last_sync_time: DateTime<Utc>,
}

/// The endpoint wraps its response in a `data` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEnvelope {
    pub data: SyncResponse,
}
