//! Sync conflict model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityId, EntityKind};

/// Strategy name recorded for whole-record last-writer-wins rejections.
pub const LWW_STRATEGY: &str = "lww";

/// Recorded sync conflict resolved by strategy (e.g., LWW)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    /// Existing row's timestamp when conflict occurred
    pub local_updated_at: DateTime<Utc>,
    /// Incoming row's timestamp that was rejected
    pub incoming_updated_at: DateTime<Utc>,
    pub resolved_at: DateTime<Utc>,
    /// Resolution strategy name
    pub strategy: String,
}
