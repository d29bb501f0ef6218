//! Singleton settings rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settings key holding the sync watermark.
pub const LAST_SYNC_TIME_KEY: &str = "lastSyncTime";

/// Settings key holding the local clock time of the last applied sync.
pub const LAST_SYNC_SUCCESS_KEY: &str = "lastSyncSuccessAt";

/// Settings key holding the id stamped into new entities' `user_id`.
pub const CURRENT_USER_ID_KEY: &str = "currentUserId";

/// One named value in the settings table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub name: String,
    /// JSON-encoded value
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Setting {
    /// The value as text, when it is a JSON string.
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}
