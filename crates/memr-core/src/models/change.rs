//! Wire-format changes and the local change log

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityId, EntityKind};

/// One entity's state (or a subset of it) as exchanged with the remote.
///
/// Absent fields mean "unchanged". Parent references use an empty string to
/// mean "no parent".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Change {
    /// An empty change for the given entity.
    pub const fn new(kind: EntityKind, id: EntityId) -> Self {
        Self {
            id,
            kind,
            title: None,
            description: None,
            content: None,
            color: None,
            project_id: None,
            collection_id: None,
            sort_order: None,
            due_date: None,
            status: None,
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }

    /// Fill every field this change leaves undefined from an older change.
    ///
    /// Timestamps are combined instead: `updated_at` keeps the maximum and
    /// `created_at` the minimum of both.
    pub fn fill_from_older(&mut self, older: &Self) {
        fn fill<T: Clone>(slot: &mut Option<T>, older: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(older);
            }
        }

        fill(&mut self.title, &older.title);
        fill(&mut self.description, &older.description);
        fill(&mut self.content, &older.content);
        fill(&mut self.color, &older.color);
        fill(&mut self.project_id, &older.project_id);
        fill(&mut self.collection_id, &older.collection_id);
        fill(&mut self.sort_order, &older.sort_order);
        fill(&mut self.due_date, &older.due_date);
        fill(&mut self.status, &older.status);
        fill(&mut self.deleted_at, &older.deleted_at);

        self.updated_at = self.updated_at.max(older.updated_at);
        self.created_at = match (self.created_at, older.created_at) {
            (Some(mine), Some(theirs)) => Some(mine.min(theirs)),
            (mine, theirs) => mine.or(theirs),
        };
    }
}

/// A pending row of the local change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogEntry {
    /// Monotonic log sequence, used to acknowledge exactly the flushed rows
    pub seq: i64,
    pub change: Change,
    pub logged_at: DateTime<Utc>,
}

/// Consolidated outgoing changes built from pending log rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedChanges {
    pub changes: Vec<Change>,
    /// Every log sequence folded into `changes`
    pub seqs: Vec<i64>,
}

/// Merge pending log rows into one change per `(kind, id)`.
///
/// Within a group entries are visited newest first by `updated_at` (later log
/// rows win ties) and each field takes the first value that defines it.
pub fn merge_log_entries(entries: &[ChangeLogEntry]) -> MergedChanges {
    let mut groups: BTreeMap<(EntityKind, &EntityId), Vec<&ChangeLogEntry>> = BTreeMap::new();
    for entry in entries {
        groups
            .entry((entry.change.kind, &entry.change.id))
            .or_default()
            .push(entry);
    }

    let mut merged = MergedChanges::default();
    for (_, mut group) in groups {
        group.sort_by(|a, b| {
            b.change
                .updated_at
                .cmp(&a.change.updated_at)
                .then(b.seq.cmp(&a.seq))
        });

        let mut newest = group[0].change.clone();
        for older in &group[1..] {
            newest.fill_from_older(&older.change);
        }
        merged.seqs.extend(group.iter().map(|entry| entry.seq));
        merged.changes.push(newest);
    }
    merged.seqs.sort_unstable();
    merged
}
