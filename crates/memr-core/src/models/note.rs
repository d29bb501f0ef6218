//! Note model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{parent_from_wire, stamps_from_change};
use super::{Change, Entity, EntityId, EntityKind, Stamps};

/// A free-text note, optionally filed under a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: EntityId,
    pub user_id: Option<String>,
    pub collection_id: Option<EntityId>,
    pub title: Option<String>,
    /// Markdown body
    pub content: Option<String>,
    pub viewed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub stamps: Stamps,
}

impl Note {
    /// Get first line as title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .or_else(|| self.content.as_deref().and_then(|c| c.lines().next()))
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub collection_id: Option<EntityId>,
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    /// `Some(None)` removes the note from its collection
    pub collection_id: Option<Option<EntityId>>,
    pub title: Option<String>,
    pub content: Option<String>,
}

impl Entity for Note {
    const KIND: EntityKind = EntityKind::Note;

    type Draft = NoteDraft;
    type Patch = NotePatch;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn stamps(&self) -> &Stamps {
        &self.stamps
    }

    fn stamps_mut(&mut self) -> &mut Stamps {
        &mut self.stamps
    }

    fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    fn parent_id(&self) -> Option<&EntityId> {
        self.collection_id.as_ref()
    }

    fn viewed_at(&self) -> Option<DateTime<Utc>> {
        self.viewed_at
    }

    fn set_viewed_at(&mut self, viewed_at: DateTime<Utc>) {
        self.viewed_at = Some(viewed_at);
    }

    fn from_draft(
        id: EntityId,
        user_id: Option<String>,
        draft: NoteDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            collection_id: draft.collection_id,
            title: draft.title,
            content: draft.content,
            viewed_at: None,
            stamps: Stamps::new(now),
        }
    }

    fn apply_patch(&mut self, patch: &NotePatch) {
        if let Some(collection_id) = &patch.collection_id {
            self.collection_id.clone_from(collection_id);
        }
        if let Some(title) = &patch.title {
            self.title = Some(title.clone());
        }
        if let Some(content) = &patch.content {
            self.content = Some(content.clone());
        }
    }

    fn describe_patch(patch: &NotePatch, change: &mut Change) {
        if let Some(collection_id) = &patch.collection_id {
            change.collection_id = Some(
                collection_id
                    .as_ref()
                    .map(|id| id.as_str().to_string())
                    .unwrap_or_default(),
            );
        }
        change.title.clone_from(&patch.title);
        change.content.clone_from(&patch.content);
    }

    fn from_change(change: &Change, now: DateTime<Utc>) -> Self {
        Self {
            id: change.id.clone(),
            user_id: None,
            collection_id: change.collection_id.as_deref().and_then(parent_from_wire),
            title: change.title.clone(),
            content: change.content.clone(),
            viewed_at: None,
            stamps: stamps_from_change(change, now),
        }
    }

    fn apply_change(&mut self, change: &Change) {
        if let Some(collection_id) = change.collection_id.as_deref() {
            self.collection_id = parent_from_wire(collection_id);
        }
        if let Some(title) = &change.title {
            self.title = Some(title.clone());
        }
        if let Some(content) = &change.content {
            self.content = Some(content.clone());
        }
    }

    fn write_fields(&self, change: &mut Change) {
        change.collection_id = Some(
            self.collection_id
                .as_ref()
                .map(|id| id.as_str().to_string())
                .unwrap_or_default(),
        );
        change.title.clone_from(&self.title);
        change.content.clone_from(&self.content);
    }
}
