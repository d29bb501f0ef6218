//! Project model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::stamps_from_change;
use super::{Change, Entity, EntityId, EntityKind, Stamps};

/// A project groups tasks into one board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: EntityId,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    /// Local-only, never synchronized
    pub viewed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub stamps: Stamps,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl Entity for Project {
    const KIND: EntityKind = EntityKind::Project;

    type Draft = ProjectDraft;
    type Patch = ProjectPatch;

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

    fn viewed_at(&self) -> Option<DateTime<Utc>> {
        self.viewed_at
    }

    fn set_viewed_at(&mut self, viewed_at: DateTime<Utc>) {
        self.viewed_at = Some(viewed_at);
    }

    fn from_draft(
        id: EntityId,
        user_id: Option<String>,
        draft: ProjectDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            title: draft.title,
            description: draft.description,
            color: draft.color,
            viewed_at: None,
            stamps: Stamps::new(now),
        }
    }

    fn apply_patch(&mut self, patch: &ProjectPatch) {
        if let Some(title) = &patch.title {
            self.title = Some(title.clone());
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(color) = &patch.color {
            self.color = Some(color.clone());
        }
    }

    fn describe_patch(patch: &ProjectPatch, change: &mut Change) {
        change.title.clone_from(&patch.title);
        change.description.clone_from(&patch.description);
        change.color.clone_from(&patch.color);
    }

    fn from_change(change: &Change, now: DateTime<Utc>) -> Self {
        Self {
            id: change.id.clone(),
            user_id: None,
            title: change.title.clone(),
            description: change.description.clone(),
            color: change.color.clone(),
            viewed_at: None,
            stamps: stamps_from_change(change, now),
        }
    }

    fn apply_change(&mut self, change: &Change) {
        if let Some(title) = &change.title {
            self.title = Some(title.clone());
        }
        if let Some(description) = &change.description {
            self.description = Some(description.clone());
        }
        if let Some(color) = &change.color {
            self.color = Some(color.clone());
        }
    }

    fn write_fields(&self, change: &mut Change) {
        change.title.clone_from(&self.title);
        change.description.clone_from(&self.description);
        change.color.clone_from(&self.color);
    }
}
