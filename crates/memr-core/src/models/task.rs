//! Task model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{parent_from_wire, stamps_from_change};
use super::{Change, Entity, EntityId, EntityKind, SortBy, Stamps};

/// A task, ordered within its project column by a rank key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub user_id: Option<String>,
    pub project_id: Option<EntityId>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// See the `STATUS_*` constants; unknown values are kept as-is
    pub status: i32,
    /// Rank key among siblings in the same project
    pub sort_order: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub stamps: Stamps,
}

impl Task {
    pub const STATUS_ARCHIVED: i32 = -1;
    pub const STATUS_TODO: i32 = 0;
    pub const STATUS_IN_PROGRESS: i32 = 1;
    pub const STATUS_DONE: i32 = 2;

    /// Title for list output, falling back to the description.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .or(self.description.as_deref())
            .unwrap_or("")
    }

    pub const fn is_done(&self) -> bool {
        self.status == Self::STATUS_DONE
    }
}

/// Input for [`Task`] creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub project_id: Option<EntityId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<i32>,
    /// Appended after the last sibling when absent
    pub sort_order: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Partial [`Task`] update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// `Some(None)` detaches the task from its project
    pub project_id: Option<Option<EntityId>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<i32>,
    pub sort_order: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl Entity for Task {
    const KIND: EntityKind = EntityKind::Task;

    type Draft = TaskDraft;
    type Patch = TaskPatch;

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
        self.project_id.as_ref()
    }

    fn default_sort() -> SortBy {
        SortBy::Rank
    }

    fn from_draft(
        id: EntityId,
        user_id: Option<String>,
        draft: TaskDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            project_id: draft.project_id,
            title: draft.title,
            description: draft.description,
            status: draft.status.unwrap_or(Self::STATUS_TODO),
            sort_order: draft.sort_order,
            due_date: draft.due_date,
            stamps: Stamps::new(now),
        }
    }

    fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(project_id) = &patch.project_id {
            self.project_id.clone_from(project_id);
        }
        if let Some(title) = &patch.title {
            self.title = Some(title.clone());
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(sort_order) = &patch.sort_order {
            self.sort_order = Some(sort_order.clone());
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = Some(due_date);
        }
    }

    fn describe_patch(patch: &TaskPatch, change: &mut Change) {
        if let Some(project_id) = &patch.project_id {
            change.project_id = Some(
                project_id
                    .as_ref()
                    .map(|id| id.as_str().to_string())
                    .unwrap_or_default(),
            );
        }
        change.title.clone_from(&patch.title);
        change.description.clone_from(&patch.description);
        change.status = patch.status;
        change.sort_order.clone_from(&patch.sort_order);
        change.due_date = patch.due_date;
    }

    fn from_change(change: &Change, now: DateTime<Utc>) -> Self {
        Self {
            id: change.id.clone(),
            user_id: None,
            project_id: change.project_id.as_deref().and_then(parent_from_wire),
            title: change.title.clone(),
            description: change.description.clone(),
            status: change.status.unwrap_or(Self::STATUS_TODO),
            sort_order: change.sort_order.clone(),
            due_date: change.due_date,
            stamps: stamps_from_change(change, now),
        }
    }

    fn apply_change(&mut self, change: &Change) {
        if let Some(project_id) = change.project_id.as_deref() {
            self.project_id = parent_from_wire(project_id);
        }
        if let Some(title) = &change.title {
            self.title = Some(title.clone());
        }
        if let Some(description) = &change.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = change.status {
            self.status = status;
        }
        if let Some(sort_order) = &change.sort_order {
            self.sort_order = Some(sort_order.clone());
        }
        if let Some(due_date) = change.due_date {
            self.due_date = Some(due_date);
        }
    }

    fn write_fields(&self, change: &mut Change) {
        change.project_id = Some(
            self.project_id
                .as_ref()
                .map(|id| id.as_str().to_string())
                .unwrap_or_default(),
        );
        change.title.clone_from(&self.title);
        change.description.clone_from(&self.description);
        change.status = Some(self.status);
        change.sort_order.clone_from(&self.sort_order);
        change.due_date = self.due_date;
    }
}
