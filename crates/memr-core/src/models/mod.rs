//! Data models for memr

mod change;
mod collection;
mod entity;
mod note;
mod project;
mod settings;
mod sync_conflict;
mod task;

pub use change::{merge_log_entries, Change, ChangeLogEntry, MergedChanges};
pub use collection::{Collection, CollectionDraft, CollectionPatch};
pub use entity::{Entity, EntityId, EntityKind, ListQuery, SortBy, Stamps};
pub use note::{Note, NoteDraft, NotePatch};
pub use project::{Project, ProjectDraft, ProjectPatch};
pub use settings::{Setting, CURRENT_USER_ID_KEY, LAST_SYNC_SUCCESS_KEY, LAST_SYNC_TIME_KEY};
pub use sync_conflict::{SyncConflict, LWW_STRATEGY};
pub use task::{Task, TaskDraft, TaskPatch};
