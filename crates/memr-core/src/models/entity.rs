//! Identity, lifecycle stamps and the shared entity contract

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Change;
use crate::error::Error;

/// Opaque, client-generated entity identifier.
///
/// New ids are UUID v7 so they sort by creation time, but ids received from
/// the remote are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new unique id using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("entity id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&EntityId> for EntityId {
    fn from(value: &EntityId) -> Self {
        value.clone()
    }
}

/// The four synchronized entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Task,
    Project,
    Note,
    Collection,
}

impl EntityKind {
    pub const ALL: [Self; 4] = [Self::Task, Self::Project, Self::Note, Self::Collection];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Project => "project",
            Self::Note => "note",
            Self::Collection => "collection",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "project" => Ok(Self::Project),
            "note" => Ok(Self::Note),
            "collection" => Ok(Self::Collection),
            other => Err(Error::InvalidInput(format!("unknown entity kind: {other}"))),
        }
    }
}

/// Lifecycle timestamps carried by every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stamps {
    /// Set once at creation
    pub created_at: DateTime<Utc>,
    /// Bumped on every mutation
    pub updated_at: DateTime<Utc>,
    /// Present on tombstones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// The `updated_at` value last acknowledged by the remote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Stamps {
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
            synced_at: None,
        }
    }

    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the current version still has to be sent to the remote.
    pub fn is_dirty(&self) -> bool {
        match self.synced_at {
            Some(synced) => synced < self.updated_at,
            None => true,
        }
    }

    /// Bump `updated_at` for a local mutation.
    ///
    /// The new value is strictly greater than the previous one even when the
    /// clock has not advanced, so an edit made in the same millisecond as the
    /// last acknowledgement still reads as dirty.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let floor = self.updated_at + chrono::Duration::milliseconds(1);
        self.updated_at = now.max(floor);
    }

    /// Copy lifecycle fields into a wire change.
    pub(crate) fn write_into(&self, change: &mut Change) {
        change.created_at = Some(self.created_at);
        change.updated_at = Some(self.updated_at);
        change.deleted_at = self.deleted_at;
    }
}

/// Field used to order `list` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Ascending byte-wise rank key comparison; missing ranks first
    Rank,
    /// Newest first
    UpdatedAt,
    /// Newest first
    CreatedAt,
    /// Most recently viewed first; never-viewed last
    ViewedAt,
}

/// Filter and order for `list` queries.
///
/// Tombstones are always excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Restrict to children of this parent (project for tasks, collection for notes)
    pub parent_id: Option<EntityId>,
    /// Defaults to the kind's natural order when `None`
    pub sort_by: Option<SortBy>,
    /// Only rows whose current version has not been acknowledged
    pub unsynced_only: bool,
}

impl ListQuery {
    pub fn in_parent(parent_id: impl Into<EntityId>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn sorted_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = Some(sort_by);
        self
    }
}

/// Behaviour shared by tasks, projects, notes and collections.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Creation input
    type Draft: Clone + Default + Send + Sync + 'static;
    /// Partial update; `None` fields are left untouched
    type Patch: Clone + Default + Send + Sync + 'static;

    fn id(&self) -> &EntityId;
    fn stamps(&self) -> &Stamps;
    fn stamps_mut(&mut self) -> &mut Stamps;
    fn user_id(&self) -> Option<&str>;

    /// Parent used for `ListQuery::parent_id`, if the kind has one.
    fn parent_id(&self) -> Option<&EntityId> {
        None
    }

    /// Local-only last-viewed time, for kinds that track it.
    fn viewed_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn set_viewed_at(&mut self, _viewed_at: DateTime<Utc>) {}

    /// Order used when a query does not ask for one.
    fn default_sort() -> SortBy {
        SortBy::UpdatedAt
    }

    /// Build a live record from creation input.
    fn from_draft(
        id: EntityId,
        user_id: Option<String>,
        draft: Self::Draft,
        now: DateTime<Utc>,
    ) -> Self;

    fn apply_patch(&mut self, patch: &Self::Patch);

    /// Record the fields a patch touches in a change.
    fn describe_patch(patch: &Self::Patch, change: &mut Change);

    /// Build a record from a remote change for an id that is not stored yet.
    fn from_change(change: &Change, now: DateTime<Utc>) -> Self;

    /// Merge the content fields a remote change defines.
    fn apply_change(&mut self, change: &Change);

    /// Write the content fields into a change.
    fn write_fields(&self, change: &mut Change);

    /// Project the whole record into its wire form.
    fn to_change(&self) -> Change {
        let mut change = Change::new(Self::KIND, self.id().clone());
        self.write_fields(&mut change);
        self.stamps().write_into(&mut change);
        change
    }

    fn is_deleted(&self) -> bool {
        self.stamps().is_deleted()
    }
}

/// Stamps for a record first seen through a remote change.
pub(crate) fn stamps_from_change(change: &Change, now: DateTime<Utc>) -> Stamps {
    let updated_at = change.updated_at.or(change.created_at).unwrap_or(now);
    Stamps {
        created_at: change.created_at.unwrap_or(updated_at),
        updated_at,
        deleted_at: change.deleted_at,
        synced_at: None,
    }
}

/// Parent reference carried on the wire; an empty string clears it.
pub(crate) fn parent_from_wire(value: &str) -> Option<EntityId> {
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_unique() {
        assert_ne!(EntityId::new(), EntityId::new());
    }

    #[test]
    fn entity_id_rejects_blank() {
        assert!("   ".parse::<EntityId>().is_err());
        assert_eq!(" abc ".parse::<EntityId>().unwrap().as_str(), "abc");
    }

    #[test]
    fn entity_kind_round_trips_wire_names() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
        assert!("tag".parse::<EntityKind>().is_err());
    }

    #[test]
    fn stamps_dirty_until_acknowledged() {
        let now = crate::util::now_millis();
        let mut stamps = Stamps::new(now);
        assert!(stamps.is_dirty());

        stamps.synced_at = Some(now);
        assert!(!stamps.is_dirty());

        stamps.updated_at = now + chrono::Duration::milliseconds(5);
        assert!(stamps.is_dirty());
    }

    #[test]
    fn touch_always_moves_forward() {
        let now = crate::util::now_millis();
        let mut stamps = Stamps::new(now);
        stamps.touch(now);
        assert!(stamps.updated_at > now);

        let later = now + chrono::Duration::seconds(10);
        stamps.touch(later);
        assert_eq!(stamps.updated_at, later);
    }
}
