//! Entity repository implementation

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::conflicts::SqliteConflictRepository;
use super::rows::StoredEntity;
use crate::error::{Error, Result};
use crate::models::{Change, EntityId, ListQuery, SortBy, Task};
use crate::util::{format_timestamp, truncate_millis};

/// What `upsert` did with a remote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The local row is newer; the change was recorded as a conflict and dropped
    Stale {
        local_updated_at: DateTime<Utc>,
        incoming_updated_at: DateTime<Utc>,
    },
}

/// Trait for entity storage operations
pub trait EntityRepository<E: StoredEntity> {
    /// Create a new live record
    fn create(&self, user_id: Option<String>, draft: E::Draft, now: DateTime<Utc>) -> Result<E>;

    /// Get a live record by ID
    fn get(&self, id: &EntityId) -> Result<Option<E>>;

    /// Get a record by ID, tombstones included
    fn get_including_deleted(&self, id: &EntityId) -> Result<Option<E>>;

    /// List live records
    fn list(&self, query: &ListQuery) -> Result<Vec<E>>;

    /// Merge a patch into a live record and bump `updated_at`
    fn update(&self, id: &EntityId, patch: &E::Patch, now: DateTime<Utc>) -> Result<E>;

    /// Apply a remote change: insert if absent, otherwise merge
    fn upsert(&self, change: &Change, now: DateTime<Utc>) -> Result<UpsertOutcome>;

    /// Soft delete a live record
    fn soft_delete(&self, id: &EntityId, now: DateTime<Utc>) -> Result<E>;
}

/// `SQLite` implementation of `EntityRepository`
pub struct SqliteEntityRepository<'a, E> {
    conn: &'a Connection,
    entity: PhantomData<E>,
}

impl<'a, E: StoredEntity> SqliteEntityRepository<'a, E> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            entity: PhantomData,
        }
    }

    fn select_clause() -> String {
        format!("SELECT {} FROM {}", E::COLUMNS.join(", "), E::TABLE)
    }

    fn insert(&self, entity: &E) -> Result<()> {
        let placeholders = vec!["?"; E::COLUMNS.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            E::TABLE,
            E::COLUMNS.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(entity.to_values()))?;
        Ok(())
    }

    /// Overwrite every column of an existing row.
    fn save(&self, entity: &E) -> Result<()> {
        let assignments = E::COLUMNS[1..]
            .iter()
            .enumerate()
            .map(|(idx, column)| format!("{column} = ?{}", idx + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {assignments} WHERE id = ?1", E::TABLE);
        let changed = self
            .conn
            .execute(&sql, params_from_iter(entity.to_values()))?;
        if changed == 0 {
            return Err(Error::not_found(E::KIND, entity.id().as_str()));
        }
        Ok(())
    }

    fn require_live(&self, id: &EntityId) -> Result<E> {
        self.get(id)?
            .ok_or_else(|| Error::not_found(E::KIND, id.as_str()))
    }

    fn order_clause(sort_by: SortBy) -> String {
        match sort_by {
            SortBy::Rank if E::HAS_RANK => {
                "ORDER BY COALESCE(sort_order, '') ASC, created_at ASC, id ASC".to_string()
            }
            SortBy::Rank => "ORDER BY created_at ASC, id ASC".to_string(),
            SortBy::UpdatedAt => "ORDER BY updated_at DESC, id ASC".to_string(),
            SortBy::CreatedAt => "ORDER BY created_at DESC, id ASC".to_string(),
            SortBy::ViewedAt if E::HAS_VIEWED_AT => {
                "ORDER BY viewed_at IS NULL, viewed_at DESC, updated_at DESC, id ASC".to_string()
            }
            SortBy::ViewedAt => "ORDER BY updated_at DESC, id ASC".to_string(),
        }
    }

    fn query(&self, sql: &str, values: Vec<Value>) -> Result<Vec<E>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values), E::from_row)?;
        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        Ok(entities)
    }

    /// Set the local-only `viewed_at` without bumping `updated_at`.
    pub fn mark_viewed(&self, id: &EntityId, now: DateTime<Utc>) -> Result<E> {
        let mut entity = self.require_live(id)?;
        entity.set_viewed_at(now);
        self.save(&entity)?;
        Ok(entity)
    }

    /// Records (tombstones included) whose current version is unacknowledged.
    pub fn dirty(&self) -> Result<Vec<E>> {
        let sql = format!(
            "{} WHERE synced_at IS NULL OR synced_at < updated_at ORDER BY updated_at ASC, id ASC",
            Self::select_clause()
        );
        self.query(&sql, Vec::new())
    }

    pub fn count_dirty(&self) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE synced_at IS NULL OR synced_at < updated_at",
            E::TABLE
        );
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Acknowledge a transmitted version.
    ///
    /// Returns false when the row changed again after `sent_updated_at` was
    /// read, in which case it stays dirty.
    pub fn mark_synced(&self, id: &EntityId, sent_updated_at: DateTime<Utc>) -> Result<bool> {
        let sent = format_timestamp(&sent_updated_at);
        let changed = self.conn.execute(
            &format!(
                "UPDATE {} SET synced_at = ?2 WHERE id = ?1 AND updated_at = ?2",
                E::TABLE
            ),
            params![id.as_str(), sent],
        )?;
        Ok(changed > 0)
    }
}

impl SqliteEntityRepository<'_, Task> {
    /// Ranks of the live tasks in one project column, in display order.
    ///
    /// `project_id = None` selects tasks without a project. Unranked tasks
    /// appear as empty strings.
    pub fn sibling_ranks(
        &self,
        project_id: Option<&EntityId>,
        exclude: Option<&EntityId>,
    ) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(sort_order, '') FROM tasks
             WHERE deleted_at IS NULL AND project_id IS ?1 AND id IS NOT ?2
             ORDER BY COALESCE(sort_order, '') ASC, created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(
            params![project_id.map(EntityId::as_str), exclude.map(EntityId::as_str)],
            |row| row.get::<_, String>(0),
        )?;

        let mut ranks = Vec::new();
        for row in rows {
            ranks.push(row?);
        }
        Ok(ranks)
    }
}

impl<E: StoredEntity> EntityRepository<E> for SqliteEntityRepository<'_, E> {
    fn create(&self, user_id: Option<String>, draft: E::Draft, now: DateTime<Utc>) -> Result<E> {
        let entity = E::from_draft(EntityId::new(), user_id, draft, now);
        self.insert(&entity)?;
        Ok(entity)
    }

    fn get(&self, id: &EntityId) -> Result<Option<E>> {
        let sql = format!(
            "{} WHERE id = ?1 AND deleted_at IS NULL",
            Self::select_clause()
        );
        let entity = self
            .conn
            .query_row(&sql, params![id.as_str()], E::from_row)
            .optional()?;
        Ok(entity)
    }

    fn get_including_deleted(&self, id: &EntityId) -> Result<Option<E>> {
        let sql = format!("{} WHERE id = ?1", Self::select_clause());
        let entity = self
            .conn
            .query_row(&sql, params![id.as_str()], E::from_row)
            .optional()?;
        Ok(entity)
    }

    fn list(&self, query: &ListQuery) -> Result<Vec<E>> {
        let mut sql = format!("{} WHERE deleted_at IS NULL", Self::select_clause());
        let mut values = Vec::new();

        if let Some(parent_id) = &query.parent_id {
            let Some(column) = E::PARENT_COLUMN else {
                return Err(Error::InvalidInput(format!(
                    "{} records have no parent to filter by",
                    E::KIND
                )));
            };
            sql.push_str(&format!(" AND {column} = ?"));
            values.push(Value::Text(parent_id.as_str().to_string()));
        }
        if query.unsynced_only {
            sql.push_str(" AND (synced_at IS NULL OR synced_at < updated_at)");
        }

        let sort_by = query.sort_by.unwrap_or_else(E::default_sort);
        sql.push(' ');
        sql.push_str(&Self::order_clause(sort_by));
        self.query(&sql, values)
    }

    fn update(&self, id: &EntityId, patch: &E::Patch, now: DateTime<Utc>) -> Result<E> {
        let mut entity = self.require_live(id)?;
        entity.apply_patch(patch);
        entity.stamps_mut().touch(now);
        self.save(&entity)?;
        Ok(entity)
    }

    fn upsert(&self, change: &Change, now: DateTime<Utc>) -> Result<UpsertOutcome> {
        let mut change = change.clone();
        change.created_at = change.created_at.map(truncate_millis);
        change.updated_at = change.updated_at.map(truncate_millis);
        change.deleted_at = change.deleted_at.map(truncate_millis);

        let Some(mut entity) = self.get_including_deleted(&change.id)? else {
            let mut entity = E::from_change(&change, now);
            let stamps = entity.stamps_mut();
            stamps.synced_at = Some(stamps.updated_at);
            self.insert(&entity)?;
            return Ok(UpsertOutcome::Inserted);
        };

        let local_updated_at = entity.stamps().updated_at;
        if let Some(incoming_updated_at) = change.updated_at {
            if incoming_updated_at < local_updated_at {
                SqliteConflictRepository::new(self.conn).record(
                    E::KIND,
                    &change.id,
                    local_updated_at,
                    incoming_updated_at,
                    now,
                )?;
                tracing::warn!(
                    "Kept local {} {} ({}) over older remote version ({})",
                    E::KIND,
                    change.id,
                    format_timestamp(&local_updated_at),
                    format_timestamp(&incoming_updated_at)
                );
                return Ok(UpsertOutcome::Stale {
                    local_updated_at,
                    incoming_updated_at,
                });
            }
        }

        entity.apply_change(&change);
        let stamps = entity.stamps_mut();
        // Without an incoming version the local edit stays unacknowledged.
        if let Some(incoming_updated_at) = change.updated_at {
            stamps.updated_at = incoming_updated_at;
            stamps.synced_at = Some(incoming_updated_at);
        }
        stamps.deleted_at = change.deleted_at;
        self.save(&entity)?;
        Ok(UpsertOutcome::Updated)
    }

    fn soft_delete(&self, id: &EntityId, now: DateTime<Utc>) -> Result<E> {
        let mut entity = self.require_live(id)?;
        let stamps = entity.stamps_mut();
        stamps.touch(now);
        stamps.deleted_at = Some(stamps.updated_at);
        self.save(&entity)?;
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{
        Entity, EntityKind, Note, NoteDraft, Project, ProjectDraft, TaskDraft, TaskPatch,
    };
    use crate::util::now_millis;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn task_draft(title: &str, project: Option<&str>, rank: Option<&str>) -> TaskDraft {
        TaskDraft {
            project_id: project.map(|id| id.parse().unwrap()),
            title: Some(title.to_string()),
            sort_order: rank.map(str::to_string),
            ..TaskDraft::default()
        }
    }

    #[test]
    fn test_create_and_get() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());

        let task = repo
            .create(Some("u1".into()), task_draft("Buy milk", None, Some("a0")), now_millis())
            .unwrap();
        let fetched = repo.get(&task.id).unwrap().unwrap();
        assert_eq!(fetched, task);
        assert_eq!(fetched.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_update_bumps_updated_at() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();
        let task = repo.create(None, task_draft("Draft", None, None), now).unwrap();

        let updated = repo
            .update(
                &task.id,
                &TaskPatch {
                    title: Some("Final".into()),
                    ..TaskPatch::default()
                },
                now,
            )
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("Final"));
        assert!(updated.stamps.updated_at > task.stamps.updated_at);
        assert_eq!(updated.stamps.created_at, task.stamps.created_at);
    }

    #[test]
    fn test_update_missing_or_deleted_is_not_found() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();

        let missing = repo
            .update(&EntityId::new(), &TaskPatch::default(), now)
            .unwrap_err();
        assert!(missing.is_not_found());

        let task = repo.create(None, task_draft("x", None, None), now).unwrap();
        repo.soft_delete(&task.id, now).unwrap();
        let deleted = repo.update(&task.id, &TaskPatch::default(), now).unwrap_err();
        assert!(deleted.is_not_found());
        assert!(repo.soft_delete(&task.id, now).unwrap_err().is_not_found());
    }

    #[test]
    fn test_soft_delete_keeps_tombstone() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();
        let task = repo.create(None, task_draft("x", None, None), now).unwrap();

        let tombstone = repo.soft_delete(&task.id, now).unwrap();
        let deleted_at = tombstone.stamps.deleted_at.unwrap();
        assert!(deleted_at >= tombstone.stamps.updated_at);

        assert!(repo.get(&task.id).unwrap().is_none());
        assert!(repo.list(&ListQuery::default()).unwrap().is_empty());
        let kept = repo.get_including_deleted(&task.id).unwrap().unwrap();
        assert!(kept.is_deleted());
    }

    #[test]
    fn test_list_by_rank_is_bytewise_with_missing_first() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();
        for (title, rank) in [("b", Some("a1")), ("upper", Some("Zz")), ("none", None), ("a", Some("a0"))] {
            repo.create(None, task_draft(title, Some("p1"), rank), now).unwrap();
        }
        repo.create(None, task_draft("elsewhere", Some("p2"), Some("a0")), now)
            .unwrap();

        let titles: Vec<_> = repo
            .list(&ListQuery::in_parent("p1".parse::<EntityId>().unwrap()))
            .unwrap()
            .into_iter()
            .map(|task| task.title.unwrap())
            .collect();
        assert_eq!(titles, vec!["none", "upper", "a", "b"]);
    }

    #[test]
    fn test_list_by_viewed_at_puts_never_viewed_last() {
        let db = setup();
        let repo = SqliteEntityRepository::<Project>::new(db.connection());
        let now = now_millis();
        let mut ids = Vec::new();
        for title in ["one", "two", "three"] {
            let draft = ProjectDraft {
                title: Some(title.into()),
                ..ProjectDraft::default()
            };
            ids.push(repo.create(None, draft, now).unwrap().id);
        }
        repo.mark_viewed(&ids[0], now).unwrap();
        repo.mark_viewed(&ids[2], now + Duration::seconds(1)).unwrap();

        let titles: Vec<_> = repo
            .list(&ListQuery::default().sorted_by(SortBy::ViewedAt))
            .unwrap()
            .into_iter()
            .map(|project| project.title.unwrap())
            .collect();
        assert_eq!(titles, vec!["three", "one", "two"]);
    }

    #[test]
    fn test_mark_viewed_does_not_dirty() {
        let db = setup();
        let repo = SqliteEntityRepository::<Note>::new(db.connection());
        let now = now_millis();
        let note = repo.create(None, NoteDraft::default(), now).unwrap();
        repo.mark_synced(&note.id, note.stamps.updated_at).unwrap();

        let viewed = repo.mark_viewed(&note.id, now + Duration::seconds(3)).unwrap();
        assert_eq!(viewed.stamps.updated_at, note.stamps.updated_at);
        assert_eq!(repo.count_dirty().unwrap(), 0);
    }

    #[test]
    fn test_parent_filter_rejected_for_parentless_kind() {
        let db = setup();
        let repo = SqliteEntityRepository::<Project>::new(db.connection());
        let error = repo
            .list(&ListQuery::in_parent(EntityId::new()))
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();

        let mut change = Change::new(EntityKind::Task, "remote-1".parse().unwrap());
        change.title = Some("From server".into());
        change.sort_order = Some("a0".into());
        change.created_at = Some(now);
        change.updated_at = Some(now);

        assert_eq!(repo.upsert(&change, now).unwrap(), UpsertOutcome::Inserted);
        let once = repo.get(&change.id).unwrap().unwrap();
        assert_eq!(repo.upsert(&change, now).unwrap(), UpsertOutcome::Updated);
        let twice = repo.get(&change.id).unwrap().unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.stamps.synced_at, Some(now));
        assert_eq!(repo.count_dirty().unwrap(), 0);
    }

    #[test]
    fn test_upsert_merges_defined_fields() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();
        let task = repo
            .create(None, task_draft("Local", Some("p1"), Some("a0")), now)
            .unwrap();

        let mut change = Change::new(EntityKind::Task, task.id.clone());
        change.description = Some("remote note".into());
        change.updated_at = Some(now + Duration::seconds(1));
        repo.upsert(&change, now).unwrap();

        let merged = repo.get(&task.id).unwrap().unwrap();
        assert_eq!(merged.title.as_deref(), Some("Local"));
        assert_eq!(merged.description.as_deref(), Some("remote note"));
        assert_eq!(merged.stamps.updated_at, now + Duration::seconds(1));
    }

    #[test]
    fn test_upsert_without_version_keeps_local_edit_dirty() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();
        let task = repo.create(None, task_draft("Local", None, None), now).unwrap();
        assert!(repo.mark_synced(&task.id, task.stamps.updated_at).unwrap());

        let edited_at = now + Duration::seconds(1);
        let patch = TaskPatch {
            title: Some("unsent edit".into()),
            ..TaskPatch::default()
        };
        let edited = repo.update(&task.id, &patch, edited_at).unwrap();
        assert_eq!(repo.count_dirty().unwrap(), 1);

        let mut change = Change::new(EntityKind::Task, task.id.clone());
        change.description = Some("remote".into());
        repo.upsert(&change, edited_at + Duration::seconds(1)).unwrap();

        let merged = repo.get(&task.id).unwrap().unwrap();
        assert_eq!(merged.title.as_deref(), Some("unsent edit"));
        assert_eq!(merged.description.as_deref(), Some("remote"));
        assert_eq!(merged.stamps.updated_at, edited.stamps.updated_at);
        assert_ne!(merged.stamps.synced_at, Some(merged.stamps.updated_at));
        assert_eq!(repo.count_dirty().unwrap(), 1);
    }

    #[test]
    fn test_upsert_tombstone_hides_record() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();
        let task = repo.create(None, task_draft("x", None, None), now).unwrap();

        let mut change = task.to_change();
        let later = now + Duration::seconds(2);
        change.updated_at = Some(later);
        change.deleted_at = Some(later);
        repo.upsert(&change, later).unwrap();

        assert!(repo.get(&task.id).unwrap().is_none());
        assert!(repo.list(&ListQuery::default()).unwrap().is_empty());
        assert_eq!(
            repo.get_including_deleted(&task.id)
                .unwrap()
                .unwrap()
                .stamps
                .deleted_at,
            Some(later)
        );
    }

    #[test]
    fn test_upsert_older_change_is_recorded_conflict() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();
        let task = repo.create(None, task_draft("Newer", None, None), now).unwrap();

        let mut change = Change::new(EntityKind::Task, task.id.clone());
        change.title = Some("Older".into());
        change.updated_at = Some(now - Duration::seconds(30));

        let outcome = repo.upsert(&change, now).unwrap();
        assert!(matches!(outcome, UpsertOutcome::Stale { .. }));
        assert_eq!(
            repo.get(&task.id).unwrap().unwrap().title.as_deref(),
            Some("Newer")
        );

        let conflicts = SqliteConflictRepository::new(db.connection())
            .list(10)
            .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].entity_id, task.id);
        assert_eq!(conflicts[0].entity_kind, EntityKind::Task);
    }

    #[test]
    fn test_mark_synced_skips_rows_edited_since_send() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();
        let task = repo.create(None, task_draft("x", None, None), now).unwrap();
        let sent = task.stamps.updated_at;

        repo.update(
            &task.id,
            &TaskPatch {
                title: Some("edited mid-flight".into()),
                ..TaskPatch::default()
            },
            now,
        )
        .unwrap();

        assert!(!repo.mark_synced(&task.id, sent).unwrap());
        assert_eq!(repo.dirty().unwrap().len(), 1);
    }

    #[test]
    fn test_unsynced_only_filter() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();
        let synced = repo.create(None, task_draft("synced", None, None), now).unwrap();
        repo.create(None, task_draft("pending", None, None), now).unwrap();
        repo.mark_synced(&synced.id, synced.stamps.updated_at).unwrap();

        let query = ListQuery {
            unsynced_only: true,
            ..ListQuery::default()
        };
        let pending = repo.list(&query).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title.as_deref(), Some("pending"));
    }

    #[test]
    fn test_sibling_ranks_by_column() {
        let db = setup();
        let repo = SqliteEntityRepository::<Task>::new(db.connection());
        let now = now_millis();
        let moved = repo
            .create(None, task_draft("moved", Some("p1"), Some("a0")), now)
            .unwrap();
        repo.create(None, task_draft("b", Some("p1"), Some("a2")), now).unwrap();
        repo.create(None, task_draft("c", Some("p1"), None), now).unwrap();
        repo.create(None, task_draft("loose", None, Some("a5")), now).unwrap();

        let p1: EntityId = "p1".parse().unwrap();
        assert_eq!(
            repo.sibling_ranks(Some(&p1), Some(&moved.id)).unwrap(),
            vec![String::new(), "a2".to_string()]
        );
        assert_eq!(repo.sibling_ranks(None, None).unwrap(), vec!["a5".to_string()]);
    }
}
