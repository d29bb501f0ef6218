//! Shared database service wrapper used across clients.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::{watch, Mutex};

use crate::db::{
    Database, EntityRepository, SettingsRepository, SqliteChangeLog, SqliteConflictRepository,
    SqliteEntityRepository, SqliteSettingsRepository, StoredEntity, UpsertOutcome,
};
use crate::models::{
    merge_log_entries, Change, Collection, Entity, EntityId, EntityKind, ListQuery, Note, Project,
    Setting, SyncConflict, Task, TaskDraft, TaskPatch, CURRENT_USER_ID_KEY,
};
use crate::rank::{rank_between, rank_for_index, ranks_between};
use crate::util::now_millis;
use crate::{Error, Result};

/// Changes collected for one sync request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingBatch {
    pub changes: Vec<Change>,
    /// Change-log rows folded into `changes`; empty for the snapshot strategy
    pub log_seqs: Vec<i64>,
}

impl OutgoingBatch {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Counts from applying one remote response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub inserted: usize,
    pub updated: usize,
    /// Remote versions rejected because the local row was newer
    pub stale: usize,
    /// Sent records now marked as synced
    pub acknowledged: usize,
    pub log_entries_removed: usize,
}

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    change_tracking: bool,
    revision: Arc<watch::Sender<u64>>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path) {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Detected invalid local DB file at {}: {}. Moving it aside and starting fresh.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path)?
            }
            Err(error) => return Err(error),
        };
        tracing::debug!("Opened local database at {}", db_path.display());
        Ok(Self::from_database(db, Some(db_path)))
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::from_database(db, None))
    }

    fn from_database(db: Database, db_path: Option<PathBuf>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            db: Arc::new(Mutex::new(db)),
            db_path,
            change_tracking: false,
            revision: Arc::new(revision),
        }
    }

    /// Record every local mutation in the change log.
    ///
    /// Enable this only when the change-log sync strategy is used; remote
    /// upserts never write the log.
    #[must_use]
    pub const fn with_change_tracking(mut self, enabled: bool) -> Self {
        self.change_tracking = enabled;
        self
    }

    pub const fn change_tracking(&self) -> bool {
        self.change_tracking
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database") || message.contains("database disk image is malformed")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .map_or_else(|| "memr.db".into(), |name| name.to_string_lossy());
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale SQLite sidecar file {}", path.display());
            }
        }

        Ok(())
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    /// Run a local mutation and its change-log entry in one transaction.
    async fn mutate<T>(
        &self,
        write: impl FnOnce(&Connection, DateTime<Utc>) -> Result<(T, Vec<Change>)>,
    ) -> Result<T> {
        let result = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let tx = conn.unchecked_transaction()?;
            let now = now_millis();
            let (value, changes) = write(conn, now)?;
            if self.change_tracking {
                let log = SqliteChangeLog::new(conn);
                for change in &changes {
                    log.append(change, now)?;
                }
            }
            tx.commit()?;
            value
        };
        self.notify();
        Ok(result)
    }

    fn current_user_id(conn: &Connection) -> Result<Option<String>> {
        SqliteSettingsRepository::new(conn).current_user_id()
    }

    /// Create a new live record stamped with the current user.
    pub async fn create<E: StoredEntity>(&self, draft: E::Draft) -> Result<E> {
        self.mutate(|conn, now| {
            let user_id = Self::current_user_id(conn)?;
            let entity = SqliteEntityRepository::<E>::new(conn).create(user_id, draft, now)?;
            let change = entity.to_change();
            Ok((entity, vec![change]))
        })
        .await
    }

    /// Fetch a live record by id.
    pub async fn get<E: StoredEntity>(&self, id: &EntityId) -> Result<Option<E>> {
        let db = self.db.lock().await;
        SqliteEntityRepository::<E>::new(db.connection()).get(id)
    }

    /// Fetch a record by id, tombstones included.
    pub async fn get_including_deleted<E: StoredEntity>(&self, id: &EntityId) -> Result<Option<E>> {
        let db = self.db.lock().await;
        SqliteEntityRepository::<E>::new(db.connection()).get_including_deleted(id)
    }

    /// List live records.
    pub async fn list<E: StoredEntity>(&self, query: &ListQuery) -> Result<Vec<E>> {
        let db = self.db.lock().await;
        SqliteEntityRepository::<E>::new(db.connection()).list(query)
    }

    /// Merge a partial update into a live record.
    pub async fn update<E: StoredEntity>(&self, id: &EntityId, patch: &E::Patch) -> Result<E> {
        self.mutate(|conn, now| {
            let entity = SqliteEntityRepository::<E>::new(conn).update(id, patch, now)?;
            let mut change = Change::new(E::KIND, id.clone());
            E::describe_patch(patch, &mut change);
            change.created_at = Some(entity.stamps().created_at);
            change.updated_at = Some(entity.stamps().updated_at);
            Ok((entity, vec![change]))
        })
        .await
    }

    /// Soft-delete a live record.
    pub async fn delete<E: StoredEntity>(&self, id: &EntityId) -> Result<E> {
        self.mutate(|conn, now| {
            let entity = SqliteEntityRepository::<E>::new(conn).soft_delete(id, now)?;
            let mut change = Change::new(E::KIND, id.clone());
            change.created_at = Some(entity.stamps().created_at);
            change.updated_at = Some(entity.stamps().updated_at);
            change.deleted_at = entity.stamps().deleted_at;
            Ok((entity, vec![change]))
        })
        .await
    }

    /// Record that a record was opened; local only, not synced.
    pub async fn mark_viewed<E: StoredEntity>(&self, id: &EntityId) -> Result<E> {
        self.mutate(|conn, now| {
            let entity = SqliteEntityRepository::<E>::new(conn).mark_viewed(id, now)?;
            Ok((entity, Vec::new()))
        })
        .await
    }

    /// Create a task, appending it to the end of its project column when no
    /// rank is given.
    pub async fn create_task(&self, mut draft: TaskDraft) -> Result<Task> {
        self.mutate(|conn, now| {
            let repo = SqliteEntityRepository::<Task>::new(conn);
            if draft.sort_order.is_none() {
                let siblings = repo.sibling_ranks(draft.project_id.as_ref(), None)?;
                let last = siblings.iter().rev().find(|rank| !rank.is_empty());
                draft.sort_order = Some(rank_between(last.map(String::as_str), None));
            }
            let user_id = Self::current_user_id(conn)?;
            let task = repo.create(user_id, draft, now)?;
            let change = task.to_change();
            Ok((task, vec![change]))
        })
        .await
    }

    /// Create several tasks in one transaction, keeping their given order.
    ///
    /// Drafts without a rank are appended after the last ranked task of their
    /// project column, in draft order.
    pub async fn create_tasks(&self, mut drafts: Vec<TaskDraft>) -> Result<Vec<Task>> {
        self.mutate(|conn, now| {
            let repo = SqliteEntityRepository::<Task>::new(conn);
            let mut columns: Vec<Option<EntityId>> = Vec::new();
            for draft in &drafts {
                if draft.sort_order.is_none() && !columns.contains(&draft.project_id) {
                    columns.push(draft.project_id.clone());
                }
            }
            for project_id in columns {
                let siblings = repo.sibling_ranks(project_id.as_ref(), None)?;
                let last = siblings.iter().rev().find(|rank| !rank.is_empty());
                let unranked: Vec<&mut TaskDraft> = drafts
                    .iter_mut()
                    .filter(|draft| draft.sort_order.is_none() && draft.project_id == project_id)
                    .collect();
                let ranks = ranks_between(last.map(String::as_str), None, unranked.len());
                for (draft, rank) in unranked.into_iter().zip(ranks) {
                    draft.sort_order = Some(rank);
                }
            }

            let user_id = Self::current_user_id(conn)?;
            let mut tasks = Vec::with_capacity(drafts.len());
            let mut changes = Vec::with_capacity(drafts.len());
            for draft in drafts {
                let task = repo.create(user_id.clone(), draft, now)?;
                changes.push(task.to_change());
                tasks.push(task);
            }
            tracing::debug!("Created {} tasks", tasks.len());
            Ok((tasks, changes))
        })
        .await
    }

    /// Move a task to `index` within a project column.
    ///
    /// `to_project` of `None` keeps the current project; `Some(None)` moves
    /// the task out of any project. Only the moved task gets a new rank.
    pub async fn move_task(
        &self,
        id: &EntityId,
        to_project: Option<Option<EntityId>>,
        index: usize,
    ) -> Result<Task> {
        self.mutate(|conn, now| {
            let repo = SqliteEntityRepository::<Task>::new(conn);
            let task = repo
                .get(id)?
                .ok_or_else(|| Error::not_found(EntityKind::Task, id.as_str()))?;
            let project_id = to_project.unwrap_or_else(|| task.project_id.clone());

            let siblings = repo.sibling_ranks(project_id.as_ref(), Some(id))?;
            let siblings: Vec<&str> = siblings.iter().map(String::as_str).collect();
            let rank = rank_for_index(&siblings, index);
            tracing::debug!("Moving task {id} to index {index} with rank {rank}");

            let patch = TaskPatch {
                project_id: (project_id != task.project_id).then_some(project_id),
                sort_order: Some(rank),
                ..TaskPatch::default()
            };
            let moved = repo.update(id, &patch, now)?;
            let mut change = Change::new(EntityKind::Task, id.clone());
            Task::describe_patch(&patch, &mut change);
            change.created_at = Some(moved.stamps.created_at);
            change.updated_at = Some(moved.stamps.updated_at);
            Ok((moved, vec![change]))
        })
        .await
    }

    /// List tasks in rank order within one project.
    pub async fn list_project_tasks(&self, project_id: &EntityId) -> Result<Vec<Task>> {
        self.list::<Task>(&ListQuery::in_parent(project_id)).await
    }

    /// Subscribe to a query; results are re-issued after every write.
    pub fn subscribe<E: StoredEntity>(&self, query: ListQuery) -> LiveQuery<E> {
        LiveQuery {
            db: Arc::downgrade(&self.db),
            revision: self.revision.subscribe(),
            query,
            primed: false,
            entity: PhantomData,
        }
    }

    /// Collect every unacknowledged record, tombstones included.
    pub async fn collect_snapshot(&self) -> Result<OutgoingBatch> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let mut changes = Vec::new();
        changes.extend(dirty_changes::<Task>(conn)?);
        changes.extend(dirty_changes::<Project>(conn)?);
        changes.extend(dirty_changes::<Note>(conn)?);
        changes.extend(dirty_changes::<Collection>(conn)?);
        Ok(OutgoingBatch {
            changes,
            log_seqs: Vec::new(),
        })
    }

    /// Merge the pending change log into one change per entity.
    pub async fn collect_change_log(&self) -> Result<OutgoingBatch> {
        let db = self.db.lock().await;
        let entries = SqliteChangeLog::new(db.connection()).pending()?;
        let merged = merge_log_entries(&entries);
        Ok(OutgoingBatch {
            changes: merged.changes,
            log_seqs: merged.seqs,
        })
    }

    /// Apply an acknowledged exchange in one transaction.
    ///
    /// Marks the sent versions as synced, prunes the flushed log rows, upserts
    /// every remote change and stores the new watermark. Nothing is written if
    /// any step fails.
    pub async fn apply_remote_batch(
        &self,
        sent: &OutgoingBatch,
        incoming: &[Change],
        watermark: DateTime<Utc>,
    ) -> Result<ApplySummary> {
        let summary = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let tx = conn.unchecked_transaction()?;
            let now = now_millis();
            let mut summary = ApplySummary::default();

            for change in &sent.changes {
                let Some(updated_at) = change.updated_at else {
                    continue;
                };
                if mark_synced(conn, change.kind, &change.id, updated_at)? {
                    summary.acknowledged += 1;
                }
            }
            summary.log_entries_removed = SqliteChangeLog::new(conn).remove(&sent.log_seqs)?;

            for change in incoming {
                match upsert(conn, change, now)? {
                    UpsertOutcome::Inserted => summary.inserted += 1,
                    UpsertOutcome::Updated => summary.updated += 1,
                    UpsertOutcome::Stale { .. } => summary.stale += 1,
                }
            }

            let settings = SqliteSettingsRepository::new(conn);
            settings.set_last_sync_time(watermark, now)?;
            settings.set_last_sync_success(now)?;
            tx.commit()?;
            summary
        };
        self.notify();
        Ok(summary)
    }

    /// Records still waiting for acknowledgement across all tables.
    pub async fn dirty_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let conn = db.connection();
        Ok(SqliteEntityRepository::<Task>::new(conn).count_dirty()?
            + SqliteEntityRepository::<Project>::new(conn).count_dirty()?
            + SqliteEntityRepository::<Note>::new(conn).count_dirty()?
            + SqliteEntityRepository::<Collection>::new(conn).count_dirty()?)
    }

    pub async fn change_log_len(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteChangeLog::new(db.connection()).count()
    }

    /// The sync watermark; the epoch before the first successful sync.
    pub async fn last_sync_time(&self) -> Result<DateTime<Utc>> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).last_sync_time()
    }

    /// Local time of the last applied sync; `None` before the first one.
    pub async fn last_sync_success(&self) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).last_sync_success()
    }

    pub async fn current_user(&self) -> Result<Option<String>> {
        let db = self.db.lock().await;
        Self::current_user_id(db.connection())
    }

    pub async fn set_current_user(&self, user_id: &str) -> Result<()> {
        self.set_setting(CURRENT_USER_ID_KEY, serde_json::Value::String(user_id.to_string()))
            .await
    }

    pub async fn get_setting(&self, name: &str) -> Result<Option<Setting>> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).get(name)
    }

    pub async fn set_setting(&self, name: &str, value: serde_json::Value) -> Result<()> {
        {
            let db = self.db.lock().await;
            SqliteSettingsRepository::new(db.connection()).set(name, value, now_millis())?;
        }
        self.notify();
        Ok(())
    }

    /// List recently resolved sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        SqliteConflictRepository::new(db.connection()).list(limit)
    }
}

fn dirty_changes<E: StoredEntity>(conn: &Connection) -> Result<Vec<Change>> {
    Ok(SqliteEntityRepository::<E>::new(conn)
        .dirty()?
        .iter()
        .map(Entity::to_change)
        .collect())
}

fn mark_synced(
    conn: &Connection,
    kind: EntityKind,
    id: &EntityId,
    updated_at: DateTime<Utc>,
) -> Result<bool> {
    match kind {
        EntityKind::Task => SqliteEntityRepository::<Task>::new(conn).mark_synced(id, updated_at),
        EntityKind::Project => {
            SqliteEntityRepository::<Project>::new(conn).mark_synced(id, updated_at)
        }
        EntityKind::Note => SqliteEntityRepository::<Note>::new(conn).mark_synced(id, updated_at),
        EntityKind::Collection => {
            SqliteEntityRepository::<Collection>::new(conn).mark_synced(id, updated_at)
        }
    }
}

fn upsert(conn: &Connection, change: &Change, now: DateTime<Utc>) -> Result<UpsertOutcome> {
    match change.kind {
        EntityKind::Task => SqliteEntityRepository::<Task>::new(conn).upsert(change, now),
        EntityKind::Project => SqliteEntityRepository::<Project>::new(conn).upsert(change, now),
        EntityKind::Note => SqliteEntityRepository::<Note>::new(conn).upsert(change, now),
        EntityKind::Collection => {
            SqliteEntityRepository::<Collection>::new(conn).upsert(change, now)
        }
    }
}

/// A query re-run after every committed write.
///
/// The first `next()` yields immediately; later calls wait for the next
/// write. Returns `None` once every handle to the service is dropped.
pub struct LiveQuery<E> {
    db: Weak<Mutex<Database>>,
    revision: watch::Receiver<u64>,
    query: ListQuery,
    primed: bool,
    entity: PhantomData<E>,
}

impl<E: StoredEntity> LiveQuery<E> {
    pub async fn next(&mut self) -> Option<Result<Vec<E>>> {
        if self.primed {
            self.revision.changed().await.ok()?;
        } else {
            self.primed = true;
        }
        self.revision.borrow_and_update();

        let db = self.db.upgrade()?;
        let db = db.lock().await;
        Some(SqliteEntityRepository::<E>::new(db.connection()).list(&self.query))
    }

    pub const fn query(&self) -> &ListQuery {
        &self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoteDraft, NotePatch, ProjectDraft, LAST_SYNC_TIME_KEY};
    use crate::util::epoch;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn draft(title: &str, project: Option<&EntityId>) -> TaskDraft {
        TaskDraft {
            title: Some(title.to_string()),
            project_id: project.cloned(),
            ..TaskDraft::default()
        }
    }

    async fn titles(service: &DatabaseService, project: &EntityId) -> Vec<String> {
        service
            .list_project_tasks(project)
            .await
            .unwrap()
            .into_iter()
            .map(|task| task.title.unwrap_or_default())
            .collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_create_and_list_roundtrip() {
        let service = DatabaseService::open_in_memory().await.unwrap();

        service
            .create::<Note>(NoteDraft {
                content: Some("hello core".into()),
                ..NoteDraft::default()
            })
            .await
            .unwrap();
        let notes = service.list::<Note>(&ListQuery::default()).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content.as_deref(), Some("hello core"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_tasks_appends_unranked_in_order() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let project = service
            .create::<Project>(ProjectDraft::default())
            .await
            .unwrap();
        let existing = service
            .create_task(draft("existing", Some(&project.id)))
            .await
            .unwrap();
        let log_before = service.change_log_len().await.unwrap();

        let first_rank = rank_between(None, existing.sort_order.as_deref());
        let pinned = TaskDraft {
            sort_order: Some(first_rank.clone()),
            ..draft("pinned", Some(&project.id))
        };
        let created = service
            .create_tasks(vec![
                draft("one", Some(&project.id)),
                pinned,
                draft("two", Some(&project.id)),
                draft("loose", None),
                draft("three", Some(&project.id)),
            ])
            .await
            .unwrap();

        assert_eq!(created.len(), 5);
        assert_eq!(created[1].sort_order.as_deref(), Some(first_rank.as_str()));
        assert!(created[0].sort_order < created[2].sort_order);
        assert!(created[2].sort_order < created[4].sort_order);
        assert!(created[3].sort_order.is_some());
        assert_eq!(
            titles(&service, &project.id).await,
            vec!["pinned", "existing", "one", "two", "three"]
        );
        assert_eq!(service.change_log_len().await.unwrap(), log_before + 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_stamps_current_user() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        service.set_current_user("user-7").await.unwrap();

        let project = service
            .create::<Project>(ProjectDraft::default())
            .await
            .unwrap();
        assert_eq!(project.user_id.as_deref(), Some("user-7"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tasks_append_to_their_column() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let project = EntityId::new();

        let first = service.create_task(draft("first", Some(&project))).await.unwrap();
        let second = service.create_task(draft("second", Some(&project))).await.unwrap();
        let other = service.create_task(draft("other", None)).await.unwrap();

        assert_eq!(first.sort_order.as_deref(), Some("a0"));
        assert!(second.sort_order > first.sort_order);
        assert_eq!(other.sort_order.as_deref(), Some("a0"));
        assert_eq!(titles(&service, &project).await, vec!["first", "second"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn move_task_only_reranks_the_moved_task() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let project = EntityId::new();
        let a = service.create_task(draft("a", Some(&project))).await.unwrap();
        let b = service.create_task(draft("b", Some(&project))).await.unwrap();
        let c = service.create_task(draft("c", Some(&project))).await.unwrap();

        let moved = service.move_task(&c.id, None, 0).await.unwrap();
        assert!(moved.sort_order.as_deref().unwrap() < a.sort_order.as_deref().unwrap());
        assert_eq!(titles(&service, &project).await, vec!["c", "a", "b"]);

        service.move_task(&c.id, None, 1).await.unwrap();
        assert_eq!(titles(&service, &project).await, vec!["a", "c", "b"]);

        let untouched = service.get::<Task>(&b.id).await.unwrap().unwrap();
        assert_eq!(untouched.sort_order, b.sort_order);
        assert_eq!(untouched.stamps.updated_at, b.stamps.updated_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn move_task_across_projects() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let todo = EntityId::new();
        let done = EntityId::new();
        let a = service.create_task(draft("a", Some(&todo))).await.unwrap();
        service.create_task(draft("x", Some(&done))).await.unwrap();

        let moved = service
            .move_task(&a.id, Some(Some(done.clone())), 99)
            .await
            .unwrap();
        assert_eq!(moved.project_id.as_ref(), Some(&done));
        assert_eq!(titles(&service, &done).await, vec!["x", "a"]);
        assert!(titles(&service, &todo).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn move_missing_task_is_not_found() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let error = service.move_task(&EntityId::new(), None, 0).await.unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn change_tracking_logs_mutations() {
        let service = DatabaseService::open_in_memory()
            .await
            .unwrap()
            .with_change_tracking(true);

        let note = service.create::<Note>(NoteDraft::default()).await.unwrap();
        service
            .update::<Note>(
                &note.id,
                &NotePatch {
                    title: Some("Later".into()),
                    ..NotePatch::default()
                },
            )
            .await
            .unwrap();
        service.mark_viewed::<Note>(&note.id).await.unwrap();
        service.delete::<Note>(&note.id).await.unwrap();
        assert_eq!(service.change_log_len().await.unwrap(), 3);

        let batch = service.collect_change_log().await.unwrap();
        assert_eq!(batch.changes.len(), 1);
        assert_eq!(batch.log_seqs.len(), 3);
        let merged = &batch.changes[0];
        assert_eq!(merged.title.as_deref(), Some("Later"));
        assert!(merged.deleted_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn without_tracking_the_log_stays_empty() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        service.create_task(draft("x", None)).await.unwrap();
        assert_eq!(service.change_log_len().await.unwrap(), 0);
        assert_eq!(service.dirty_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn apply_remote_batch_acknowledges_and_advances_watermark() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let task = service.create_task(draft("local", None)).await.unwrap();
        assert_eq!(service.last_sync_time().await.unwrap(), epoch());
        assert_eq!(service.last_sync_success().await.unwrap(), None);

        let sent = service.collect_snapshot().await.unwrap();
        assert_eq!(sent.changes.len(), 1);

        let mut remote = Change::new(EntityKind::Project, "remote-p".parse().unwrap());
        remote.title = Some("From elsewhere".into());
        remote.updated_at = Some(task.stamps.updated_at);

        // The watermark comes from the server clock, which may lag ours.
        let watermark = now_millis() - chrono::Duration::hours(1);
        let before = now_millis();
        let summary = service
            .apply_remote_batch(&sent, &[remote], watermark)
            .await
            .unwrap();
        assert_eq!(summary.acknowledged, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(service.dirty_count().await.unwrap(), 0);
        assert_eq!(service.last_sync_time().await.unwrap(), watermark);
        assert!(service.get_setting(LAST_SYNC_TIME_KEY).await.unwrap().is_some());
        let succeeded_at = service.last_sync_success().await.unwrap().unwrap();
        assert!(succeeded_at >= before);
        assert!(succeeded_at > watermark);
        assert!(service.collect_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_apply_rolls_back() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let task = service.create_task(draft("local", None)).await.unwrap();
        let sent = service.collect_snapshot().await.unwrap();

        let mut note = Change::new(EntityKind::Note, "n1".parse().unwrap());
        note.updated_at = Some(task.stamps.updated_at);
        let mut collection = Change::new(EntityKind::Collection, "c1".parse().unwrap());
        collection.updated_at = Some(task.stamps.updated_at);
        {
            let db = service.db.lock().await;
            db.connection().execute_batch("DROP TABLE collections").unwrap();
        }

        let result = service
            .apply_remote_batch(&sent, &[note, collection], now_millis())
            .await;
        assert!(result.is_err());

        let unsynced = ListQuery {
            unsynced_only: true,
            ..ListQuery::default()
        };
        assert_eq!(service.list::<Task>(&unsynced).await.unwrap().len(), 1);
        assert!(service
            .get::<Note>(&"n1".parse().unwrap())
            .await
            .unwrap()
            .is_none());
        assert_eq!(service.last_sync_time().await.unwrap(), epoch());
        assert_eq!(service.last_sync_success().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn live_query_reissues_after_writes() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let mut live = service.subscribe::<Task>(ListQuery::default());

        assert!(live.next().await.unwrap().unwrap().is_empty());

        service.create_task(draft("new", None)).await.unwrap();
        let results = tokio::time::timeout(Duration::from_secs(2), live.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(results.len(), 1);

        drop(service);
        assert!(live.next().await.is_none());
    }

    #[test]
    fn detects_corrupted_db_errors() {
        assert!(DatabaseService::is_corrupted_db_error(&Error::Database(
            "SQLite failure: file is not a database".to_string()
        )));
        assert!(!DatabaseService::is_corrupted_db_error(&Error::InvalidInput(
            "title cannot be empty".to_string()
        )));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_path_recovers_from_garbage_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("memr.db");
        std::fs::write(&db_path, vec![b'x'; 4096]).unwrap();
        std::fs::write(tmp.path().join("memr.db-wal"), b"wal").unwrap();

        let service = DatabaseService::open_path(&db_path).await.unwrap();
        service.create_task(draft("fresh", None)).await.unwrap();

        let mut found_backup = false;
        for entry in std::fs::read_dir(tmp.path()).unwrap() {
            let entry = entry.unwrap();
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with("memr.db.corrupt-")
            {
                found_backup = true;
            }
        }
        assert!(found_backup);
    }
}
