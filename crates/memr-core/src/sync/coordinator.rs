//! Periodic sync cycle driver

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use super::endpoint::RemoteSyncEndpoint;
use super::protocol::SyncRequest;
use super::{SyncError, SyncResult};
use crate::config::{SyncSettings, SyncStrategy};
use crate::services::{ApplySummary, DatabaseService, OutgoingBatch};
use crate::util::now_millis;

/// Counts from one completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub sent: usize,
    pub received: usize,
    pub applied: ApplySummary,
    pub watermark: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another cycle was already running on this coordinator
    Skipped,
    Completed(SyncReport),
}

/// Health of the sync loop, for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Changes waiting to be sent (log rows or dirty records)
    pub pending: usize,
    /// Sync interval plus grace period
    pub overdue_after: Duration,
}

impl SyncStatus {
    const fn new(overdue_after: Duration) -> Self {
        Self {
            last_attempt_at: None,
            last_success_at: None,
            last_error: None,
            consecutive_failures: 0,
            pending: 0,
            overdue_after,
        }
    }

    /// Whether the last success is older than the overdue threshold.
    ///
    /// Before the first success, sync is overdue only once a cycle failed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        let Some(last_success) = self.last_success_at else {
            return self.consecutive_failures > 0;
        };
        let threshold = chrono::Duration::from_std(self.overdue_after)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        now.signed_duration_since(last_success) > threshold
    }
}

/// Clears the in-flight flag when a cycle ends, including on early return.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives sync cycles between the local store and one remote endpoint.
pub struct SyncCoordinator<R> {
    service: DatabaseService,
    remote: R,
    strategy: SyncStrategy,
    interval: Duration,
    in_flight: AtomicBool,
    status: Mutex<SyncStatus>,
}

impl<R: RemoteSyncEndpoint> SyncCoordinator<R> {
    /// Fails when the strategy disagrees with the store's change tracking:
    /// a change-log strategy over an untracked store would never send local
    /// edits, and a snapshot strategy over a tracked one never prunes the log.
    pub fn new(service: DatabaseService, remote: R, settings: &SyncSettings) -> SyncResult<Self> {
        if settings.strategy.tracks_changes() != service.change_tracking() {
            return Err(SyncError::InvalidConfiguration(format!(
                "sync strategy '{}' requires change tracking {}, but the local store has it {}",
                settings.strategy,
                on_off(settings.strategy.tracks_changes()),
                on_off(service.change_tracking())
            )));
        }
        Ok(Self {
            service,
            remote,
            strategy: settings.strategy,
            interval: settings.interval,
            in_flight: AtomicBool::new(false),
            status: Mutex::new(SyncStatus::new(settings.overdue_after())),
        })
    }

    pub const fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    pub const fn service(&self) -> &DatabaseService {
        &self.service
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Current status with a freshly counted pending total.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let pending = self.pending_count().await?;
        let mut status = self.status.lock().await;
        status.pending = pending;
        Ok(status.clone())
    }

    async fn pending_count(&self) -> SyncResult<usize> {
        let count = match self.strategy {
            SyncStrategy::ChangeLog => self.service.change_log_len().await?,
            SyncStrategy::Snapshot => self.service.dirty_count().await?,
        };
        Ok(count)
    }

    async fn collect(&self) -> SyncResult<OutgoingBatch> {
        let batch = match self.strategy {
            SyncStrategy::ChangeLog => self.service.collect_change_log().await?,
            SyncStrategy::Snapshot => self.service.collect_snapshot().await?,
        };
        Ok(batch)
    }

    /// Run one full cycle: collect, exchange, apply.
    ///
    /// A failed cycle changes no local state; the same changes are collected
    /// again next time.
    pub async fn sync_once(&self) -> SyncResult<SyncOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync cycle already running; skipping");
            return Ok(SyncOutcome::Skipped);
        }
        let _guard = InFlight(&self.in_flight);

        let started_at = now_millis();
        self.status.lock().await.last_attempt_at = Some(started_at);

        match self.exchange().await {
            Ok(report) => {
                let pending = self.pending_count().await.unwrap_or_default();
                let mut status = self.status.lock().await;
                status.last_success_at = Some(started_at);
                status.last_error = None;
                status.consecutive_failures = 0;
                status.pending = pending;
                drop(status);

                tracing::info!(
                    "Sync completed: sent {}, received {} ({} inserted, {} updated, {} stale)",
                    report.sent,
                    report.received,
                    report.applied.inserted,
                    report.applied.updated,
                    report.applied.stale
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(error) => {
                let mut status = self.status.lock().await;
                status.last_error = Some(error.to_string());
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                Err(error)
            }
        }
    }

    async fn exchange(&self) -> SyncResult<SyncReport> {
        let batch = self.collect().await?;
        let last_sync_time = self.service.last_sync_time().await?;
        tracing::debug!(
            "Collected {} outgoing changes ({} strategy) since {}",
            batch.changes.len(),
            self.strategy,
            last_sync_time
        );

        let request = SyncRequest {
            changes: batch.changes.clone(),
            last_sync_time,
        };
        let response = self.remote.sync(&request).await?;
        tracing::debug!(
            "Received {} remote changes, watermark {}",
            response.changes.len(),
            response.last_sync_time
        );

        let applied = self
            .service
            .apply_remote_batch(&batch, &response.changes, response.last_sync_time)
            .await?;
        if applied.stale > 0 {
            tracing::warn!(
                "Kept {} newer local records over remote versions",
                applied.stale
            );
        }

        Ok(SyncReport {
            sent: batch.changes.len(),
            received: response.changes.len(),
            applied,
            watermark: response.last_sync_time,
        })
    }

    /// Sync once immediately, then on every interval tick until `shutdown`
    /// turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            "Sync loop started (every {} ms, {} strategy)",
            self.interval.as_millis(),
            self.strategy
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }
            // A cycle in flight is abandoned on shutdown; its store writes
            // commit atomically or not at all.
            tokio::select! {
                biased;
                () = shutdown_requested(&mut shutdown) => {
                    tracing::debug!("Sync cycle interrupted by shutdown");
                    break;
                }
                result = self.sync_once() => {
                    if let Err(error) = result {
                        tracing::warn!("Sync cycle failed: {error}");
                    }
                }
            }
        }
        tracing::info!("Sync loop stopped");
    }
}

const fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Resolves once `shutdown` holds true or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{
        Entity, EntityId, EntityKind, ListQuery, Note, NoteDraft, NotePatch, Project, ProjectDraft,
        Task, TaskDraft,
    };
    use crate::sync::InMemorySyncEndpoint;
    use pretty_assertions::assert_eq;

    fn settings(strategy: SyncStrategy) -> SyncSettings {
        SyncSettings {
            interval: Duration::from_millis(20),
            strategy,
            ..SyncSettings::default()
        }
    }

    async fn client(
        server: &InMemorySyncEndpoint,
        strategy: SyncStrategy,
    ) -> SyncCoordinator<InMemorySyncEndpoint> {
        let service = DatabaseService::open_in_memory()
            .await
            .unwrap()
            .with_change_tracking(strategy.tracks_changes());
        SyncCoordinator::new(service, server.clone(), &settings(strategy)).unwrap()
    }

    fn completed(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            SyncOutcome::Skipped => panic!("expected a completed cycle"),
        }
    }

    async fn task_titles(coordinator: &SyncCoordinator<InMemorySyncEndpoint>, project: &EntityId) -> Vec<String> {
        coordinator
            .service()
            .list_project_tasks(project)
            .await
            .unwrap()
            .into_iter()
            .map(|task| task.title.unwrap_or_default())
            .collect()
    }

    fn task(title: &str, project: &EntityId) -> TaskDraft {
        TaskDraft {
            title: Some(title.to_string()),
            project_id: Some(project.clone()),
            ..TaskDraft::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn two_clients_converge_on_moved_task_order() {
        let server = InMemorySyncEndpoint::new();
        let a = client(&server, SyncStrategy::ChangeLog).await;
        let b = client(&server, SyncStrategy::ChangeLog).await;

        let project = a
            .service()
            .create::<Project>(ProjectDraft {
                title: Some("Launch".to_string()),
                ..ProjectDraft::default()
            })
            .await
            .unwrap();
        a.service().create_task(task("T", &project.id)).await.unwrap();
        let u = a.service().create_task(task("U", &project.id)).await.unwrap();

        completed(a.sync_once().await.unwrap());
        let report = completed(b.sync_once().await.unwrap());
        assert_eq!(report.applied.inserted, 3);
        assert_eq!(task_titles(&b, &project.id).await, vec!["T", "U"]);

        b.service().move_task(&u.id, None, 0).await.unwrap();
        completed(b.sync_once().await.unwrap());
        completed(a.sync_once().await.unwrap());

        assert_eq!(task_titles(&a, &project.id).await, vec!["U", "T"]);
        assert_eq!(task_titles(&b, &project.id).await, vec!["U", "T"]);
        assert_eq!(a.service().change_log_len().await.unwrap(), 0);
        assert_eq!(b.service().dirty_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn snapshot_strategy_converges_and_acknowledges() {
        let server = InMemorySyncEndpoint::new();
        let a = client(&server, SyncStrategy::Snapshot).await;
        let b = client(&server, SyncStrategy::Snapshot).await;

        let note = a
            .service()
            .create::<Note>(NoteDraft {
                content: Some("first".to_string()),
                ..NoteDraft::default()
            })
            .await
            .unwrap();
        assert_eq!(a.service().change_log_len().await.unwrap(), 0);

        let report = completed(a.sync_once().await.unwrap());
        assert_eq!(report.sent, 1);
        assert_eq!(report.applied.acknowledged, 1);
        assert_eq!(a.service().dirty_count().await.unwrap(), 0);

        completed(b.sync_once().await.unwrap());
        b.service()
            .update::<Note>(
                &note.id,
                &NotePatch {
                    content: Some("second".to_string()),
                    ..NotePatch::default()
                },
            )
            .await
            .unwrap();
        completed(b.sync_once().await.unwrap());
        completed(a.sync_once().await.unwrap());

        let synced = a.service().get::<Note>(&note.id).await.unwrap().unwrap();
        assert_eq!(synced.content.as_deref(), Some("second"));
        assert!(!synced.stamps.is_dirty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_cycles_are_idempotent() {
        let server = InMemorySyncEndpoint::new();
        let a = client(&server, SyncStrategy::ChangeLog).await;
        a.service()
            .create::<Project>(ProjectDraft::default())
            .await
            .unwrap();

        completed(a.sync_once().await.unwrap());
        let before = a.service().list::<Project>(&ListQuery::default()).await.unwrap();
        let idle = completed(a.sync_once().await.unwrap());
        let after = a.service().list::<Project>(&ListQuery::default()).await.unwrap();

        assert_eq!(idle.sent, 0);
        assert_eq!(idle.received, 0);
        assert_eq!(before, after);
        assert_eq!(server.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_batch_still_pulls_remote_changes() {
        let server = InMemorySyncEndpoint::new();
        let a = client(&server, SyncStrategy::ChangeLog).await;
        let b = client(&server, SyncStrategy::ChangeLog).await;

        a.service()
            .create::<Project>(ProjectDraft::default())
            .await
            .unwrap();
        completed(a.sync_once().await.unwrap());

        let report = completed(b.sync_once().await.unwrap());
        assert_eq!(report.sent, 0);
        assert_eq!(report.received, 1);
        assert_eq!(server.request_count().await, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tombstones_propagate_between_clients() {
        let server = InMemorySyncEndpoint::new();
        let a = client(&server, SyncStrategy::ChangeLog).await;
        let b = client(&server, SyncStrategy::ChangeLog).await;

        let project = a
            .service()
            .create::<Project>(ProjectDraft::default())
            .await
            .unwrap();
        completed(a.sync_once().await.unwrap());
        completed(b.sync_once().await.unwrap());

        a.service().delete::<Project>(&project.id).await.unwrap();
        completed(a.sync_once().await.unwrap());
        completed(b.sync_once().await.unwrap());

        assert!(b.service().get::<Project>(&project.id).await.unwrap().is_none());
        let tombstone = b
            .service()
            .get_including_deleted::<Project>(&project.id)
            .await
            .unwrap()
            .unwrap();
        assert!(tombstone.is_deleted());
        let remote = server.entity(EntityKind::Project, &project.id).await.unwrap();
        assert!(remote.deleted_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_cycle_leaves_local_state_and_retries() {
        let server = InMemorySyncEndpoint::new();
        let a = client(&server, SyncStrategy::ChangeLog).await;
        a.service()
            .create::<Task>(TaskDraft::default())
            .await
            .unwrap();
        let watermark = a.service().last_sync_time().await.unwrap();

        server.fail_next(1).await;
        let error = a.sync_once().await.unwrap_err();
        assert!(matches!(error, SyncError::Api(_)));
        assert_eq!(a.service().change_log_len().await.unwrap(), 1);
        assert_eq!(a.service().last_sync_time().await.unwrap(), watermark);

        let status = a.status().await.unwrap();
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(status.pending, 1);
        assert!(status.last_error.is_some());
        assert!(status.is_overdue(now_millis()));

        let report = completed(a.sync_once().await.unwrap());
        assert_eq!(report.sent, 1);
        let status = a.status().await.unwrap();
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.pending, 0);
        assert_eq!(status.last_error, None);
        assert!(!status.is_overdue(now_millis()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_cycle_is_skipped() {
        let server = InMemorySyncEndpoint::new();
        server.set_latency(Duration::from_millis(200)).await;
        let a = Arc::new(client(&server, SyncStrategy::ChangeLog).await);

        let first = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.sync_once().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(a.sync_once().await.unwrap(), SyncOutcome::Skipped);

        completed(first.await.unwrap().unwrap());
        completed(a.sync_once().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_loop_syncs_until_shutdown() {
        let server = InMemorySyncEndpoint::new();
        server.fail_next(1).await;
        let a = Arc::new(client(&server, SyncStrategy::ChangeLog).await);
        a.service()
            .create::<Project>(ProjectDraft::default())
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(server.request_count().await >= 2);
        assert_eq!(server.len().await, 1);
        let status = a.status().await.unwrap();
        assert!(status.last_success_at.is_some());
        assert_eq!(a.service().change_log_len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_interrupts_slow_cycle() {
        let server = InMemorySyncEndpoint::new();
        server.set_latency(Duration::from_secs(30)).await;
        let a = Arc::new(client(&server, SyncStrategy::ChangeLog).await);
        a.service()
            .create::<Project>(ProjectDraft::default())
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.run(shutdown_rx).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.request_count().await, 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("run loop should stop while a cycle is in flight")
            .unwrap();

        // The abandoned cycle released its guard and left the log intact.
        assert_eq!(a.service().change_log_len().await.unwrap(), 1);
        server.set_latency(Duration::ZERO).await;
        completed(a.sync_once().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn strategy_must_match_change_tracking() {
        let server = InMemorySyncEndpoint::new();
        let untracked = DatabaseService::open_in_memory()
            .await
            .unwrap()
            .with_change_tracking(false);
        let result = SyncCoordinator::new(
            untracked,
            server.clone(),
            &settings(SyncStrategy::ChangeLog),
        );
        assert!(matches!(result, Err(SyncError::InvalidConfiguration(_))));

        let tracked = DatabaseService::open_in_memory()
            .await
            .unwrap()
            .with_change_tracking(true);
        let result = SyncCoordinator::new(tracked, server, &settings(SyncStrategy::Snapshot));
        assert!(matches!(result, Err(SyncError::InvalidConfiguration(_))));
    }

    #[test]
    fn overdue_after_interval_and_grace() {
        let mut status = SyncStatus::new(Duration::from_secs(8));
        let now = now_millis();
        assert!(!status.is_overdue(now));

        status.last_success_at = Some(now - chrono::Duration::seconds(5));
        assert!(!status.is_overdue(now));

        status.last_success_at = Some(now - chrono::Duration::seconds(9));
        assert!(status.is_overdue(now));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn field_edits_from_two_clients_merge() {
        let server = InMemorySyncEndpoint::new();
        let a = client(&server, SyncStrategy::ChangeLog).await;
        let b = client(&server, SyncStrategy::ChangeLog).await;

        let note = a
            .service()
            .create::<Note>(NoteDraft {
                title: Some("Plan".to_string()),
                content: Some("draft".to_string()),
                ..NoteDraft::default()
            })
            .await
            .unwrap();
        completed(a.sync_once().await.unwrap());
        completed(b.sync_once().await.unwrap());

        a.service()
            .update::<Note>(
                &note.id,
                &NotePatch {
                    title: Some("Plan v2".to_string()),
                    ..NotePatch::default()
                },
            )
            .await
            .unwrap();
        completed(a.sync_once().await.unwrap());

        b.service()
            .update::<Note>(
                &note.id,
                &NotePatch {
                    content: Some("final".to_string()),
                    ..NotePatch::default()
                },
            )
            .await
            .unwrap();
        completed(b.sync_once().await.unwrap());
        completed(a.sync_once().await.unwrap());

        let remote = server.entity(EntityKind::Note, note.id()).await.unwrap();
        assert_eq!(remote.title.as_deref(), Some("Plan v2"));
        assert_eq!(remote.content.as_deref(), Some("final"));
        let merged = a.service().get::<Note>(&note.id).await.unwrap().unwrap();
        assert_eq!(merged.title.as_deref(), Some("Plan v2"));
        assert_eq!(merged.content.as_deref(), Some("final"));
    }
}
