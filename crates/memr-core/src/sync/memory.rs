//! In-process sync authority

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::endpoint::RemoteSyncEndpoint;
use super::protocol::{SyncRequest, SyncResponse};
use super::{SyncError, SyncResult};
use crate::models::{Change, EntityId, EntityKind};
use crate::util::now_millis;

#[derive(Debug, Clone)]
struct StoredChange {
    change: Change,
    /// Server clock when this version was last committed
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ServerState {
    entities: BTreeMap<(EntityKind, EntityId), StoredChange>,
    clock: DateTime<Utc>,
    requests: usize,
    fail_next: usize,
    latency: Duration,
}

impl ServerState {
    /// Next commit time; strictly increasing even within one millisecond.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = now_millis().max(self.clock + chrono::Duration::milliseconds(1));
        self.clock = now;
        now
    }

    fn accept(&mut self, incoming: &Change, committed_at: DateTime<Utc>) {
        let key = (incoming.kind, incoming.id.clone());
        let mut change = incoming.clone();
        if change.updated_at.is_none() {
            change.updated_at = Some(committed_at);
        }

        match self.entities.get_mut(&key) {
            Some(stored) if change.updated_at < stored.change.updated_at => {
                tracing::debug!(
                    "Rejected stale {} {} from client; keeping newer version",
                    incoming.kind,
                    incoming.id
                );
                // Echo the winner back so the sender converges.
                stored.stored_at = committed_at;
            }
            Some(stored) => {
                change.fill_from_older(&stored.change);
                stored.change = change;
                stored.stored_at = committed_at;
            }
            None => {
                self.entities.insert(
                    key,
                    StoredChange {
                        change,
                        stored_at: committed_at,
                    },
                );
            }
        }
    }
}

/// A shared in-memory remote implementing the server side of the protocol.
///
/// Every clone talks to the same state, so several coordinators can sync
/// through one instance.
#[derive(Debug, Clone, Default)]
pub struct InMemorySyncEndpoint {
    state: Arc<Mutex<ServerState>>,
}

impl InMemorySyncEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` requests without touching server state.
    pub async fn fail_next(&self, count: usize) {
        self.state.lock().await.fail_next = count;
    }

    /// Delay every response by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    /// Requests received, failed ones included.
    pub async fn request_count(&self) -> usize {
        self.state.lock().await.requests
    }

    /// The authoritative merged version of one entity.
    pub async fn entity(&self, kind: EntityKind, id: &EntityId) -> Option<Change> {
        self.state
            .lock()
            .await
            .entities
            .get(&(kind, id.clone()))
            .map(|stored| stored.change.clone())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl RemoteSyncEndpoint for InMemorySyncEndpoint {
    async fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        let latency = {
            let mut state = self.state.lock().await;
            state.requests += 1;
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(SyncError::Api("sync endpoint unavailable (503)".to_string()));
            }
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        let committed_at = state.tick();
        for change in &request.changes {
            state.accept(change, committed_at);
        }

        let changes = state
            .entities
            .values()
            .filter(|stored| stored.stored_at > request.last_sync_time)
            .map(|stored| stored.change.clone())
            .collect();

        Ok(SyncResponse {
            changes,
            last_sync_time: committed_at,
        })
    }
}
