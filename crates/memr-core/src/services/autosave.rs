//! Debounced saving of free-text edits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::DatabaseService;
use crate::db::StoredEntity;
use crate::models::EntityId;

struct PendingPatch<P> {
    generation: u64,
    patch: P,
}

/// Coalesces rapid edits to one entity into a single update.
///
/// Each `schedule` call replaces the entity's pending patch; the patch is
/// written once no newer one has arrived for the whole autosave interval.
pub struct AutosaveDebouncer<E: StoredEntity> {
    service: DatabaseService,
    delay: Duration,
    pending: Arc<Mutex<HashMap<EntityId, PendingPatch<E::Patch>>>>,
    generation: Arc<AtomicU64>,
}

impl<E: StoredEntity> Clone for AutosaveDebouncer<E> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            delay: self.delay,
            pending: Arc::clone(&self.pending),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<E: StoredEntity> AutosaveDebouncer<E> {
    pub fn new(service: DatabaseService, delay: Duration) -> Self {
        Self {
            service,
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue a patch, superseding any patch still waiting for this entity.
    pub async fn schedule(&self, id: EntityId, patch: E::Patch) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        self.pending
            .lock()
            .await
            .insert(id.clone(), PendingPatch { generation, patch });

        let debouncer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(debouncer.delay).await;
            // The lock is held through the save so `flush` never returns
            // while a timed save is still being written.
            let mut pending = debouncer.pending.lock().await;
            let is_latest =
                matches!(pending.get(&id), Some(entry) if entry.generation == generation);
            if let Some(entry) = is_latest.then(|| pending.remove(&id)).flatten() {
                debouncer.save(&id, &entry.patch).await;
            }
        });
    }

    /// Write every waiting patch now; returns how many were written.
    ///
    /// Saves already started by the timer finish before this returns.
    pub async fn flush(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let mut saved = 0;
        for (id, entry) in pending.drain() {
            if self.save(&id, &entry.patch).await {
                saved += 1;
            }
        }
        saved
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn save(&self, id: &EntityId, patch: &E::Patch) -> bool {
        match self.service.update::<E>(id, patch).await {
            Ok(_) => {
                tracing::debug!("Autosaved {} {id}", E::KIND);
                true
            }
            Err(error) => {
                tracing::warn!("Autosave of {} {id} failed: {error}", E::KIND);
                false
            }
        }
    }
}
