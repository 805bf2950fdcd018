//! Enqueuer - 生産者側の入口
//!
//! Called by the match-finalization flow whenever a new deliverable exists.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::scheduler::{JobId, SweepScheduler};
use crate::domain::{ArtifactRef, OutboxItem, OutboxKey, StoreError};
use crate::store::OutboxStore;

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("outbox key has a blank subject id")]
    InvalidKey,

    #[error("artifact reference has no file name")]
    InvalidArtifact,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Queues (or re-queues) an item and asks for a sweep.
pub struct Enqueuer<R: ArtifactRef> {
    store: Arc<dyn OutboxStore<R>>,
    scheduler: Option<Arc<SweepScheduler>>,
    job_id: JobId,
}

impl<R: ArtifactRef> Enqueuer<R> {
    pub fn new(store: Arc<dyn OutboxStore<R>>, job_id: JobId) -> Self {
        Self {
            store,
            scheduler: None,
            job_id,
        }
    }

    /// Trigger a sweep after each enqueue.
    pub fn with_scheduler(mut self, scheduler: Arc<SweepScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Last write wins: any existing item for `key` is reset to Pending.
    pub async fn enqueue(&self, key: OutboxKey, artifact: R) -> Result<OutboxItem<R>, EnqueueError> {
        if !key.is_valid() {
            return Err(EnqueueError::InvalidKey);
        }
        if !artifact.is_valid() {
            return Err(EnqueueError::InvalidArtifact);
        }

        let item = self.store.upsert_pending(key, artifact).await?;
        info!(key = %item.key, file = item.artifact.file_name(), "queued for delivery");

        if let Some(scheduler) = &self.scheduler
            && let Err(err) = scheduler.schedule(&self.job_id)
        {
            // 次の定期 sweep で拾われる
            warn!(job = %self.job_id, error = %err, "could not schedule sweep after enqueue");
        }
        Ok(item)
    }
}
