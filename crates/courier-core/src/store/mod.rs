//! Store module: the persisted outbox, its port and its on-disk format.

mod document;
mod file;

pub use document::STORE_VERSION;
pub use file::FileOutboxStore;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ArtifactRef, DeliveryError, DeliveryStatus, OutboxItem, OutboxKey, StoreError};

/// Whole-store snapshot, exactly one item per key.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxState<R> {
    pub version: u32,
    pub items: BTreeMap<OutboxKey, OutboxItem<R>>,
}

impl<R> Default for OutboxState<R> {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            items: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxCounts {
    pub pending: usize,
    pub sending: usize,
    pub sent: usize,
    pub failed: usize,
}

impl OutboxCounts {
    pub(crate) fn tally<'a, R: 'a>(items: impl IntoIterator<Item = &'a OutboxItem<R>>) -> Self {
        let mut counts = OutboxCounts::default();
        for item in items {
            match item.status {
                DeliveryStatus::Pending => counts.pending += 1,
                DeliveryStatus::Sending => counts.sending += 1,
                DeliveryStatus::Sent => counts.sent += 1,
                DeliveryStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// Outbox store port.
///
/// Design intent:
/// - Every call is one critical section: read, mutate, write, release.
///   Callers never hold the store across a network call.
/// - `claim` / `try_mark_sending` is the compare-and-set that keeps two concurrent
///   sweeps from delivering the same item.
/// - Items are never removed implicitly; `prune_sent` is opt-in.
#[async_trait]
pub trait OutboxStore<R: ArtifactRef>: Send + Sync {
    /// All items, ordered by key.
    async fn get_all(&self) -> Result<Vec<OutboxItem<R>>, StoreError>;

    async fn get_by_key(&self, key: &OutboxKey) -> Result<Option<OutboxItem<R>>, StoreError>;

    /// Insert or replace. Always yields Pending with zero attempts and no error.
    async fn upsert_pending(&self, key: OutboxKey, artifact: R) -> Result<OutboxItem<R>, StoreError>;

    /// Claim: Pending|Failed -> Sending, returning the item as claimed.
    /// `None` if Sending, Sent or absent.
    ///
    /// The returned artifact is the one to deliver: a re-queue may have
    /// replaced it since the caller last read the store.
    async fn claim(&self, key: &OutboxKey) -> Result<Option<OutboxItem<R>>, StoreError>;

    /// Claim without the item. False if Sending, Sent or absent.
    async fn try_mark_sending(&self, key: &OutboxKey) -> Result<bool, StoreError> {
        Ok(self.claim(key).await?.is_some())
    }

    /// Sending -> Sent. False if the item was not Sending.
    async fn mark_sent(&self, key: &OutboxKey) -> Result<bool, StoreError>;

    /// Sending -> Failed, attempts + 1. False if the item was not Sending.
    async fn mark_failed(&self, key: &OutboxKey, failure: &DeliveryError) -> Result<bool, StoreError>;

    /// Fail every Sending item last touched longer than `older_than` ago.
    /// Recovers claims left behind by a process that died mid-delivery.
    async fn reclaim_stale(&self, older_than: Duration) -> Result<usize, StoreError>;

    /// Delete Sent items last touched longer than `older_than` ago.
    async fn prune_sent(&self, older_than: Duration) -> Result<usize, StoreError>;

    async fn counts(&self) -> Result<OutboxCounts, StoreError>;
}
