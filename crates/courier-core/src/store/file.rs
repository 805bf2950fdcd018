//! File-backed outbox store.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use ulid::Ulid;

use super::document::{self, DocumentError};
use super::{OutboxCounts, OutboxState, OutboxStore};
use crate::domain::{ArtifactRef, DeliveryError, OutboxItem, OutboxKey, StoreError};
use crate::ports::Clock;

/// Outbox persisted as a single JSON document.
///
/// Design:
/// - One mutex per instance; every operation is a full read-modify-write
///   of the document under that lock (single writer).
/// - Writes go to a temp file that is fsynced and renamed over the original.
/// - A document that cannot be read is copied aside as
///   `<file>.corrupt-<timestamp>-<ulid>`, deleted, and replaced by an empty
///   state. If the copy itself fails, the read fails instead.
pub struct FileOutboxStore<R> {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: ArtifactRef> FileOutboxStore<R> {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state (quarantining it if unreadable).
    pub async fn read_state(&self) -> Result<OutboxState<R>, StoreError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Replace the persisted state wholesale.
    pub async fn write_state(&self, state: &OutboxState<R>) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.persist(state).await
    }

    /// One critical section: load, apply `op`, persist if `op` reports a change.
    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut OutboxState<R>, i64) -> (T, bool) + Send,
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        let (result, changed) = op(&mut state, self.clock.now_millis());
        if changed {
            self.persist(&state).await?;
        }
        Ok(result)
    }

    async fn load(&self) -> Result<OutboxState<R>, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(OutboxState::default());
            }
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OutboxState::default());
        }

        match document::decode::<R>(&bytes) {
            Ok(state) => Ok(state),
            Err(err) => {
                self.quarantine(&err).await?;
                Ok(OutboxState::default())
            }
        }
    }

    /// Copy the unreadable document aside, then delete it. If the copy
    /// fails the document is left in place and the read fails, so a later
    /// write can never replace bytes nobody kept.
    async fn quarantine(&self, reason: &DocumentError) -> Result<(), StoreError> {
        let stamp = self.clock.now().format("%Y%m%dT%H%M%S%.3fZ");
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "outbox".to_string());
        // ulid: two corruptions within the same clock tick keep separate copies
        let target = self
            .path
            .with_file_name(format!("{file_name}.corrupt-{stamp}-{}", Ulid::new()));

        // 元のバイト列をそのまま退避してから削除する
        if let Err(err) = fs::copy(&self.path, &target).await {
            warn!(
                path = %self.path.display(),
                error = %err,
                "failed to quarantine unreadable outbox; leaving it in place",
            );
            return Err(StoreError::io(&target, err));
        }
        if let Err(err) = fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %err, "failed to remove quarantined outbox");
        }
        warn!(
            path = %self.path.display(),
            quarantine = %target.display(),
            reason = %reason,
            "outbox document unreadable; quarantined and reset to empty",
        );
        Ok(())
    }

    async fn persist(&self, state: &OutboxState<R>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::io(parent, err))?;
        }

        let payload = document::encode(state)?;
        let temp_path = self.path.with_extension(format!("{}.tmp", Ulid::new()));

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|err| StoreError::io(&temp_path, err))?;
        file.write_all(&payload)
            .await
            .map_err(|err| StoreError::io(&temp_path, err))?;
        file.sync_all()
            .await
            .map_err(|err| StoreError::io(&temp_path, err))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::io(&self.path, err));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: ArtifactRef> OutboxStore<R> for FileOutboxStore<R> {
    async fn get_all(&self) -> Result<Vec<OutboxItem<R>>, StoreError> {
        let state = self.read_state().await?;
        Ok(state.items.into_values().collect())
    }

    async fn get_by_key(&self, key: &OutboxKey) -> Result<Option<OutboxItem<R>>, StoreError> {
        let mut state = self.read_state().await?;
        Ok(state.items.remove(key))
    }

    async fn upsert_pending(&self, key: OutboxKey, artifact: R) -> Result<OutboxItem<R>, StoreError> {
        let item = self
            .mutate(move |state, now| {
                let mut item = OutboxItem::pending(key.clone(), artifact, now);
                if let Some(previous) = state.items.get(&key) {
                    item.updated_at = now.max(previous.updated_at.saturating_add(1));
                }
                state.items.insert(key, item.clone());
                (item, true)
            })
            .await?;
        debug!(key = %item.key, "outbox item queued");
        Ok(item)
    }

    async fn claim(&self, key: &OutboxKey) -> Result<Option<OutboxItem<R>>, StoreError> {
        self.mutate(|state, now| {
            let claimed = state
                .items
                .get_mut(key)
                .and_then(|item| item.claim(now).then(|| item.clone()));
            let changed = claimed.is_some();
            (claimed, changed)
        })
        .await
    }

    async fn mark_sent(&self, key: &OutboxKey) -> Result<bool, StoreError> {
        self.mutate(|state, now| {
            let done = state
                .items
                .get_mut(key)
                .is_some_and(|item| item.complete(now));
            (done, done)
        })
        .await
    }

    async fn mark_failed(&self, key: &OutboxKey, failure: &DeliveryError) -> Result<bool, StoreError> {
        self.mutate(|state, now| {
            let failed = state
                .items
                .get_mut(key)
                .is_some_and(|item| item.fail(failure, now));
            (failed, failed)
        })
        .await
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<usize, StoreError> {
        let reclaimed = self
            .mutate(|state, now| {
                let cutoff = now.saturating_sub(duration_millis(older_than));
                let failure = DeliveryError::transient("claim expired before delivery completed");
                let mut reclaimed = 0;
                for item in state.items.values_mut() {
                    if item.updated_at <= cutoff && item.fail(&failure, now) {
                        reclaimed += 1;
                    }
                }
                (reclaimed, reclaimed > 0)
            })
            .await?;
        if reclaimed > 0 {
            info!(reclaimed, path = %self.path.display(), "reclaimed stale outbox claims");
        }
        Ok(reclaimed)
    }

    async fn prune_sent(&self, older_than: Duration) -> Result<usize, StoreError> {
        let pruned = self
            .mutate(|state, now| {
                let cutoff = now.saturating_sub(duration_millis(older_than));
                let before = state.items.len();
                state
                    .items
                    .retain(|_, item| !(item.status.is_terminal() && item.updated_at <= cutoff));
                let pruned = before - state.items.len();
                (pruned, pruned > 0)
            })
            .await?;
        if pruned > 0 {
            info!(pruned, path = %self.path.display(), "pruned delivered outbox items");
        }
        Ok(pruned)
    }

    async fn counts(&self) -> Result<OutboxCounts, StoreError> {
        let state = self.read_state().await?;
        Ok(OutboxCounts::tally(state.items.values()))
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeliveryStatus, ExportFileRef, FailureKind};
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> (FileOutboxStore<ExportFileRef>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let store = FileOutboxStore::new(dir.path().join("outbox.json"), clock.clone());
        (store, clock)
    }

    fn key(id: &str) -> OutboxKey {
        OutboxKey::new(id)
    }

    #[tokio::test]
    async fn claim_then_send_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);

        store
            .upsert_pending(key("g1"), ExportFileRef::new("e1.json"))
            .await
            .unwrap();
        assert!(store.try_mark_sending(&key("g1")).await.unwrap());
        assert!(!store.try_mark_sending(&key("g1")).await.unwrap());
        assert!(store.mark_sent(&key("g1")).await.unwrap());

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, DeliveryStatus::Sent);
        assert_eq!(all[0].attempts, 0);
    }

    #[tokio::test]
    async fn upsert_resets_only_its_own_key() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);

        for id in ["g1", "g2"] {
            store
                .upsert_pending(key(id), ExportFileRef::new(format!("{id}.json")))
                .await
                .unwrap();
            store.try_mark_sending(&key(id)).await.unwrap();
            store
                .mark_failed(&key(id), &DeliveryError::transient("offline"))
                .await
                .unwrap();
        }
        let before = store.get_by_key(&key("g1")).await.unwrap().unwrap();

        let reset = store
            .upsert_pending(key("g1"), ExportFileRef::new("g1-v2.json"))
            .await
            .unwrap();

        assert_eq!(reset.status, DeliveryStatus::Pending);
        assert_eq!(reset.attempts, 0);
        assert_eq!(reset.last_error, None);
        assert_eq!(reset.artifact.file_name, "g1-v2.json");
        assert!(reset.updated_at > before.updated_at);

        let other = store.get_by_key(&key("g2")).await.unwrap().unwrap();
        assert_eq!(other.status, DeliveryStatus::Failed);
        assert_eq!(other.attempts, 1);
    }

    #[tokio::test]
    async fn claim_fails_for_absent_key() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);
        assert!(!store.try_mark_sending(&key("nope")).await.unwrap());
        assert!(!dir.path().join("outbox.json").exists());
    }

    #[tokio::test]
    async fn claim_returns_the_latest_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);
        store
            .upsert_pending(key("g1"), ExportFileRef::new("v1.json"))
            .await
            .unwrap();
        store
            .upsert_pending(key("g1"), ExportFileRef::new("v2.json"))
            .await
            .unwrap();

        let claimed = store.claim(&key("g1")).await.unwrap().unwrap();
        assert_eq!(claimed.status, DeliveryStatus::Sending);
        assert_eq!(claimed.artifact.file_name, "v2.json");
        assert_eq!(store.claim(&key("g1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sent_stays_sent() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);
        store
            .upsert_pending(key("g1"), ExportFileRef::new("e1.json"))
            .await
            .unwrap();
        store.try_mark_sending(&key("g1")).await.unwrap();
        store.mark_sent(&key("g1")).await.unwrap();

        for _ in 0..3 {
            assert!(!store.try_mark_sending(&key("g1")).await.unwrap());
            assert!(
                !store
                    .mark_failed(&key("g1"), &DeliveryError::transient("x"))
                    .await
                    .unwrap()
            );
        }
        let item = store.get_by_key(&key("g1")).await.unwrap().unwrap();
        assert_eq!(item.status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn attempts_increase_by_one_per_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);
        store
            .upsert_pending(key("g1"), ExportFileRef::new("e1.json"))
            .await
            .unwrap();

        for expected in 1..=4u32 {
            assert!(store.try_mark_sending(&key("g1")).await.unwrap());
            store
                .mark_failed(&key("g1"), &DeliveryError::permanent(format!("try {expected}")))
                .await
                .unwrap();
            let item = store.get_by_key(&key("g1")).await.unwrap().unwrap();
            assert_eq!(item.attempts, expected);
            assert_eq!(item.failure_kind, Some(FailureKind::Permanent));
        }
    }

    #[tokio::test]
    async fn only_one_concurrent_claim_wins() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);
        let store = Arc::new(store);
        store
            .upsert_pending(key("g1"), ExportFileRef::new("e1.json"))
            .await
            .unwrap();

        let mut joins = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            joins.push(tokio::spawn(async move {
                store.try_mark_sending(&OutboxKey::new("g1")).await.unwrap()
            }));
        }
        let mut winners = 0;
        for join in joins {
            if join.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);
        store
            .upsert_pending(
                OutboxKey::with_partition("g1", "2026"),
                ExportFileRef::new("e1.json").with_override("o1"),
            )
            .await
            .unwrap();
        store.try_mark_sending(&OutboxKey::with_partition("g1", "2026")).await.unwrap();
        store
            .mark_failed(
                &OutboxKey::with_partition("g1", "2026"),
                &DeliveryError::transient("503"),
            )
            .await
            .unwrap();
        let state = store.read_state().await.unwrap();

        let other = FileOutboxStore::<ExportFileRef>::new(store.path(), Arc::new(crate::ports::SystemClock));
        other.write_state(&state).await.unwrap();
        assert_eq!(other.read_state().await.unwrap(), state);
    }

    #[tokio::test]
    async fn repeated_corruption_keeps_every_copy() {
        let dir = tempfile::tempdir().unwrap();
        // FixedClock never advances, so both quarantines share a timestamp
        let (store, _) = store(&dir);

        for garbage in [b"{not json".as_slice(), b"[1, 2,".as_slice()] {
            std::fs::write(store.path(), garbage).unwrap();
            assert!(store.read_state().await.unwrap().items.is_empty());
        }

        let mut copies: Vec<Vec<u8>> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.to_string_lossy().contains(".corrupt-"))
            .map(|path| std::fs::read(path).unwrap())
            .collect();
        copies.sort();
        assert_eq!(copies, vec![b"[1, 2,".to_vec(), b"{not json".to_vec()]);
    }

    #[tokio::test]
    async fn corrupt_file_is_quarantined_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);
        let garbage = b"{\"version\":1,\"items\":[{\"subjectId\":".to_vec();
        std::fs::write(store.path(), &garbage).unwrap();

        let state = store.read_state().await.unwrap();
        assert!(state.items.is_empty());
        assert!(!store.path().exists());

        let quarantined: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.to_string_lossy().contains(".corrupt-"))
            .collect();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(std::fs::read(&quarantined[0]).unwrap(), garbage);

        // the store keeps working afterwards
        store
            .upsert_pending(key("g1"), ExportFileRef::new("e1.json"))
            .await
            .unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn legacy_array_file_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(&dir);
        std::fs::write(
            store.path(),
            br#"[{"subjectId":"g1","fileName":"e1.json","status":"FAILED","attempts":2,"lastError":"x","updatedAt":5}]"#,
        )
        .unwrap();

        let item = store.get_by_key(&key("g1")).await.unwrap().unwrap();
        assert_eq!(item.status, DeliveryStatus::Failed);
        assert_eq!(item.attempts, 2);

        // the next write upgrades the file to the versioned form
        store.try_mark_sending(&key("g1")).await.unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["items"][0]["status"], "SENDING");
    }

    #[tokio::test]
    async fn stale_claims_are_failed_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = store(&dir);
        store
            .upsert_pending(key("g1"), ExportFileRef::new("e1.json"))
            .await
            .unwrap();
        store.try_mark_sending(&key("g1")).await.unwrap();

        assert_eq!(store.reclaim_stale(Duration::from_secs(600)).await.unwrap(), 0);
        clock.advance(Duration::from_secs(601));
        assert_eq!(store.reclaim_stale(Duration::from_secs(600)).await.unwrap(), 1);

        let item = store.get_by_key(&key("g1")).await.unwrap().unwrap();
        assert_eq!(item.status, DeliveryStatus::Failed);
        assert_eq!(item.attempts, 1);
        assert!(item.last_error.unwrap().contains("claim expired"));
    }

    #[tokio::test]
    async fn prune_removes_only_old_sent_items() {
        let dir = tempfile::tempdir().unwrap();
        let (store, clock) = store(&dir);
        for id in ["old", "fresh", "failing"] {
            store
                .upsert_pending(key(id), ExportFileRef::new(format!("{id}.json")))
                .await
                .unwrap();
        }
        store.try_mark_sending(&key("old")).await.unwrap();
        store.mark_sent(&key("old")).await.unwrap();
        store.try_mark_sending(&key("failing")).await.unwrap();
        store
            .mark_failed(&key("failing"), &DeliveryError::transient("x"))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(3 * 86_400));
        store.try_mark_sending(&key("fresh")).await.unwrap();
        store.mark_sent(&key("fresh")).await.unwrap();

        let pruned = store.prune_sent(Duration::from_secs(86_400)).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(store.get_by_key(&key("old")).await.unwrap().is_none());
        assert!(store.get_by_key(&key("fresh")).await.unwrap().is_some());
        assert!(store.get_by_key(&key("failing")).await.unwrap().is_some());

        let counts = store.counts().await.unwrap();
        assert_eq!(counts, OutboxCounts { pending: 0, sending: 0, sent: 1, failed: 1 });
    }
}
