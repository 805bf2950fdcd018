//! Outbox item: key + artifact reference + delivery state.

use serde::{Deserialize, Serialize};

use super::{DeliveryError, DeliveryStatus, FailureKind, OutboxKey};

/// One queued deliverable.
///
/// Design:
/// - This is the single source of truth for an item's delivery state.
/// - All state transitions happen here; the store only decides when to call them.
/// - `updated_at` (epoch millis) strictly advances on every mutation, even if
///   the wall clock stalls or goes backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxItem<R> {
    #[serde(flatten)]
    pub key: OutboxKey,

    #[serde(flatten)]
    pub artifact: R,

    pub status: DeliveryStatus,

    /// Number of failed delivery attempts since the last (re)queue.
    #[serde(default)]
    pub attempts: u32,

    #[serde(default)]
    pub last_error: Option<String>,

    /// Classification of the last failure. Absent on items written before
    /// failures were classified.
    #[serde(default)]
    pub failure_kind: Option<FailureKind>,

    #[serde(default)]
    pub updated_at: i64,
}

impl<R> OutboxItem<R> {
    /// A freshly (re)queued item.
    pub fn pending(key: OutboxKey, artifact: R, now_ms: i64) -> Self {
        Self {
            key,
            artifact,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            failure_kind: None,
            updated_at: now_ms,
        }
    }

    /// Claim for delivery. Returns false (and leaves the item untouched)
    /// unless the item is Pending or Failed.
    pub fn claim(&mut self, now_ms: i64) -> bool {
        if !self.status.is_claimable() {
            return false;
        }
        self.status = DeliveryStatus::Sending;
        self.touch(now_ms);
        true
    }

    /// Sending -> Sent.
    pub fn complete(&mut self, now_ms: i64) -> bool {
        if self.status != DeliveryStatus::Sending {
            return false;
        }
        self.status = DeliveryStatus::Sent;
        self.last_error = None;
        self.failure_kind = None;
        self.touch(now_ms);
        true
    }

    /// Sending -> Failed, counting the attempt.
    pub fn fail(&mut self, failure: &DeliveryError, now_ms: i64) -> bool {
        if self.status != DeliveryStatus::Sending {
            return false;
        }
        self.status = DeliveryStatus::Failed;
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(failure.message.clone());
        self.failure_kind = Some(failure.kind);
        self.touch(now_ms);
        true
    }

    /// Did the last attempt fail for a reason retrying cannot fix?
    pub fn failed_permanently(&self) -> bool {
        self.status == DeliveryStatus::Failed && self.failure_kind == Some(FailureKind::Permanent)
    }

    pub(crate) fn touch(&mut self, now_ms: i64) {
        self.updated_at = now_ms.max(self.updated_at.saturating_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExportFileRef;
    use rstest::rstest;

    fn item() -> OutboxItem<ExportFileRef> {
        OutboxItem::pending(OutboxKey::new("g1"), ExportFileRef::new("e1.json"), 1_000)
    }

    #[test]
    fn pending_item_starts_clean() {
        let item = item();
        assert_eq!(item.status, DeliveryStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert_eq!(item.last_error, None);
    }

    #[rstest]
    #[case::pending(DeliveryStatus::Pending, true)]
    #[case::failed(DeliveryStatus::Failed, true)]
    #[case::sending(DeliveryStatus::Sending, false)]
    #[case::sent(DeliveryStatus::Sent, false)]
    fn claim_only_from_claimable_states(#[case] from: DeliveryStatus, #[case] claimed: bool) {
        let mut item = item();
        item.status = from;
        let before = item.updated_at;

        assert_eq!(item.claim(2_000), claimed);
        if claimed {
            assert_eq!(item.status, DeliveryStatus::Sending);
            assert!(item.updated_at > before);
        } else {
            assert_eq!(item.status, from);
            assert_eq!(item.updated_at, before);
        }
    }

    #[test]
    fn fail_counts_attempt_and_records_error() {
        let mut item = item();
        item.claim(2_000);
        assert!(item.fail(&DeliveryError::transient("timeout"), 3_000));

        assert_eq!(item.status, DeliveryStatus::Failed);
        assert_eq!(item.attempts, 1);
        assert_eq!(item.last_error.as_deref(), Some("timeout"));
        assert_eq!(item.failure_kind, Some(FailureKind::Transient));
    }

    #[test]
    fn complete_clears_error() {
        let mut item = item();
        item.claim(2_000);
        item.fail(&DeliveryError::permanent("gone"), 3_000);
        item.claim(4_000);
        assert!(item.complete(5_000));

        assert_eq!(item.status, DeliveryStatus::Sent);
        assert_eq!(item.attempts, 1);
        assert_eq!(item.last_error, None);
        assert_eq!(item.failure_kind, None);
    }

    #[test]
    fn sent_is_absorbing() {
        let mut item = item();
        item.claim(2_000);
        item.complete(3_000);

        assert!(!item.claim(4_000));
        assert!(!item.fail(&DeliveryError::transient("late"), 4_000));
        assert_eq!(item.status, DeliveryStatus::Sent);
    }

    #[test]
    fn updated_at_advances_when_clock_stalls() {
        let mut item = item();
        item.claim(1_000);
        assert_eq!(item.updated_at, 1_001);
        item.fail(&DeliveryError::transient("x"), 500);
        assert_eq!(item.updated_at, 1_002);
    }

    #[test]
    fn serializes_flat_camel_case_document() {
        let mut item = OutboxItem::pending(
            OutboxKey::with_partition("g1", "2026"),
            ExportFileRef::new("e1.json").with_override("ovr-7"),
            42,
        );
        item.last_error = None;
        let json = serde_json::to_value(&item).unwrap();

        assert_eq!(json["subjectId"], "g1");
        assert_eq!(json["partition"], "2026");
        assert_eq!(json["fileName"], "e1.json");
        assert_eq!(json["overrideId"], "ovr-7");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["attempts"], 0);
        assert!(json["lastError"].is_null());
        assert_eq!(json["updatedAt"], 42);
    }
}
