//! DriverPolicy - 配送ドライバごとの方針
//!
//! The two drivers share one implementation; their differences live here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{ArtifactRef, OutboxItem};

/// What to do with an item whose last failure was classified permanent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermanentFailurePolicy {
    /// Keep retrying until the attempts cap, like any other failure.
    #[default]
    Retry,
    /// Leave the item Failed and stop sweeping it until it is re-queued.
    GiveUp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverPolicy {
    /// Items with this many failed attempts are no longer swept.
    pub max_attempts: u32,
    pub permanent_failures: PermanentFailurePolicy,
    /// Rebuild a missing artifact from the canonical record.
    pub reconstruct: bool,
    /// Sending claims older than this are treated as abandoned.
    pub claim_timeout: Duration,
    /// Delete Sent items older than this after each sweep. `None` keeps them forever.
    pub retain_sent: Option<Duration>,
}

impl DriverPolicy {
    pub const DOCUMENT_MAX_ATTEMPTS: u32 = 8;
    pub const HTTP_MAX_ATTEMPTS: u32 = 30;
    pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(10 * 60);

    /// Document channel defaults.
    pub fn document() -> Self {
        Self::with_max_attempts(Self::DOCUMENT_MAX_ATTEMPTS)
    }

    /// HTTP ingest defaults.
    pub fn http() -> Self {
        Self::with_max_attempts(Self::HTTP_MAX_ATTEMPTS)
    }

    fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            permanent_failures: PermanentFailurePolicy::Retry,
            reconstruct: true,
            claim_timeout: Self::DEFAULT_CLAIM_TIMEOUT,
            retain_sent: None,
        }
    }

    /// Should a sweep try to deliver this item?
    pub fn is_eligible<R: ArtifactRef>(&self, item: &OutboxItem<R>) -> bool {
        if !item.status.is_claimable() || item.attempts >= self.max_attempts {
            return false;
        }
        !(self.permanent_failures == PermanentFailurePolicy::GiveUp && item.failed_permanently())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeliveryError, DeliveryStatus, ExportFileRef, OutboxKey};
    use rstest::rstest;

    fn item(status: DeliveryStatus, attempts: u32) -> OutboxItem<ExportFileRef> {
        let mut item = OutboxItem::pending(OutboxKey::new("g1"), ExportFileRef::new("e1.json"), 0);
        item.status = status;
        item.attempts = attempts;
        item
    }

    #[rstest]
    #[case::pending(DeliveryStatus::Pending, 0, true)]
    #[case::failed_under_cap(DeliveryStatus::Failed, 7, true)]
    #[case::failed_at_cap(DeliveryStatus::Failed, 8, false)]
    #[case::sending(DeliveryStatus::Sending, 0, false)]
    #[case::sent(DeliveryStatus::Sent, 0, false)]
    fn document_eligibility(
        #[case] status: DeliveryStatus,
        #[case] attempts: u32,
        #[case] eligible: bool,
    ) {
        assert_eq!(DriverPolicy::document().is_eligible(&item(status, attempts)), eligible);
    }

    #[test]
    fn http_cap_is_higher() {
        let failed = item(DeliveryStatus::Failed, 8);
        assert!(DriverPolicy::http().is_eligible(&failed));
        assert!(!DriverPolicy::http().is_eligible(&item(DeliveryStatus::Failed, 30)));
    }

    #[test]
    fn give_up_skips_permanent_failures_only() {
        let mut policy = DriverPolicy::document();
        policy.permanent_failures = PermanentFailurePolicy::GiveUp;

        let mut permanent = item(DeliveryStatus::Sending, 0);
        permanent.fail(&DeliveryError::permanent("source missing"), 1);
        let mut transient = item(DeliveryStatus::Sending, 0);
        transient.fail(&DeliveryError::transient("timeout"), 1);

        assert!(!policy.is_eligible(&permanent));
        assert!(policy.is_eligible(&transient));
        assert!(DriverPolicy::document().is_eligible(&permanent));
    }
}
