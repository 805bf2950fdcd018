//! Delivery state machine for outbox items.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery status of one outbox item.
///
/// State transitions:
/// - Pending -> Sending -> Sent (terminal)
/// - Pending -> Sending -> Failed -> Sending -> ... (retry loop)
///
/// Nothing ever leaves `Sent`. `upsert_pending` is the only way back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Queued, never attempted since the last (re)queue.
    Pending,

    /// Claimed by a sweep; delivery in flight.
    Sending,

    /// Delivered.
    Sent,

    /// Last attempt failed; eligible for another claim.
    Failed,
}

impl DeliveryStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Sent)
    }

    /// Can a sweep claim an item in this state?
    pub fn is_claimable(self) -> bool {
        matches!(self, DeliveryStatus::Pending | DeliveryStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Sending => "SENDING",
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::pending(DeliveryStatus::Pending, true)]
    #[case::failed(DeliveryStatus::Failed, true)]
    #[case::sending(DeliveryStatus::Sending, false)]
    #[case::sent(DeliveryStatus::Sent, false)]
    fn claimable_states(#[case] status: DeliveryStatus, #[case] expected: bool) {
        assert_eq!(status.is_claimable(), expected);
    }

    #[test]
    fn only_sent_is_terminal() {
        assert!(DeliveryStatus::Sent.is_terminal());
        assert!(!DeliveryStatus::Failed.is_terminal());
    }

    #[test]
    fn serializes_in_upper_case() {
        let json = serde_json::to_string(&DeliveryStatus::Sending).unwrap();
        assert_eq!(json, "\"SENDING\"");
        let back: DeliveryStatus = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(back, DeliveryStatus::Failed);
    }
}
