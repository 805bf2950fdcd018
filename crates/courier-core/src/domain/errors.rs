//! Errors - 失敗の分類とエラー型
//!
//! Delivery failures are absorbed by the retry driver and recorded on the item.
//! Only store write failures and configuration problems are returned to callers.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::OutboxKey;

/// Classification of a failed delivery attempt.
///
/// - Transient: network errors, timeouts, 5xx, throttling (retry is useful)
/// - Permanent: the attempt cannot succeed as-is (source record missing, 4xx)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Transient,
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => f.write_str("transient"),
            FailureKind::Permanent => f.write_str("permanent"),
        }
    }
}

/// A failed delivery attempt, as recorded by `mark_failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} delivery failure: {message}")]
pub struct DeliveryError {
    pub kind: FailureKind,
    pub message: String,
}

impl DeliveryError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == FailureKind::Permanent
    }
}

/// The artifact for an item could not be produced.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("source record not found for {0}")]
    SourceMissing(OutboxKey),

    #[error("source lookup failed for {key}: {message}")]
    Lookup { key: OutboxKey, message: String },

    #[error("artifact rebuild failed for {key}: {message}")]
    Build { key: OutboxKey, message: String },

    #[error("artifact {} is missing and reconstruction is disabled", .0.display())]
    ReconstructionDisabled(PathBuf),

    #[error("artifact name {0:?} is not a plain file name")]
    InvalidFileName(String),
}

impl ResolveError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ResolveError::SourceMissing(_) | ResolveError::InvalidFileName(_) => {
                FailureKind::Permanent
            }
            ResolveError::Lookup { .. }
            | ResolveError::Build { .. }
            | ResolveError::ReconstructionDisabled(_) => FailureKind::Transient,
        }
    }
}

impl From<ResolveError> for DeliveryError {
    fn from(err: ResolveError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Persisting the outbox failed.
///
/// Reading never produces this for bad content; unreadable documents are
/// quarantined and replaced with an empty state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("outbox io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("outbox encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_source_is_permanent() {
        let err: DeliveryError = ResolveError::SourceMissing(OutboxKey::new("g1")).into();
        assert!(err.is_permanent());
        assert!(err.message.contains("g1"));
    }

    #[test]
    fn builder_failure_is_transient() {
        let err: DeliveryError = ResolveError::Build {
            key: OutboxKey::new("g1"),
            message: "disk full".to_string(),
        }
        .into();
        assert_eq!(err.kind, FailureKind::Transient);
    }
}
