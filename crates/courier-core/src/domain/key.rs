use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one deliverable: a subject (a finished match) optionally scoped
/// by a partition such as a season.
///
/// The store keeps exactly one item per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxKey {
    pub subject_id: String,

    #[serde(default)]
    pub partition: Option<String>,
}

impl OutboxKey {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            partition: None,
        }
    }

    pub fn with_partition(subject_id: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            partition: Some(partition.into()),
        }
    }

    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    /// A key read from disk is usable only if it names a subject.
    pub(crate) fn is_valid(&self) -> bool {
        !self.subject_id.trim().is_empty()
    }
}

impl fmt::Display for OutboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition {
            Some(partition) => write!(f, "{partition}/{}", self.subject_id),
            None => f.write_str(&self.subject_id),
        }
    }
}
