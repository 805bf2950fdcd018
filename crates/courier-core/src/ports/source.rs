//! Source ports - 正本（canonical record）と artifact の再構築
//!
//! When an expected artifact file is gone, the retry driver rebuilds it from
//! the finished-match record through these two collaborators.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::PortError;

/// Looks up the canonical finished-match record for a subject.
#[async_trait]
pub trait SourceRecordLookup: Send + Sync {
    /// `Ok(None)` means the record does not exist.
    async fn lookup(
        &self,
        subject_id: &str,
        partition: Option<&str>,
    ) -> Result<Option<Vec<u8>>, PortError>;
}

/// Deterministically rebuilds an artifact file from a canonical record.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    /// Writes the artifact to `target` and returns the path actually written.
    async fn build(
        &self,
        record: &[u8],
        override_id: Option<&str>,
        target: &Path,
    ) -> Result<PathBuf, PortError>;
}
