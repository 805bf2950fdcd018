//! ArtifactResolver - 送信する artifact の解決と再構築

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{ArtifactRef, OutboxKey, ResolveError};
use crate::ports::{ArtifactBuilder, SourceRecordLookup};

/// Finds the file to deliver for an item, rebuilding it when it has gone missing.
///
/// Order:
/// 1. `<export_dir>/<file name>` if it exists
/// 2. otherwise look up the canonical record and rebuild the file in place
pub struct ArtifactResolver {
    export_dir: PathBuf,
    lookup: Arc<dyn SourceRecordLookup>,
    builder: Arc<dyn ArtifactBuilder>,
}

impl ArtifactResolver {
    pub fn new(
        export_dir: impl Into<PathBuf>,
        lookup: Arc<dyn SourceRecordLookup>,
        builder: Arc<dyn ArtifactBuilder>,
    ) -> Self {
        Self {
            export_dir: export_dir.into(),
            lookup,
            builder,
        }
    }

    /// Where the artifact is expected. Only the final path component of the
    /// stored name is used, so a stored name can never escape the export dir.
    pub fn expected_path<R: ArtifactRef>(&self, artifact: &R) -> Result<PathBuf, ResolveError> {
        let name = artifact.file_name();
        Path::new(name.trim())
            .file_name()
            .map(|file| self.export_dir.join(file))
            .ok_or_else(|| ResolveError::InvalidFileName(name.to_string()))
    }

    pub async fn resolve<R: ArtifactRef>(
        &self,
        key: &OutboxKey,
        artifact: &R,
        reconstruct: bool,
    ) -> Result<PathBuf, ResolveError> {
        let expected = self.expected_path(artifact)?;
        if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            return Ok(expected);
        }
        if !reconstruct {
            return Err(ResolveError::ReconstructionDisabled(expected));
        }

        debug!(key = %key, path = %expected.display(), "artifact missing; rebuilding from source record");
        let record = self
            .lookup
            .lookup(&key.subject_id, key.partition())
            .await
            .map_err(|err| ResolveError::Lookup {
                key: key.clone(),
                message: err.to_string(),
            })?
            .ok_or_else(|| ResolveError::SourceMissing(key.clone()))?;

        let built = self
            .builder
            .build(&record, artifact.override_id(), &expected)
            .await
            .map_err(|err| ResolveError::Build {
                key: key.clone(),
                message: err.to_string(),
            })?;
        info!(key = %key, path = %built.display(), "artifact rebuilt");
        Ok(built)
    }
}
