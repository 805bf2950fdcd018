//! File-backed canonical records and the JSON artifact builder.
//!
//! Records live at `<root>/<partition>/<subject>.json`, or `<root>/<subject>.json`
//! when the key has no partition.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

use crate::ports::{ArtifactBuilder, PortError, SourceRecordLookup};

pub struct FsSourceRecordLookup {
    root: PathBuf,
}

impl FsSourceRecordLookup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, subject_id: &str, partition: Option<&str>) -> Option<PathBuf> {
        let file = plain_component(subject_id)?;
        let mut path = self.root.clone();
        if let Some(partition) = partition {
            path.push(plain_component(partition)?);
        }
        path.push(format!("{file}.json"));
        Some(path)
    }
}

/// Rejects anything that is not a single, ordinary path component.
fn plain_component(value: &str) -> Option<&str> {
    let value = value.trim();
    let ok = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\']);
    ok.then_some(value)
}

#[async_trait]
impl SourceRecordLookup for FsSourceRecordLookup {
    async fn lookup(
        &self,
        subject_id: &str,
        partition: Option<&str>,
    ) -> Result<Option<Vec<u8>>, PortError> {
        let Some(path) = self.record_path(subject_id, partition) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(format!("read {}: {err}", path.display()).into()),
        }
    }
}

/// Rebuilds an export file from the canonical record.
///
/// The output is the record re-serialized as pretty JSON; when an override id
/// was used at export time it is written to the `exportId` field. Same input,
/// same bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArtifactBuilder;

impl JsonArtifactBuilder {
    pub const OVERRIDE_FIELD: &'static str = "exportId";

    fn render(record: &[u8], override_id: Option<&str>) -> Result<Vec<u8>, PortError> {
        let mut value: Value = serde_json::from_slice(record)?;
        if let Some(id) = override_id {
            let Value::Object(map) = &mut value else {
                return Err("canonical record is not a JSON object".into());
            };
            map.insert(Self::OVERRIDE_FIELD.to_string(), Value::String(id.to_string()));
        }
        Ok(serde_json::to_vec_pretty(&value)?)
    }
}

#[async_trait]
impl ArtifactBuilder for JsonArtifactBuilder {
    async fn build(
        &self,
        record: &[u8],
        override_id: Option<&str>,
        target: &Path,
    ) -> Result<PathBuf, PortError> {
        let bytes = Self::render(record, override_id)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = target.with_extension(format!("{}.tmp", Ulid::new()));
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        if let Err(err) = tokio::fs::rename(&temp, target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(err.into());
        }
        Ok(target.to_path_buf())
    }
}
