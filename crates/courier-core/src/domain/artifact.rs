//! Artifact references stored alongside outbox items.
//!
//! An item never carries the payload itself, only where the artifact is
//! expected on disk and what is needed to rebuild it if the file is gone.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Reference to a deliverable file.
///
/// Implemented once per transport so each store file keeps its own field names.
pub trait ArtifactRef:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// File name the artifact is expected under, relative to the export directory.
    fn file_name(&self) -> &str;

    /// Identifier the artifact was exported under, if it differs from the subject id.
    fn override_id(&self) -> Option<&str>;

    fn is_valid(&self) -> bool {
        !self.file_name().trim().is_empty()
    }
}

/// Exported match document sent over the document channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFileRef {
    pub file_name: String,

    #[serde(default)]
    pub override_id: Option<String>,
}

impl ExportFileRef {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            override_id: None,
        }
    }

    pub fn with_override(mut self, override_id: impl Into<String>) -> Self {
        self.override_id = Some(override_id.into());
        self
    }
}

impl ArtifactRef for ExportFileRef {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn override_id(&self) -> Option<&str> {
        self.override_id.as_deref()
    }
}

/// JSON body posted to the HTTP ingest endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBodyRef {
    pub body_file: String,

    #[serde(default)]
    pub override_id: Option<String>,
}

impl UploadBodyRef {
    pub fn new(body_file: impl Into<String>) -> Self {
        Self {
            body_file: body_file.into(),
            override_id: None,
        }
    }

    pub fn with_override(mut self, override_id: impl Into<String>) -> Self {
        self.override_id = Some(override_id.into());
        self
    }
}

impl ArtifactRef for UploadBodyRef {
    fn file_name(&self) -> &str {
        &self.body_file
    }

    fn override_id(&self) -> Option<&str> {
        self.override_id.as_deref()
    }
}
