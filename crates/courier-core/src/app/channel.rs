//! DeliveryChannel - 送信先ごとの差分
//!
//! A channel knows whether it is configured and how to hand one resolved
//! artifact to its transport client. Everything else is shared by the driver.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::DeliveryError;
use crate::ports::{ChannelSettings, DocumentChannelClient, HttpUploadClient};

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Short name used in logs and job ids.
    fn name(&self) -> &'static str;

    /// An unconfigured channel makes every sweep a no-op.
    fn is_configured(&self, settings: &ChannelSettings) -> bool;

    /// One delivery attempt of the file at `artifact`.
    async fn deliver(&self, settings: &ChannelSettings, artifact: &Path) -> Result<(), DeliveryError>;
}

/// Sends the artifact file as a chat document.
pub struct DocumentChannel {
    client: Arc<dyn DocumentChannelClient>,
}

impl DocumentChannel {
    pub fn new(client: Arc<dyn DocumentChannelClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeliveryChannel for DocumentChannel {
    fn name(&self) -> &'static str {
        "document"
    }

    fn is_configured(&self, settings: &ChannelSettings) -> bool {
        settings.document_credentials().is_some()
    }

    async fn deliver(&self, settings: &ChannelSettings, artifact: &Path) -> Result<(), DeliveryError> {
        let (token, chat_id) = settings
            .document_credentials()
            .ok_or_else(|| DeliveryError::transient("document channel credentials are not set"))?;
        self.client.send(token, chat_id, artifact).await
    }
}

/// Posts the artifact's JSON content to the ingest endpoint.
pub struct HttpIngestChannel {
    client: Arc<dyn HttpUploadClient>,
}

impl HttpIngestChannel {
    pub fn new(client: Arc<dyn HttpUploadClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeliveryChannel for HttpIngestChannel {
    fn name(&self) -> &'static str {
        "http"
    }

    fn is_configured(&self, settings: &ChannelSettings) -> bool {
        settings.http_endpoint().is_some()
    }

    async fn deliver(&self, settings: &ChannelSettings, artifact: &Path) -> Result<(), DeliveryError> {
        let (base_url, api_key) = settings
            .http_endpoint()
            .ok_or_else(|| DeliveryError::transient("http endpoint is not set"))?;

        let bytes = tokio::fs::read(artifact).await.map_err(|err| {
            DeliveryError::transient(format!("read {}: {err}", artifact.display()))
        })?;
        // 壊れた JSON は何度送っても通らない
        let body: serde_json::Value = serde_json::from_slice(&bytes).map_err(|err| {
            DeliveryError::permanent(format!("{} is not valid JSON: {err}", artifact.display()))
        })?;

        self.client.upload(base_url, api_key, &body).await
    }
}
