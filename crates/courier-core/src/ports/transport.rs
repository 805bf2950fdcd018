//! Transport ports - 配送先クライアント
//!
//! Each client makes exactly one attempt; retrying is the driver's job.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::DeliveryError;

/// Sends a file as a document to a chat on a messaging channel.
#[async_trait]
pub trait DocumentChannelClient: Send + Sync {
    async fn send(&self, token: &str, chat_id: &str, file: &Path) -> Result<(), DeliveryError>;
}

/// Posts a JSON body to the ingest endpoint.
#[async_trait]
pub trait HttpUploadClient: Send + Sync {
    async fn upload(
        &self,
        base_url: &str,
        api_key: &str,
        body: &serde_json::Value,
    ) -> Result<(), DeliveryError>;
}
