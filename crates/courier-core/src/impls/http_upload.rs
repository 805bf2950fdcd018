//! JSON ingest client.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::http::{HttpTimeouts, build_client, classify_status, request_error};
use crate::domain::DeliveryError;
use crate::ports::HttpUploadClient;

pub const DEFAULT_INGEST_PATH: &str = "api/matches";

/// Posts bodies to `<base_url>/<ingest_path>` with an `X-Api-Key` header.
pub struct ReqwestUploadClient {
    client: Client,
    ingest_path: String,
}

impl ReqwestUploadClient {
    pub fn new(ingest_path: impl Into<String>, timeouts: HttpTimeouts) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeouts)?,
            ingest_path: ingest_path.into().trim_matches('/').to_string(),
        })
    }

    fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.ingest_path)
    }
}

#[async_trait]
impl HttpUploadClient for ReqwestUploadClient {
    async fn upload(
        &self,
        base_url: &str,
        api_key: &str,
        body: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        let url = self.url(base_url);
        debug!(url = %url, "uploading body");

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", api_key)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slashes() {
        let client = ReqwestUploadClient::new("/api/matches/", HttpTimeouts::default()).unwrap();
        assert_eq!(client.url("https://ingest.example/"), "https://ingest.example/api/matches");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let client = ReqwestUploadClient::new(DEFAULT_INGEST_PATH, HttpTimeouts::default()).unwrap();
        // port 9 (discard) on localhost is normally closed
        let err = client
            .upload("http://127.0.0.1:9", "key", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(!err.is_permanent());
    }
}
