//! Document channel client over the Telegram Bot API (`sendDocument`).

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::http::{HttpTimeouts, build_client, classify_status, request_error};
use crate::domain::DeliveryError;
use crate::ports::DocumentChannelClient;

pub const DEFAULT_BOT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramDocumentClient {
    client: Client,
    api_base: String,
}

impl TelegramDocumentClient {
    pub fn new(api_base: impl Into<String>, timeouts: HttpTimeouts) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeouts)?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, token: &str) -> String {
        format!("{}/bot{}/sendDocument", self.api_base, token)
    }
}

#[async_trait]
impl DocumentChannelClient for TelegramDocumentClient {
    async fn send(&self, token: &str, chat_id: &str, file: &Path) -> Result<(), DeliveryError> {
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|err| DeliveryError::transient(format!("read {}: {err}", file.display())))?;
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact.json".to_string());

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", Part::bytes(bytes).file_name(file_name.clone()));

        // token は URL に含まれるのでログには出さない
        debug!(file = %file_name, chat_id, "sending document");
        let response = self
            .client
            .post(self.endpoint(token))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        match serde_json::from_str::<BotResponse>(&body) {
            Ok(reply) if reply.ok => Ok(()),
            Ok(reply) => Err(DeliveryError::transient(
                reply
                    .description
                    .unwrap_or_else(|| "channel rejected the document".to_string()),
            )),
            Err(err) => Err(DeliveryError::transient(format!("unreadable channel reply: {err}"))),
        }
    }
}
