//! Telegram Bot API sink

use super::{ByteStream, ChatRef, MessageRef, UploadSink};
use crate::config::TelegramConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Envelope every Bot API method answers with
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    #[serde(default)]
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct Document {
    file_id: String,
}

/// Uploads documents into a storage chat and reports progress via text messages
///
/// Identifiers are Telegram `file_id`s; [`link`](UploadSink::link) turns them
/// into download URLs under the bot's file endpoint.
#[derive(Clone)]
pub struct TelegramSink {
    client: reqwest::Client,
    api_base: String,
    file_base: String,
    storage_chat: ChatRef,
}

impl std::fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // api_base embeds the bot token
        f.debug_struct("TelegramSink")
            .field("storage_chat", &self.storage_chat)
            .finish_non_exhaustive()
    }
}

impl TelegramSink {
    /// Build a sink from the `telegram` section of the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no bot token is configured.
    pub fn new(config: &TelegramConfig, client: reqwest::Client) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(Error::Config {
                message: "telegram bot token is empty".to_string(),
                key: Some("telegram.token".to_string()),
            });
        }

        let host = config.api_host.trim_end_matches('/');
        let root = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };

        Ok(Self {
            client,
            api_base: format!("{root}/bot{}", config.token),
            file_base: format!("{root}/file/bot{}", config.token),
            storage_chat: ChatRef(config.storage_chat_id),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Sink(format!("{method}: {e}")))?;
        parse_response(method, response).await
    }
}

async fn parse_response<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::Sink(format!("{method}: {e}")))?;

    let envelope: ApiResponse<T> = serde_json::from_slice(&body)
        .map_err(|e| Error::Sink(format!("{method}: unreadable response (HTTP {status}): {e}")))?;

    if !envelope.ok {
        let description = envelope
            .description
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(Error::Sink(format!("{method}: {description}")));
    }

    envelope
        .result
        .ok_or_else(|| Error::Sink(format!("{method}: response has no result")))
}

#[async_trait]
impl UploadSink for TelegramSink {
    async fn upload(&self, name: &str, body: ByteStream, size_hint: u64) -> Result<String> {
        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), size_hint)
            .file_name(name.to_string());
        let form = Form::new()
            .text("chat_id", self.storage_chat.0.to_string())
            .part("document", part);

        tracing::debug!(name, size_hint, "uploading document");

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Sink(format!("sendDocument: {e}")))?;

        let message: Message = parse_response("sendDocument", response).await?;
        let file_id = message
            .document
            .map(|d| d.file_id)
            .unwrap_or_default();

        tracing::debug!(name, message_id = message.message_id, "document stored");
        Ok(file_id)
    }

    async fn send_text(&self, chat: ChatRef, text: &str) -> Result<MessageRef> {
        let message: Message = self
            .call(
                "sendMessage",
                serde_json::json!({ "chat_id": chat.0, "text": text }),
            )
            .await?;
        Ok(MessageRef(message.message_id))
    }

    async fn edit_text(&self, chat: ChatRef, message: MessageRef, text: &str) -> Result<()> {
        // result is the edited message (or `true` for inline messages)
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                serde_json::json!({
                    "chat_id": chat.0,
                    "message_id": message.0,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }

    fn link(&self, identifier: &str) -> String {
        format!("{}/{identifier}", self.file_base)
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
