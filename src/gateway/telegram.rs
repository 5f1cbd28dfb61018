//! Telegram Bot API client
//!
//! Information Hiding:
//! - Bot token lives only inside the request URL, never in logs
//! - Response envelope (`ok` / `result` / `description`) unwrapped here
//! - Only the update and message fields the bridge reads are modelled

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_ROOT: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    MarkdownV2,
    #[serde(rename = "HTML")]
    Html,
}

/// A message to deliver to one chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub force_reply: bool,
}

impl OutgoingMessage {
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            parse_mode: None,
            force_reply: false,
        }
    }

    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = Some(parse_mode);
        self
    }

    pub fn with_force_reply(mut self) -> Self {
        self.force_reply = true;
        self
    }
}

/// Delivers replies back to the chat platform
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_reply(&self, reply: OutgoingMessage) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct ForceReplyMarkup {
    force_reply: bool,
    selective: bool,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ForceReplyMarkup>,
}

pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_api_root(DEFAULT_API_ROOT, token)
    }

    pub fn with_api_root(api_root: &str, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("{}/bot{}", api_root.trim_end_matches('/'), token),
        }
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Telegram {} request failed", method))?;

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("Telegram {} returned an unreadable body", method))?;

        if !envelope.ok {
            anyhow::bail!(
                "Telegram {} rejected: {}",
                method,
                envelope.description.unwrap_or_else(|| "no description".to_string())
            );
        }

        envelope
            .result
            .ok_or_else(|| anyhow::anyhow!("Telegram {} returned no result", method))
    }

    /// Long-poll for message updates after `offset`
    pub async fn get_updates(&self, offset: Option<i64>, poll_timeout: Duration) -> Result<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: poll_timeout.as_secs(),
            allowed_updates: &["message"],
        };
        // The HTTP timeout must outlast the server-side long poll
        self.call("getUpdates", &request, poll_timeout + Duration::from_secs(10))
            .await
    }

    pub async fn send_message(&self, reply: &OutgoingMessage) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: reply.chat_id,
            text: &reply.text,
            parse_mode: reply.parse_mode,
            reply_markup: reply.force_reply.then_some(ForceReplyMarkup {
                force_reply: true,
                selective: true,
            }),
        };

        let _: serde_json::Value = self
            .call("sendMessage", &request, Duration::from_secs(30))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReplySink for TelegramClient {
    async fn send_reply(&self, reply: OutgoingMessage) -> Result<()> {
        self.send_message(&reply).await
    }
}
