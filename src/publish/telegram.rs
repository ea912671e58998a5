//! Outbound messaging channel adapters.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{EngineError, Result};

/// One-way outbound sender. One producer per channel; sends are in-order.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    /// Post one message; returns the channel's message id.
    async fn send(&self, text: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    result: Option<TelegramMessage>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
}

pub struct TelegramSender {
    http: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramSender {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            bot_token,
            chat_id,
        })
    }
}

#[async_trait]
impl OutboundSender for TelegramSender {
    async fn send(&self, text: &str) -> Result<String> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "chat_id": self.chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::TransportTimeout(e.to_string())
                } else {
                    EngineError::Http(e)
                }
            })?;

        let body: TelegramResponse = response.error_for_status()?.json().await?;
        if !body.ok {
            return Err(EngineError::Internal(format!(
                "telegram rejected message: {}",
                body.description.unwrap_or_default()
            )));
        }
        let message = body
            .result
            .ok_or_else(|| EngineError::Internal("telegram response missing result".into()))?;
        Ok(message.message_id.to_string())
    }
}

/// Dry-run sender: records messages instead of posting them.
#[derive(Default)]
pub struct NoopSender {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl OutboundSender for NoopSender {
    async fn send(&self, text: &str) -> Result<String> {
        debug!("Dry-run send:\n{}", text);
        let mut sent = self.sent.lock().await;
        sent.push(text.to_string());
        Ok(format!("dry-{}", sent.len()))
    }
}
