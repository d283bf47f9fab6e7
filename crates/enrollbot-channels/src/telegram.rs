//! Telegram Bot channel: long polling and message sending via the Bot API.

use async_trait::async_trait;
use enrollbot_core::config::TelegramSettings;
use enrollbot_core::error::{EnrollBotError, Result};
use enrollbot_core::traits::Notifier;
use enrollbot_core::types::UserId;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::watch;

/// Telegram Bot API client. Cheap to clone.
#[derive(Clone)]
pub struct TelegramChannel {
    bot_token: String,
    poll_interval: u64,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(settings: &TelegramSettings) -> Self {
        Self {
            bot_token: settings.bot_token.clone(),
            poll_interval: settings.poll_interval,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrollBotError::Channel(format!("Telegram {method} failed: {e}")))?;

        let result: TelegramApiResponse<T> = response
            .json()
            .await
            .map_err(|e| EnrollBotError::Channel(format!("Invalid {method} response: {e}")))?;

        if !result.ok {
            return Err(EnrollBotError::Channel(format!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            )));
        }
        result
            .result
            .ok_or_else(|| EnrollBotError::Channel(format!("Empty {method} result")))
    }

    /// Get updates using long polling.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        self.fetch_updates(offset, 30).await
    }

    async fn fetch_updates(&self, offset: i64, timeout: u64) -> Result<Vec<TelegramUpdate>> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": timeout,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    /// Confirm everything queued while the bot was offline and return the
    /// offset to resume from. `offset = -1` yields only the newest update.
    pub async fn skip_pending(&self) -> Result<i64> {
        let updates = self.fetch_updates(-1, 0).await?;
        Ok(resume_offset(&updates))
    }

    /// Send an HTML-formatted message, optionally with inline buttons.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Option<&[InlineButton]>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(buttons) = buttons {
            body["reply_markup"] = keyboard(buttons);
        }
        self.call::<serde_json::Value>("sendMessage", body).await?;
        Ok(())
    }

    /// Replace the text of a message, dropping its keyboard.
    pub async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        ignore_not_modified(self.call::<serde_json::Value>("editMessageText", body).await)
    }

    /// Replace the inline keyboard of a message. An empty slice removes it.
    pub async fn edit_reply_markup(
        &self,
        chat_id: i64,
        message_id: i64,
        buttons: &[InlineButton],
    ) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "reply_markup": keyboard(buttons),
        });
        ignore_not_modified(
            self.call::<serde_json::Value>("editMessageReplyMarkup", body)
                .await,
        )
    }

    /// Stop the client-side spinner on a pressed button.
    pub async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.call::<serde_json::Value>(
            "answerCallbackQuery",
            serde_json::json!({ "callback_query_id": callback_id }),
        )
        .await?;
        Ok(())
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        self.call("getMe", serde_json::json!({})).await
    }

    /// Start the polling loop. The stream ends when `shutdown` flips to `true`.
    pub fn start_polling(&self, mut shutdown: watch::Receiver<bool>) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let channel = self.clone();

        tokio::spawn(async move {
            tracing::info!("Telegram polling loop started");
            let mut offset = match channel.skip_pending().await {
                Ok(offset) => offset,
                Err(e) => {
                    tracing::warn!("Could not skip pending updates: {e}");
                    0
                }
            };

            loop {
                let updates = tokio::select! {
                    updates = channel.get_updates(offset) => updates,
                    _ = shutdown.changed() => break,
                };
                match updates {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            if let Some(incoming) = update.to_incoming() {
                                if tx.send(incoming).is_err() {
                                    tracing::info!("Telegram polling stopped (receiver dropped)");
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        if !pause(&mut shutdown, 5).await {
                            break;
                        }
                        continue;
                    }
                }

                if !pause(&mut shutdown, channel.poll_interval).await {
                    break;
                }
            }
            tracing::info!("Telegram polling loop stopped");
        });

        TelegramPollingStream { rx }
    }
}

/// Sleep for `secs`. Returns `false` if shutdown was signalled first.
async fn pause(shutdown: &mut watch::Receiver<bool>, secs: u64) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(tokio::time::Duration::from_secs(secs)) => true,
        _ = shutdown.changed() => false,
    }
}

fn resume_offset(updates: &[TelegramUpdate]) -> i64 {
    updates.iter().map(|u| u.update_id + 1).max().unwrap_or(0)
}

fn keyboard(buttons: &[InlineButton]) -> serde_json::Value {
    let rows: Vec<_> = buttons
        .iter()
        .map(|b| serde_json::json!([{ "text": b.text, "callback_data": b.data }]))
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

fn ignore_not_modified(result: Result<serde_json::Value>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(EnrollBotError::Channel(msg)) if msg.contains("message is not modified") => {
            tracing::debug!("Telegram edit skipped: {msg}");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Escape text for `parse_mode = HTML`.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl Notifier for TelegramChannel {
    async fn send(&self, user: UserId, text: &str) -> Result<()> {
        // Private chat id == user id.
        self.send_message(user, &escape_html(text), None).await
    }
}

/// Stream of incoming Telegram updates from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingUpdate>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// One inline keyboard button (rendered one per row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub data: String,
}

impl InlineButton {
    pub fn new(text: &str, data: String) -> Self {
        Self {
            text: text.to_string(),
            data,
        }
    }
}

/// A text message from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub user_id: UserId,
    pub message_id: i64,
    pub text: String,
}

impl IncomingMessage {
    /// Split `/cmd@bot a b` into `("cmd", ["a", "b"])`. None for plain text.
    pub fn command(&self) -> Option<(&str, Vec<&str>)> {
        let mut parts = self.text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        let name = head.split('@').next().unwrap_or(head);
        Some((name, parts.collect()))
    }
}

/// An inline button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCallback {
    pub id: String,
    pub user_id: UserId,
    pub chat_id: i64,
    pub message_id: i64,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingUpdate {
    Message(IncomingMessage),
    Callback(IncomingCallback),
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramCallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<TelegramMessage>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

impl TelegramUpdate {
    /// Convert to an [`IncomingUpdate`]; bot senders and non-text updates are dropped.
    pub fn to_incoming(&self) -> Option<IncomingUpdate> {
        if let Some(query) = &self.callback_query {
            let message = query.message.as_ref()?;
            return Some(IncomingUpdate::Callback(IncomingCallback {
                id: query.id.clone(),
                user_id: query.from.id,
                chat_id: message.chat.id,
                message_id: message.message_id,
                data: query.data.clone()?,
            }));
        }

        let msg = self.message.as_ref()?;
        let from = msg.from.as_ref()?;
        if from.is_bot {
            return None;
        }
        Some(IncomingUpdate::Message(IncomingMessage {
            chat_id: msg.chat.id,
            user_id: from.id,
            message_id: msg.message_id,
            text: msg.text.clone()?,
        }))
    }
}
