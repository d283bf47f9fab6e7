//! Chat command dispatcher: `/start`, `/check`, `/list`, `/delete` and the
//! inline buttons those commands render.

use std::sync::Arc;

use enrollbot_channels::{
    IncomingCallback, IncomingMessage, IncomingUpdate, InlineButton, TelegramChannel,
    TelegramPollingStream,
};
use enrollbot_core::error::Result;
use enrollbot_core::types::TrackedRequest;
use futures::StreamExt;
use tokio::task::JoinSet;

use crate::messages;
use crate::service::{RegisterOutcome, TrackingService};

/// Payload of an inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// `/list` item: check this request now.
    Check {
        request_number: String,
        pin_code: String,
    },
    /// `/delete` item: stop watching this request.
    Delete { request_number: String },
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, ':');
        match (parts.next()?, parts.next(), parts.next()) {
            ("list", Some(request_number), Some(pin_code)) => Some(Self::Check {
                request_number: request_number.to_string(),
                pin_code: pin_code.to_string(),
            }),
            ("delete", Some(request_number), None) => Some(Self::Delete {
                request_number: request_number.to_string(),
            }),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Check {
                request_number,
                pin_code,
            } => format!("list:{request_number}:{pin_code}"),
            Self::Delete { request_number } => format!("delete:{request_number}"),
        }
    }
}

/// Telegram's limit on `callback_data`, in bytes.
const MAX_CALLBACK_DATA: usize = 64;

/// Extract `<request_number> <pin_code>` from command arguments.
/// Both must be present and free of the id/payload separators `_` and `:`,
/// and the pair must fit in a `/list` button payload.
pub fn parse_credentials<'a>(args: &[&'a str]) -> Option<(&'a str, &'a str)> {
    let [request_number, pin_code] = *args else {
        return None;
    };
    let valid = |s: &str| !s.is_empty() && !s.contains(['_', ':']);
    if !valid(request_number) || !valid(pin_code) {
        return None;
    }
    let payload = CallbackAction::Check {
        request_number: request_number.to_string(),
        pin_code: pin_code.to_string(),
    };
    if payload.encode().len() > MAX_CALLBACK_DATA {
        return None;
    }
    Some((request_number, pin_code))
}

fn check_buttons(tracked: &[TrackedRequest]) -> Vec<InlineButton> {
    tracked
        .iter()
        .map(|r| {
            let action = CallbackAction::Check {
                request_number: r.request_number.clone(),
                pin_code: r.pin_code.clone(),
            };
            InlineButton::new(&r.request_number, action.encode())
        })
        .collect()
}

fn delete_buttons<'a>(tracked: impl Iterator<Item = &'a TrackedRequest>) -> Vec<InlineButton> {
    tracked
        .map(|r| {
            let action = CallbackAction::Delete {
                request_number: r.request_number.clone(),
            };
            InlineButton::new(&r.request_number, action.encode())
        })
        .collect()
}

pub struct Bot {
    channel: TelegramChannel,
    service: Arc<TrackingService>,
}

impl Bot {
    pub fn new(channel: TelegramChannel, service: Arc<TrackingService>) -> Self {
        Self { channel, service }
    }

    /// Handle updates until the stream ends, then wait for handlers in flight.
    pub async fn run(self: Arc<Self>, mut updates: TelegramPollingStream) {
        let mut handlers = JoinSet::new();
        while let Some(update) = updates.next().await {
            while handlers.try_join_next().is_some() {}
            let bot = self.clone();
            handlers.spawn(async move {
                if let Err(e) = bot.handle(update).await {
                    tracing::error!("update handling failed: {e}");
                }
            });
        }
        while handlers.join_next().await.is_some() {}
        tracing::info!("Bot dispatcher stopped");
    }

    pub async fn handle(&self, update: IncomingUpdate) -> Result<()> {
        match update {
            IncomingUpdate::Message(msg) => self.on_message(&msg).await,
            IncomingUpdate::Callback(cb) => self.on_callback(&cb).await,
        }
    }

    async fn on_message(&self, msg: &IncomingMessage) -> Result<()> {
        let Some((command, args)) = msg.command() else {
            return Ok(());
        };
        tracing::debug!(user = msg.user_id, command, "command received");
        match command {
            "start" => self.on_start(msg, &args).await,
            "check" => self.on_check(msg, &args).await,
            "list" => self.on_list(msg).await,
            "delete" => self.on_delete(msg).await,
            _ => Ok(()),
        }
    }

    async fn reply(&self, msg: &IncomingMessage, text: &str) -> Result<()> {
        self.channel.send_message(msg.chat_id, text, None).await
    }

    async fn on_start(&self, msg: &IncomingMessage, args: &[&str]) -> Result<()> {
        let Some((request_number, pin_code)) = parse_credentials(args) else {
            return self.reply(msg, messages::USAGE_START).await;
        };
        let text = match self
            .service
            .register(msg.user_id, request_number, pin_code)
            .await?
        {
            RegisterOutcome::Registered => messages::REGISTERED,
            RegisterOutcome::AlreadyRegistered => messages::ALREADY_REGISTERED,
        };
        self.reply(msg, text).await
    }

    async fn on_check(&self, msg: &IncomingMessage, args: &[&str]) -> Result<()> {
        let Some((request_number, pin_code)) = parse_credentials(args) else {
            return self.reply(msg, messages::USAGE_CHECK).await;
        };
        self.service
            .manual_check(msg.user_id, request_number, pin_code)
            .await;
        Ok(())
    }

    async fn on_list(&self, msg: &IncomingMessage) -> Result<()> {
        let tracked = self.service.list(msg.user_id).await?;
        if tracked.is_empty() {
            return self.reply(msg, messages::EMPTY_LIST).await;
        }
        let buttons = check_buttons(&tracked);
        self.channel
            .send_message(msg.chat_id, messages::LIST_HEADER, Some(buttons.as_slice()))
            .await
    }

    async fn on_delete(&self, msg: &IncomingMessage) -> Result<()> {
        let tracked = self.service.list(msg.user_id).await?;
        if tracked.is_empty() {
            return self.reply(msg, messages::EMPTY_LIST).await;
        }
        let buttons = delete_buttons(tracked.iter());
        self.channel
            .send_message(msg.chat_id, messages::DELETE_HEADER, Some(buttons.as_slice()))
            .await
    }

    async fn on_callback(&self, cb: &IncomingCallback) -> Result<()> {
        let Some(action) = CallbackAction::parse(&cb.data) else {
            tracing::debug!(data = %cb.data, "unknown callback payload");
            return self.channel.answer_callback(&cb.id).await;
        };

        match action {
            CallbackAction::Check {
                request_number,
                pin_code,
            } => {
                self.channel
                    .edit_reply_markup(cb.chat_id, cb.message_id, &[])
                    .await?;
                self.channel.answer_callback(&cb.id).await?;
                self.service
                    .manual_check(cb.user_id, &request_number, &pin_code)
                    .await;
                Ok(())
            }
            CallbackAction::Delete { request_number } => {
                let outcome = self.service.delete(cb.user_id, &request_number).await?;
                self.channel.answer_callback(&cb.id).await?;
                if outcome.remaining.is_empty() {
                    self.channel
                        .edit_message_text(cb.chat_id, cb.message_id, messages::NO_MORE_ITEMS)
                        .await
                } else {
                    self.channel
                        .edit_reply_markup(
                            cb.chat_id,
                            cb.message_id,
                            &delete_buttons(outcome.remaining.iter()),
                        )
                        .await
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_roundtrip_and_rejects_garbage() {
        let check = CallbackAction::Check {
            request_number: "1111/0000".into(),
            pin_code: "123456".into(),
        };
        assert_eq!(check.encode(), "list:1111/0000:123456");
        assert_eq!(CallbackAction::parse("list:1111/0000:123456"), Some(check));
        assert_eq!(
            CallbackAction::parse("delete:1111/0000"),
            Some(CallbackAction::Delete {
                request_number: "1111/0000".into()
            })
        );
        assert_eq!(CallbackAction::parse("delete:1:2"), None);
        assert_eq!(CallbackAction::parse("list:1111/0000"), None);
        assert_eq!(CallbackAction::parse("other:x"), None);
    }

    #[test]
    fn test_parse_credentials() {
        assert_eq!(
            parse_credentials(&["1111/0000", "123456"]),
            Some(("1111/0000", "123456"))
        );
        assert_eq!(parse_credentials(&["1111/0000"]), None);
        assert_eq!(parse_credentials(&["1111/0000", "1", "2"]), None);
        assert_eq!(parse_credentials(&["1111_0000", "123456"]), None);
        assert_eq!(parse_credentials(&["1111/0000", "12:34"]), None);
    }

    #[test]
    fn test_credentials_must_fit_button_payload() {
        let long_request = "1111/0000".repeat(5);
        let long_pin = "1234567890".repeat(3);
        assert_eq!(parse_credentials(&[long_request.as_str(), long_pin.as_str()]), None);

        // "list:" + 49 + ":" + 9 = 64 bytes, the largest accepted payload.
        let request = "1".repeat(49);
        let (r, p) = parse_credentials(&[request.as_str(), "123456789"]).unwrap();
        let payload = CallbackAction::Check {
            request_number: r.into(),
            pin_code: p.into(),
        };
        assert_eq!(payload.encode().len(), 64);
        assert_eq!(parse_credentials(&[request.as_str(), "1234567890"]), None);
    }

    #[test]
    fn test_buttons_follow_tracking_order() {
        let tracked = vec![
            TrackedRequest::new("2222/0000", "1"),
            TrackedRequest::new("1111/0000", "2"),
        ];
        let list = check_buttons(&tracked);
        assert_eq!(list[0].text, "2222/0000");
        assert_eq!(list[0].data, "list:2222/0000:1");

        let delete = delete_buttons(tracked.iter());
        assert_eq!(delete[1].data, "delete:1111/0000");
    }
}
