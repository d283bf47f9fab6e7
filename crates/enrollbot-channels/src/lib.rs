//! # EnrollBot Channels
//! Chat transport: Telegram Bot API long polling, messages, inline keyboards.

pub mod telegram;

pub use telegram::{
    IncomingCallback, IncomingMessage, IncomingUpdate, InlineButton, TelegramChannel,
    TelegramPollingStream, escape_html,
};
