//! Chat transports.
//!
//! The core talks to users only through the `Channel` trait. The shipped
//! implementation is Telegram long polling.

mod channel;
mod telegram;

pub use channel::{
    Attachment, Channel, IncomingMessage, MessageHandle, MessageStream, ReplyTarget,
};
pub use telegram::TelegramChannel;
