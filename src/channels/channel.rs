//! Channel trait and message types.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;
use crate::session::SessionId;

/// A file attached to an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Channel-specific handle used to download the file.
    pub file_id: String,
    /// Original file name as sent by the user.
    pub file_name: String,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

/// A message received from an external channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Unique message ID.
    pub id: Uuid,
    /// Channel this message came from.
    pub channel: String,
    /// User identifier within the channel.
    pub user_id: String,
    /// Optional display name.
    pub user_name: Option<String>,
    /// Conversation the reply goes to.
    pub chat_id: String,
    /// Message text (or caption for attachments).
    pub content: String,
    /// Uploaded document, if any.
    pub attachment: Option<Attachment>,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    /// Create a new incoming message.
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user_id: user_id.into(),
            user_name: None,
            chat_id: chat_id.into(),
            content: content.into(),
            attachment: None,
            received_at: Utc::now(),
        }
    }

    /// Attach an uploaded file.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Set user name.
    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Session key for the sender.
    pub fn session_id(&self) -> SessionId {
        SessionId::new(self.user_id.clone())
    }

    /// Where replies to this message should be delivered.
    pub fn reply_target(&self) -> ReplyTarget {
        ReplyTarget {
            chat_id: self.chat_id.clone(),
        }
    }
}

/// Stream of incoming messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Destination for outgoing messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplyTarget {
    pub chat_id: String,
}

/// A sent message that can later be edited (used for live status lines).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub chat_id: String,
    pub message_id: String,
}

/// Trait for chat transports.
///
/// The core only needs these primitives plus a stable per-user identity
/// carried on `IncomingMessage`.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name (e.g., "telegram").
    fn name(&self) -> &str;

    /// Start listening for messages.
    ///
    /// Returns a stream of incoming messages. The channel should handle
    /// reconnection and error recovery internally.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a text message, returning a handle that can be edited.
    async fn send_message(
        &self,
        target: &ReplyTarget,
        text: &str,
    ) -> Result<MessageHandle, ChannelError>;

    /// Replace the text of a previously sent message.
    async fn edit_message(&self, handle: &MessageHandle, text: &str) -> Result<(), ChannelError>;

    /// Send a file from disk.
    async fn send_document(
        &self,
        target: &ReplyTarget,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Download an attachment to `dest`. Returns the number of bytes written.
    async fn download(&self, attachment: &Attachment, dest: &Path) -> Result<u64, ChannelError>;

    /// Check if the channel is healthy.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Gracefully shut down the channel.
    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
