//! Telegram Bot API channel.
//!
//! Receives updates by long polling `getUpdates` and talks back through
//! `sendMessage`, `editMessageText` and `sendDocument`. Uploaded documents are
//! fetched with `getFile` and streamed to disk.
//!
//! The bot token only ever appears inside request URLs; reqwest errors are
//! stripped of their URL before they are logged or returned.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::channels::{
    Attachment, Channel, IncomingMessage, MessageHandle, MessageStream, ReplyTarget,
};
use crate::config::TelegramConfig;
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "telegram";

/// Buffered updates between the poll task and the dispatcher.
const UPDATE_BUFFER: usize = 64;

/// Pause before polling again after a failed `getUpdates`.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Extra slack on top of the long-poll timeout before reqwest gives up.
const POLL_REQUEST_SLACK: Duration = Duration::from_secs(10);

// ============================================================================
// Telegram API Types
// ============================================================================

/// Telegram Update object.
/// https://core.telegram.org/bots/api#update
#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

/// Telegram Message object.
/// https://core.telegram.org/bots/api#message
#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    from: Option<TelegramUser>,
    chat: TelegramChat,
    text: Option<String>,
    caption: Option<String>,
    document: Option<TelegramDocument>,
}

/// https://core.telegram.org/bots/api#user
#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    first_name: String,
    username: Option<String>,
}

/// https://core.telegram.org/bots/api#chat
#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

/// https://core.telegram.org/bots/api#document
#[derive(Debug, Deserialize)]
struct TelegramDocument {
    file_id: String,
    file_name: Option<String>,
    mime_type: Option<String>,
    file_size: Option<u64>,
}

/// https://core.telegram.org/bots/api#file
#[derive(Debug, Deserialize)]
struct TelegramFile {
    file_path: Option<String>,
}

/// Telegram API response wrapper.
#[derive(Debug, Deserialize)]
struct TelegramApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

// ============================================================================
// Channel Implementation
// ============================================================================

/// Native Telegram channel using the HTTPS Bot API.
pub struct TelegramChannel {
    client: reqwest::Client,
    api_url: String,
    bot_token: SecretString,
    poll_timeout: Duration,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            bot_token: SecretString::from(config.bot_token.expose_secret().to_owned()),
            poll_timeout: config.poll_timeout,
            poll_task: Mutex::new(None),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_url,
            self.bot_token.expose_secret(),
            method
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_url,
            self.bot_token.expose_secret(),
            file_path
        )
    }

    /// POST a JSON body to a Bot API method and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, ChannelError> {
        let mut request = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| e.without_url())?;
        let envelope: TelegramApiResponse<T> =
            response.json().await.map_err(|e| e.without_url())?;
        unwrap_envelope(method, envelope)
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>, ChannelError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        self.call(
            "getUpdates",
            &body,
            Some(self.poll_timeout + POLL_REQUEST_SLACK),
        )
        .await
    }
}

fn unwrap_envelope<T>(method: &str, envelope: TelegramApiResponse<T>) -> Result<T, ChannelError> {
    if !envelope.ok {
        return Err(ChannelError::Api {
            name: CHANNEL_NAME.to_string(),
            reason: format!(
                "{} failed: {}",
                method,
                envelope
                    .description
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        });
    }
    envelope.result.ok_or_else(|| ChannelError::Api {
        name: CHANNEL_NAME.to_string(),
        reason: format!("{} returned no result", method),
    })
}

/// Convert a Telegram update into the channel-neutral message type.
///
/// Returns `None` for updates we do not handle (non-message updates, bots).
fn convert_update(update: TelegramUpdate) -> Option<IncomingMessage> {
    let message = update.message?;
    let chat_id = message.chat.id.to_string();

    let (user_id, user_name) = match message.from {
        Some(user) if user.is_bot => return None,
        Some(user) => (
            user.id.to_string(),
            Some(user.username.unwrap_or(user.first_name)),
        ),
        None => (chat_id.clone(), None),
    };

    let content = message.text.or(message.caption).unwrap_or_default();
    let mut incoming = IncomingMessage::new(CHANNEL_NAME, user_id, chat_id, content);
    if let Some(name) = user_name {
        incoming = incoming.with_user_name(name);
    }

    if let Some(doc) = message.document {
        let is_pdf_mime = doc.mime_type.as_deref() == Some("application/pdf");
        let file_name = match doc.file_name {
            Some(name) => name,
            None if is_pdf_mime => "document.pdf".to_string(),
            None => "document".to_string(),
        };
        incoming = incoming.with_attachment(Attachment {
            file_id: doc.file_id,
            file_name,
            mime_type: doc.mime_type,
            file_size: doc.file_size,
        });
    }

    tracing::trace!(
        message_id = message.message_id,
        update_id = update.update_id,
        "Converted Telegram update"
    );
    Some(incoming)
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        // Telegram refuses getUpdates while a webhook is registered.
        if let Err(e) = self
            .call::<bool>("deleteWebhook", &serde_json::json!({}), None)
            .await
        {
            tracing::warn!("Failed to delete webhook (may not exist): {}", e);
        }

        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let poller = TelegramChannel {
            client: self.client.clone(),
            api_url: self.api_url.clone(),
            bot_token: SecretString::from(self.bot_token.expose_secret().to_owned()),
            poll_timeout: self.poll_timeout,
            poll_task: Mutex::new(None),
        };

        let handle = tokio::spawn(async move {
            let mut offset = 0i64;
            tracing::info!("Telegram polling started");
            loop {
                match poller.get_updates(offset).await {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            if let Some(msg) = convert_update(update) {
                                if tx.send(msg).await.is_err() {
                                    tracing::info!("Message receiver dropped, polling stops");
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("getUpdates failed: {}", e);
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    }
                }
            }
        });

        if let Some(previous) = self.poll_task.lock().await.replace(handle) {
            previous.abort();
        }

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn send_message(
        &self,
        target: &ReplyTarget,
        text: &str,
    ) -> Result<MessageHandle, ChannelError> {
        #[derive(Deserialize)]
        struct Sent {
            message_id: i64,
        }

        let body = serde_json::json!({
            "chat_id": target.chat_id,
            "text": text,
        });
        let sent: Sent = self
            .call("sendMessage", &body, None)
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: CHANNEL_NAME.to_string(),
                reason: e.to_string(),
            })?;

        Ok(MessageHandle {
            chat_id: target.chat_id.clone(),
            message_id: sent.message_id.to_string(),
        })
    }

    async fn edit_message(&self, handle: &MessageHandle, text: &str) -> Result<(), ChannelError> {
        let edit_failed = |reason: String| ChannelError::EditFailed {
            name: CHANNEL_NAME.to_string(),
            message_id: handle.message_id.clone(),
            reason,
        };

        let message_id: i64 = handle
            .message_id
            .parse()
            .map_err(|_| edit_failed("message id is not numeric".to_string()))?;

        let body = serde_json::json!({
            "chat_id": handle.chat_id,
            "message_id": message_id,
            "text": text,
        });
        // Result is the edited Message, or `true` for inline messages.
        self.call::<serde_json::Value>("editMessageText", &body, None)
            .await
            .map(|_| ())
            .map_err(|e| edit_failed(e.to_string()))
    }

    async fn send_document(
        &self,
        target: &ReplyTarget,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let send_failed = |reason: String| ChannelError::SendFailed {
            name: CHANNEL_NAME.to_string(),
            reason,
        };

        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(mime.as_ref())
            .map_err(|e| send_failed(e.without_url().to_string()))?;

        let mut form = Form::new()
            .text("chat_id", target.chat_id.clone())
            .part("document", part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| send_failed(e.without_url().to_string()))?;
        let envelope: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| send_failed(e.without_url().to_string()))?;

        unwrap_envelope("sendDocument", envelope)
            .map(|_| ())
            .map_err(|e| send_failed(e.to_string()))
    }

    async fn download(&self, attachment: &Attachment, dest: &Path) -> Result<u64, ChannelError> {
        let download_failed = |reason: String| ChannelError::DownloadFailed {
            name: CHANNEL_NAME.to_string(),
            file_id: attachment.file_id.clone(),
            reason,
        };

        let file: TelegramFile = self
            .call(
                "getFile",
                &serde_json::json!({ "file_id": attachment.file_id }),
                None,
            )
            .await?;
        let file_path = file
            .file_path
            .ok_or_else(|| download_failed("getFile returned no file_path".to_string()))?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(|e| download_failed(e.without_url().to_string()))?;
        if !response.status().is_success() {
            return Err(download_failed(format!("HTTP {}", response.status())));
        }

        let mut out = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk: Bytes = chunk.map_err(|e| download_failed(e.without_url().to_string()))?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;

        tracing::debug!(file_id = %attachment.file_id, bytes = written, dest = %dest.display(), "Downloaded attachment");
        Ok(written)
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.call::<serde_json::Value>("getMe", &serde_json::json!({}), None)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::HealthCheckFailed {
                name: CHANNEL_NAME.to_string(),
                reason: e.to_string(),
            })
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        if let Some(handle) = self.poll_task.lock().await.take() {
            handle.abort();
            tracing::info!("Telegram polling stopped");
        }
        Ok(())
    }
}
