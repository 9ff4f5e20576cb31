//! Test doubles shared by unit tests: a recording channel and a scripted
//! operation library.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::channels::{
    Attachment, Channel, IncomingMessage, MessageHandle, MessageStream, ReplyTarget,
};
use crate::error::ChannelError;
use crate::pdf::{OperationError, PdfOperations, Rotation};
use crate::queue::JobTracker;

/// Something the bot did on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Sent {
        chat_id: String,
        handle: MessageHandle,
        text: String,
    },
    Edited {
        handle: MessageHandle,
        text: String,
    },
    Document {
        chat_id: String,
        path: PathBuf,
    },
}

/// In-memory `Channel` that records every call.
#[derive(Default)]
pub(crate) struct RecordingChannel {
    events: Mutex<Vec<Event>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    incoming: Mutex<Vec<IncomingMessage>>,
    next_message_id: AtomicU64,
    fail_sends: bool,
    fail_edits: bool,
    fail_documents: bool,
}

impl RecordingChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub(crate) fn failing_edits(mut self) -> Self {
        self.fail_edits = true;
        self
    }

    pub(crate) fn failing_documents(mut self) -> Self {
        self.fail_documents = true;
        self
    }

    /// Serve `bytes` when `file_id` is downloaded.
    pub(crate) fn with_file(self, file_id: &str, bytes: Vec<u8>) -> Self {
        self.files.lock().unwrap().insert(file_id.to_string(), bytes);
        self
    }

    /// Messages yielded by `start`, in order.
    pub(crate) fn with_incoming(self, messages: Vec<IncomingMessage>) -> Self {
        *self.incoming.lock().unwrap() = messages;
        self
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Texts of newly sent messages, in order.
    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Sent { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn edits_of(&self, handle: &MessageHandle) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Edited { handle: h, text } if &h == handle => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Most recent text shown to the user, whether sent or edited.
    pub(crate) fn last_text(&self) -> Option<String> {
        self.events().into_iter().rev().find_map(|e| match e {
            Event::Sent { text, .. } | Event::Edited { text, .. } => Some(text),
            Event::Document { .. } => None,
        })
    }

    pub(crate) fn documents(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Document { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let messages = std::mem::take(&mut *self.incoming.lock().unwrap());
        Ok(Box::pin(futures::stream::iter(messages)))
    }

    async fn send_message(
        &self,
        target: &ReplyTarget,
        text: &str,
    ) -> Result<MessageHandle, ChannelError> {
        if self.fail_sends {
            return Err(ChannelError::SendFailed {
                name: "recording".to_string(),
                reason: "sends disabled".to_string(),
            });
        }
        let handle = MessageHandle {
            chat_id: target.chat_id.clone(),
            message_id: self
                .next_message_id
                .fetch_add(1, Ordering::SeqCst)
                .to_string(),
        };
        self.record(Event::Sent {
            chat_id: target.chat_id.clone(),
            handle: handle.clone(),
            text: text.to_string(),
        });
        Ok(handle)
    }

    async fn edit_message(&self, handle: &MessageHandle, text: &str) -> Result<(), ChannelError> {
        if self.fail_edits {
            return Err(ChannelError::EditFailed {
                name: "recording".to_string(),
                message_id: handle.message_id.clone(),
                reason: "edits disabled".to_string(),
            });
        }
        self.record(Event::Edited {
            handle: handle.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_document(
        &self,
        target: &ReplyTarget,
        path: &Path,
        _caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        if self.fail_documents {
            return Err(ChannelError::SendFailed {
                name: "recording".to_string(),
                reason: "uploads disabled".to_string(),
            });
        }
        self.record(Event::Document {
            chat_id: target.chat_id.clone(),
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn download(&self, attachment: &Attachment, dest: &Path) -> Result<u64, ChannelError> {
        let bytes = self
            .files
            .lock()
            .unwrap()
            .get(&attachment.file_id)
            .cloned()
            .ok_or_else(|| ChannelError::DownloadFailed {
                name: "recording".to_string(),
                file_id: attachment.file_id.clone(),
                reason: "no such file".to_string(),
            })?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// A call made against `FakeOperations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OperationCall {
    RemoveWatermark {
        input: PathBuf,
        output: PathBuf,
        keywords: Vec<String>,
    },
    Compress {
        input: PathBuf,
        output: PathBuf,
    },
    Split {
        input: PathBuf,
        out_dir: PathBuf,
    },
    Merge {
        inputs: Vec<PathBuf>,
        output: PathBuf,
    },
    Rotate {
        input: PathBuf,
        output: PathBuf,
        rotation: Rotation,
    },
    ExtractImages {
        input: PathBuf,
        out_dir: PathBuf,
        dpi: u32,
    },
}

/// Scripted `PdfOperations`: records calls and writes placeholder outputs.
pub(crate) struct FakeOperations {
    calls: Mutex<Vec<OperationCall>>,
    pages: u32,
    failure: Option<String>,
    panic: Option<String>,
    delay: Option<Duration>,
}

impl FakeOperations {
    pub(crate) fn new(pages: u32) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            pages,
            failure: None,
            panic: None,
            delay: None,
        }
    }

    /// Make every transformation fail with `reason`.
    pub(crate) fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }

    /// Make every transformation panic with `message`.
    pub(crate) fn panicking(mut self, message: &str) -> Self {
        self.panic = Some(message.to_string());
        self
    }

    /// Block the calling thread for `delay` before each transformation returns.
    pub(crate) fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<OperationCall> {
        self.calls.lock().unwrap().clone()
    }

    fn call(&self, call: OperationCall) -> Result<(), OperationError> {
        self.calls.lock().unwrap().push(call);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(message) = &self.panic {
            panic!("{message}");
        }
        match &self.failure {
            Some(reason) => Err(OperationError::Structure(reason.clone())),
            None => Ok(()),
        }
    }

    fn write_pages(&self, out_dir: &Path, extension: &str) -> Result<Vec<PathBuf>, OperationError> {
        std::fs::create_dir_all(out_dir)?;
        (1..=self.pages)
            .map(|n| -> Result<PathBuf, OperationError> {
                let path = out_dir.join(format!("page_{n}.{extension}"));
                std::fs::write(&path, b"fake")?;
                Ok(path)
            })
            .collect()
    }
}

impl PdfOperations for FakeOperations {
    fn remove_watermark(
        &self,
        input: &Path,
        output: &Path,
        keywords: &[String],
    ) -> Result<(), OperationError> {
        self.call(OperationCall::RemoveWatermark {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            keywords: keywords.to_vec(),
        })?;
        std::fs::write(output, b"fake")?;
        Ok(())
    }

    fn compress(&self, input: &Path, output: &Path) -> Result<(), OperationError> {
        self.call(OperationCall::Compress {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        })?;
        std::fs::write(output, b"fake")?;
        Ok(())
    }

    fn split(&self, input: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, OperationError> {
        self.call(OperationCall::Split {
            input: input.to_path_buf(),
            out_dir: out_dir.to_path_buf(),
        })?;
        self.write_pages(out_dir, "pdf")
    }

    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), OperationError> {
        self.call(OperationCall::Merge {
            inputs: inputs.to_vec(),
            output: output.to_path_buf(),
        })?;
        std::fs::write(output, b"fake")?;
        Ok(())
    }

    fn rotate(
        &self,
        input: &Path,
        output: &Path,
        rotation: Rotation,
    ) -> Result<(), OperationError> {
        self.call(OperationCall::Rotate {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            rotation,
        })?;
        std::fs::write(output, b"fake")?;
        Ok(())
    }

    fn extract_images(
        &self,
        input: &Path,
        out_dir: &Path,
        dpi: u32,
    ) -> Result<Vec<PathBuf>, OperationError> {
        self.call(OperationCall::ExtractImages {
            input: input.to_path_buf(),
            out_dir: out_dir.to_path_buf(),
            dpi,
        })?;
        self.write_pages(out_dir, "png")
    }

    fn page_count(&self, _input: &Path) -> Option<u32> {
        Some(self.pages)
    }
}

/// Wait until `expected` jobs reached a terminal state.
pub(crate) async fn wait_for_finished(tracker: &JobTracker, expected: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let summary = tracker.summary();
            if summary.completed + summary.failed >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "jobs did not finish: {:?}", tracker.summary());
}
