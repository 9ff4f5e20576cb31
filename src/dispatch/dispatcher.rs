//! Command dispatcher.
//!
//! Runs on the control plane: validates preconditions, builds job payloads
//! and enqueues them. Heavy work only happens inside jobs on the worker.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tokio::task::JoinError;

use crate::app::AppContext;
use crate::channels::{Attachment, Channel, IncomingMessage, MessageHandle, ReplyTarget};
use crate::config::{Config, ProgressConfig};
use crate::dispatch::command::{Command, parse_dpi, parse_rotation};
use crate::dispatch::messages::{self, StatusReport};
use crate::dispatch::naming;
use crate::error::{DispatchError, Error, QueueError};
use crate::pdf::{OperationError, PdfOperations};
use crate::progress::run_progress;
use crate::queue::{Job, JobAbort, panic_message};
use crate::session::{DocumentRef, SessionId};

/// Settings the dispatcher and its jobs need from `Config`.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub work_dir: PathBuf,
    pub watermark_keywords: Vec<String>,
    pub progress: ProgressConfig,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            watermark_keywords: config.watermark_keywords.clone(),
            progress: config.progress,
        }
    }
}

/// A transformation run on a blocking thread. Returns the files to send.
type Operation =
    Box<dyn FnOnce(&dyn PdfOperations) -> Result<Vec<PathBuf>, OperationError> + Send>;

fn operation<F>(f: F) -> Operation
where
    F: FnOnce(&dyn PdfOperations) -> Result<Vec<PathBuf>, OperationError> + Send + 'static,
{
    Box::new(f)
}

/// Status texts for one kind of transformation.
#[derive(Debug, Clone, Copy)]
struct Plan {
    started: &'static str,
    progress_label: &'static str,
    done: &'static str,
    /// Shown when the operation succeeds without producing files.
    empty: &'static str,
}

const CLEAN: Plan = Plan {
    started: "Cleaning PDF...",
    progress_label: "Cleaning",
    done: "Cleaned",
    empty: messages::NOTHING_TO_SEND,
};

const COMPRESS: Plan = Plan {
    started: "Compressing PDF...",
    progress_label: "Compressing",
    done: "Compressed",
    empty: messages::NOTHING_TO_SEND,
};

const SPLIT: Plan = Plan {
    started: "Splitting PDF...",
    progress_label: "Splitting",
    done: "Split",
    empty: messages::NOTHING_TO_SEND,
};

const ROTATE: Plan = Plan {
    started: "Rotating PDF...",
    progress_label: "Rotating",
    done: "Rotated",
    empty: messages::NOTHING_TO_SEND,
};

const EXTRACT: Plan = Plan {
    started: "Extracting images...",
    progress_label: "Extracting",
    done: "Extracted",
    empty: messages::NO_IMAGES,
};

const MERGE: Plan = Plan {
    started: "Merging PDFs...",
    progress_label: "Merging",
    done: "Merged",
    empty: messages::NOTHING_TO_SEND,
};

/// Everything a transformation job needs, captured at enqueue time.
struct TransformJob {
    channel: Arc<dyn Channel>,
    operations: Arc<dyn PdfOperations>,
    target: ReplyTarget,
    progress: ProgressConfig,
    plan: Plan,
    run: Operation,
    /// Status line, once sent. Shared with the job's abort notice.
    status: Arc<OnceLock<MessageHandle>>,
}

impl TransformJob {
    async fn run(self) -> crate::Result<()> {
        let TransformJob {
            channel,
            operations,
            target,
            progress,
            plan,
            run,
            status,
        } = self;

        match channel.send_message(&target, plan.started).await {
            Ok(handle) => {
                let _ = status.set(handle);
            }
            Err(e) => {
                tracing::warn!(chat_id = %target.chat_id, "Could not send job status, continuing: {}", e);
            }
        }
        if let Some(handle) = status.get() {
            run_progress(
                channel.as_ref(),
                handle,
                progress.total_steps,
                plan.progress_label,
                progress.step_interval,
            )
            .await;
        }

        let outcome = tokio::task::spawn_blocking(move || run(operations.as_ref()))
            .await
            .unwrap_or_else(|e| Err(join_failure(e)));

        let outputs = match outcome {
            Ok(outputs) => outputs,
            Err(e) => {
                tracing::warn!(chat_id = %target.chat_id, "Operation failed: {}", e);
                let text = messages::operation_failed(&e.to_string());
                update_status(channel.as_ref(), &target, status.get(), &text).await;
                return Err(e.into());
            }
        };

        let text = match outputs.len() {
            0 => plan.empty.to_string(),
            1 => messages::finished(plan.done),
            n => messages::finished_many(plan.done, n),
        };
        update_status(channel.as_ref(), &target, status.get(), &text).await;

        deliver(channel.as_ref(), &target, &outputs).await
    }
}

/// Tells the user about a job the worker gave up on.
struct AbortNotice {
    channel: Arc<dyn Channel>,
    target: ReplyTarget,
    status: Arc<OnceLock<MessageHandle>>,
}

impl AbortNotice {
    async fn send(self, abort: JobAbort) {
        tracing::warn!(chat_id = %self.target.chat_id, "Job aborted: {}", abort);
        let text = messages::operation_failed(&abort.to_string());
        update_status(self.channel.as_ref(), &self.target, self.status.get(), &text).await;
    }
}

fn join_failure(e: JoinError) -> OperationError {
    if e.is_panic() {
        OperationError::Panicked(panic_message(e.into_panic().as_ref()))
    } else {
        OperationError::Panicked("operation was cancelled".to_string())
    }
}

/// Edit the status line if there is one, otherwise (or if the edit fails)
/// send the text as a new message.
async fn update_status(
    channel: &dyn Channel,
    target: &ReplyTarget,
    status: Option<&MessageHandle>,
    text: &str,
) {
    if let Some(status) = status {
        match channel.edit_message(status, text).await {
            Ok(()) => return,
            Err(e) => tracing::debug!("Status edit failed, sending instead: {}", e),
        }
    }
    if let Err(e) = channel.send_message(target, text).await {
        tracing::warn!(chat_id = %target.chat_id, "Failed to report job status: {}", e);
    }
}

/// Send every output. Attempts all of them; the last failure fails the job.
async fn deliver(
    channel: &dyn Channel,
    target: &ReplyTarget,
    outputs: &[PathBuf],
) -> crate::Result<()> {
    let mut last_error = None;
    for path in outputs {
        if let Err(e) = channel.send_document(target, path, None).await {
            tracing::warn!(
                chat_id = %target.chat_id,
                path = %path.display(),
                "Failed to deliver result: {}",
                e
            );
            last_error = Some(e);
        }
    }
    match last_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Text shown to the user when a request is rejected before any job exists.
fn user_message(error: &DispatchError) -> String {
    match error {
        DispatchError::NoDocument { .. } => messages::UPLOAD_FIRST.to_string(),
        DispatchError::MergeSetTooSmall { count } => messages::merge_too_small(*count),
        DispatchError::InvalidArgument { reason, .. } => messages::invalid_argument(reason),
        DispatchError::NotAPdf { .. } => messages::NOT_A_PDF.to_string(),
        DispatchError::Queue(QueueError::Full { .. }) => messages::QUEUE_BUSY.to_string(),
        DispatchError::Queue(QueueError::Closed) => messages::QUEUE_STOPPED.to_string(),
    }
}

/// Routes incoming messages to upload handling or commands.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<AppContext>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Handle one incoming message.
    ///
    /// Rejected requests are answered with exactly one message. The returned
    /// error only covers transport failures while replying.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> crate::Result<()> {
        let result = match (&msg.attachment, Command::parse(&msg.content)) {
            (Some(attachment), _) => self.handle_upload(msg, attachment).await,
            (None, Some(command)) => self.handle_command(msg, command).await,
            (None, None) => {
                tracing::debug!(user_id = %msg.user_id, "Ignoring non-command message");
                return Ok(());
            }
        };

        match result {
            Err(Error::Dispatch(e)) => {
                tracing::info!(user_id = %msg.user_id, "Rejected request: {}", e);
                self.reply(msg, &user_message(&e)).await
            }
            other => other,
        }
    }

    async fn reply(&self, msg: &IncomingMessage, text: &str) -> crate::Result<()> {
        self.ctx
            .channel
            .send_message(&msg.reply_target(), text)
            .await?;
        Ok(())
    }

    async fn require_document(&self, session: &SessionId) -> Result<DocumentRef, DispatchError> {
        self.ctx
            .store
            .current(session)
            .await
            .ok_or_else(|| DispatchError::NoDocument {
                session: session.to_string(),
            })
    }

    async fn page_count(&self, document: &DocumentRef) -> Option<u32> {
        let operations = Arc::clone(&self.ctx.operations);
        let path = document.path().to_path_buf();
        tokio::task::spawn_blocking(move || operations.page_count(&path))
            .await
            .ok()
            .flatten()
    }

    async fn handle_upload(&self, msg: &IncomingMessage, attachment: &Attachment) -> crate::Result<()> {
        if !naming::is_pdf_name(&attachment.file_name) {
            return Err(DispatchError::NotAPdf {
                file_name: attachment.file_name.clone(),
            }
            .into());
        }

        let path = naming::upload_path(
            &self.ctx.settings.work_dir,
            &msg.user_id,
            Utc::now().timestamp(),
            &attachment.file_name,
        );
        self.reply(msg, messages::DOWNLOADING).await?;

        let bytes = match self.ctx.channel.download(attachment, &path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    user_id = %msg.user_id,
                    file_id = %attachment.file_id,
                    "Download failed: {}",
                    e
                );
                if let Err(remove) = tokio::fs::remove_file(&path).await {
                    if remove.kind() != std::io::ErrorKind::NotFound {
                        tracing::debug!(path = %path.display(), "Could not remove partial download: {}", remove);
                    }
                }
                return self.reply(msg, &messages::download_failed(&e.to_string())).await;
            }
        };

        let document = DocumentRef::new(path);
        self.ctx
            .store
            .record_upload(&msg.session_id(), document.clone())
            .await;
        let pages = self.page_count(&document).await;

        tracing::info!(
            user_id = %msg.user_id,
            document = %document,
            bytes,
            pages = ?pages,
            "Stored upload"
        );
        self.reply(
            msg,
            &messages::upload_receipt(pages, bytes, &document.display_name()),
        )
        .await
    }

    async fn handle_command(&self, msg: &IncomingMessage, command: Command) -> crate::Result<()> {
        tracing::info!(user_id = %msg.user_id, command = command.name(), "Handling command");
        let session = msg.session_id();

        match command {
            Command::Start | Command::Help => self.reply(msg, messages::HELP).await,
            Command::Watermarks => {
                let text = messages::watermarks(&self.ctx.settings.watermark_keywords);
                self.reply(msg, &text).await
            }
            Command::Status => self.status(msg).await,
            Command::Reset => {
                let text = if self.ctx.store.clear(&session).await {
                    tracing::info!(session = %session, "Cleared session");
                    messages::RESET_DONE
                } else {
                    messages::NOTHING_TO_RESET
                };
                self.reply(msg, text).await
            }
            Command::Unknown { command } => {
                self.reply(msg, &messages::unknown_command(&command)).await
            }
            Command::Merge => {
                let document = self.require_document(&session).await?;
                let count = self.ctx.store.add_to_merge_set(&session, document).await;
                self.reply(msg, &messages::merge_added(count)).await
            }
            Command::Done => self.merge(msg).await,
            Command::Clean => {
                let input = self.require_document(&session).await?.path().to_path_buf();
                let output = naming::clean_path(&input);
                let keywords = self.ctx.settings.watermark_keywords.clone();
                self.enqueue_transform(
                    msg,
                    "clean",
                    CLEAN,
                    operation(move |ops| {
                        ops.remove_watermark(&input, &output, &keywords)
                            .map(|()| vec![output])
                    }),
                )
            }
            Command::Compress => {
                let input = self.require_document(&session).await?.path().to_path_buf();
                let output = naming::compressed_path(&input);
                self.enqueue_transform(
                    msg,
                    "compress",
                    COMPRESS,
                    operation(move |ops| ops.compress(&input, &output).map(|()| vec![output])),
                )
            }
            Command::Split => {
                let input = self.require_document(&session).await?.path().to_path_buf();
                let out_dir = naming::pages_dir(&input);
                self.enqueue_transform(
                    msg,
                    "split",
                    SPLIT,
                    operation(move |ops| ops.split(&input, &out_dir)),
                )
            }
            Command::Rotate { angle } => {
                let input = self.require_document(&session).await?.path().to_path_buf();
                let rotation = parse_rotation(angle.as_deref())?;
                let output = naming::rotated_path(&input, rotation);
                self.enqueue_transform(
                    msg,
                    "rotate",
                    ROTATE,
                    operation(move |ops| {
                        ops.rotate(&input, &output, rotation).map(|()| vec![output])
                    }),
                )
            }
            Command::Extract { dpi } => {
                let input = self.require_document(&session).await?.path().to_path_buf();
                let dpi = parse_dpi(dpi.as_deref())?;
                let out_dir = naming::images_dir(&input, dpi);
                self.enqueue_transform(
                    msg,
                    "extract",
                    EXTRACT,
                    operation(move |ops| ops.extract_images(&input, &out_dir, dpi)),
                )
            }
        }
    }

    /// `/done`: merge the session's merge set into one document.
    async fn merge(&self, msg: &IncomingMessage) -> crate::Result<()> {
        let session = msg.session_id();
        let documents = self.ctx.store.take_merge_set(&session).await;
        if documents.len() < 2 {
            let count = documents.len();
            self.ctx.store.restore_merge_set(&session, documents).await;
            return Err(DispatchError::MergeSetTooSmall { count }.into());
        }

        let inputs: Vec<PathBuf> = documents.iter().map(|d| d.path().to_path_buf()).collect();
        let output = naming::merged_path(
            &self.ctx.settings.work_dir,
            &msg.user_id,
            Utc::now().timestamp(),
        );
        let queued = self.enqueue_transform(
            msg,
            "merge",
            MERGE,
            operation(move |ops| ops.merge(&inputs, &output).map(|()| vec![output])),
        );

        if queued.is_err() {
            self.ctx.store.restore_merge_set(&session, documents).await;
        }
        queued
    }

    async fn status(&self, msg: &IncomingMessage) -> crate::Result<()> {
        let session = msg.session_id();
        let details = match self.ctx.store.current(&session).await {
            Some(document) => {
                let pages = self.page_count(&document).await;
                let bytes = tokio::fs::metadata(document.path())
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                Some((document.display_name(), pages, bytes))
            }
            None => None,
        };

        let summary = self.ctx.queue.tracker().summary();
        let text = messages::status(&StatusReport {
            document: details
                .as_ref()
                .map(|(name, pages, bytes)| (name.as_str(), *pages, *bytes)),
            merge_set: self.ctx.store.merge_set_len(&session).await,
            queue: &summary,
            pending: self.ctx.queue.pending(),
        });
        self.reply(msg, &text).await
    }

    fn enqueue_transform(
        &self,
        msg: &IncomingMessage,
        label: &'static str,
        plan: Plan,
        run: Operation,
    ) -> crate::Result<()> {
        let status = Arc::new(OnceLock::new());
        let notice = AbortNotice {
            channel: Arc::clone(&self.ctx.channel),
            target: msg.reply_target(),
            status: Arc::clone(&status),
        };
        let job = TransformJob {
            channel: Arc::clone(&self.ctx.channel),
            operations: Arc::clone(&self.ctx.operations),
            target: msg.reply_target(),
            progress: self.ctx.settings.progress,
            plan,
            run,
            status,
        };

        let job = Job::new(label, msg.session_id(), move || job.run())
            .on_abort(move |abort| notice.send(abort));
        let job_id = self.ctx.queue.enqueue(job).map_err(DispatchError::from)?;
        tracing::info!(
            job_id = %job_id,
            user_id = %msg.user_id,
            command = label,
            pending = self.ctx.queue.pending(),
            "Queued job"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::config::QueueConfig;
    use crate::pdf::{LopdfOperations, Rotation, fixtures};
    use crate::queue::{JobQueue, Worker};
    use crate::testing::{FakeOperations, OperationCall, RecordingChannel, wait_for_finished};

    struct Harness {
        dispatcher: Dispatcher,
        ctx: Arc<AppContext>,
        channel: Arc<RecordingChannel>,
        worker: Option<Worker>,
        dir: TempDir,
    }

    impl Harness {
        fn new(channel: RecordingChannel, operations: Arc<dyn PdfOperations>) -> Self {
            Self::with_timeout(channel, operations, Duration::from_secs(10))
        }

        fn with_timeout(
            channel: RecordingChannel,
            operations: Arc<dyn PdfOperations>,
            job_timeout: Duration,
        ) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let channel = Arc::new(channel);
            let (queue, worker) = JobQueue::new(QueueConfig {
                job_timeout: Some(job_timeout),
                max_pending: None,
            });
            let settings = DispatchSettings {
                work_dir: dir.path().to_path_buf(),
                watermark_keywords: vec!["CONFIDENTIAL".to_string()],
                progress: ProgressConfig {
                    total_steps: 2,
                    step_interval: Duration::ZERO,
                },
            };
            let ctx = Arc::new(AppContext::new(
                channel.clone(),
                operations,
                queue,
                settings,
            ));
            Self {
                dispatcher: Dispatcher::new(Arc::clone(&ctx)),
                ctx,
                channel,
                worker: Some(worker),
                dir,
            }
        }

        fn start_worker(&mut self) {
            if let Some(worker) = self.worker.take() {
                worker.spawn();
            }
        }

        async fn send(&self, text: &str) {
            let msg = IncomingMessage::new("recording", "42", "42", text);
            self.dispatcher.handle_message(&msg).await.unwrap();
        }

        async fn upload(&self, file_id: &str, file_name: &str) {
            let msg = IncomingMessage::new("recording", "42", "42", "").with_attachment(
                Attachment {
                    file_id: file_id.to_string(),
                    file_name: file_name.to_string(),
                    mime_type: Some("application/pdf".to_string()),
                    file_size: None,
                },
            );
            self.dispatcher.handle_message(&msg).await.unwrap();
        }

        /// Register an existing file as the user's current document.
        async fn set_current(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, b"%PDF-1.5").unwrap();
            self.ctx
                .store
                .record_upload(&SessionId::from("42"), DocumentRef::new(path.clone()))
                .await;
            path
        }
    }

    fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
        let mut doc = fixtures::text_pdf(pages);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[tokio::test]
    async fn test_commands_without_document_never_enqueue() {
        let harness = Harness::new(RecordingChannel::new(), Arc::new(FakeOperations::new(1)));

        for (i, command) in ["/clean", "/compress", "/split", "/rotate", "/extract 300", "/merge"]
            .into_iter()
            .enumerate()
        {
            harness.send(command).await;

            assert_eq!(harness.ctx.queue.pending(), 0, "{command} enqueued a job");
            assert_eq!(harness.channel.sent_texts().len(), i + 1);
            assert_eq!(
                harness.channel.last_text().as_deref(),
                Some(messages::UPLOAD_FIRST)
            );
        }
        assert_eq!(harness.ctx.queue.tracker().summary().total, 0);
    }

    #[tokio::test]
    async fn test_done_merges_in_addition_order() {
        let operations = Arc::new(FakeOperations::new(1));
        let mut harness = Harness::new(RecordingChannel::new(), operations.clone());

        let mut expected = Vec::new();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            expected.push(harness.set_current(name).await);
            harness.send("/merge").await;
        }
        assert_eq!(
            harness.channel.last_text().as_deref(),
            Some("Added to merge queue (3 PDFs). Send /done when ready.")
        );

        harness.send("/done").await;
        assert_eq!(harness.ctx.queue.pending(), 1);
        assert_eq!(harness.ctx.store.merge_set_len(&"42".into()).await, 0);

        harness.start_worker();
        wait_for_finished(harness.ctx.queue.tracker(), 1).await;

        let calls = operations.calls();
        assert_eq!(calls.len(), 1);
        let OperationCall::Merge { inputs, output } = &calls[0] else {
            panic!("expected a merge call, got {calls:?}");
        };
        assert_eq!(inputs, &expected);
        assert!(output.to_string_lossy().ends_with("_merged.pdf"));
        assert_eq!(harness.channel.documents(), vec![output.clone()]);
        assert_eq!(harness.ctx.queue.tracker().summary().completed, 1);
    }

    #[tokio::test]
    async fn test_done_with_one_document_keeps_it_queued() {
        let harness = Harness::new(RecordingChannel::new(), Arc::new(FakeOperations::new(1)));
        harness.set_current("only.pdf").await;
        harness.send("/merge").await;

        harness.send("/done").await;

        assert_eq!(harness.ctx.queue.pending(), 0);
        assert_eq!(harness.ctx.store.merge_set_len(&"42".into()).await, 1);
        assert_eq!(
            harness.channel.last_text().as_deref(),
            Some(messages::merge_too_small(1).as_str())
        );
    }

    #[tokio::test]
    async fn test_transform_outputs_follow_naming() {
        let operations = Arc::new(FakeOperations::new(2));
        let mut harness = Harness::new(RecordingChannel::new(), operations.clone());
        let input = harness.set_current("42_1_report.pdf").await;
        let dir = harness.dir.path().to_path_buf();

        harness.send("/clean").await;
        harness.send("/rotate 180").await;
        harness.send("/extract").await;
        harness.start_worker();
        wait_for_finished(harness.ctx.queue.tracker(), 3).await;

        assert_eq!(
            operations.calls(),
            vec![
                OperationCall::RemoveWatermark {
                    input: input.clone(),
                    output: dir.join("42_1_report_clean.pdf"),
                    keywords: vec!["CONFIDENTIAL".to_string()],
                },
                OperationCall::Rotate {
                    input: input.clone(),
                    output: dir.join("42_1_report_rotated_180.pdf"),
                    rotation: Rotation::Deg180,
                },
                OperationCall::ExtractImages {
                    input,
                    out_dir: dir.join("42_1_report_images_150dpi"),
                    dpi: 150,
                },
            ]
        );
        assert_eq!(harness.channel.documents().len(), 1 + 1 + 2);
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_rejected() {
        let harness = Harness::new(RecordingChannel::new(), Arc::new(FakeOperations::new(1)));
        harness.set_current("a.pdf").await;

        harness.send("/rotate 45").await;
        harness.send("/extract 5000").await;

        assert_eq!(harness.ctx.queue.pending(), 0);
        let texts = harness.channel.sent_texts();
        assert_eq!(texts.len(), 2);
        assert!(texts.iter().all(|t| t.starts_with("Invalid argument:")));
    }

    #[tokio::test]
    async fn test_operation_failure_is_reported() {
        let operations = Arc::new(FakeOperations::new(1).failing("broken xref"));
        let mut harness = Harness::new(RecordingChannel::new(), operations);
        harness.set_current("a.pdf").await;

        harness.send("/compress").await;
        harness.start_worker();
        wait_for_finished(harness.ctx.queue.tracker(), 1).await;

        assert_eq!(harness.ctx.queue.tracker().summary().failed, 1);
        assert_eq!(
            harness.channel.last_text().as_deref(),
            Some("Operation failed: Malformed PDF structure: broken xref")
        );
        assert!(harness.channel.documents().is_empty());
    }

    #[tokio::test]
    async fn test_failed_status_send_still_delivers() {
        let operations = Arc::new(FakeOperations::new(1));
        let mut harness = Harness::new(
            RecordingChannel::new().failing_sends(),
            operations.clone(),
        );
        let input = harness.set_current("a.pdf").await;

        harness.send("/compress").await;
        harness.start_worker();
        wait_for_finished(harness.ctx.queue.tracker(), 1).await;

        let output = naming::compressed_path(&input);
        assert_eq!(
            operations.calls(),
            vec![OperationCall::Compress {
                input,
                output: output.clone(),
            }]
        );
        assert_eq!(harness.channel.documents(), vec![output]);
        assert_eq!(harness.ctx.queue.tracker().summary().completed, 1);
    }

    #[tokio::test]
    async fn test_timed_out_job_tells_the_user() {
        let operations = Arc::new(FakeOperations::new(1).slow(Duration::from_millis(500)));
        let mut harness = Harness::with_timeout(
            RecordingChannel::new(),
            operations,
            Duration::from_millis(100),
        );
        harness.set_current("a.pdf").await;

        harness.send("/clean").await;
        harness.start_worker();
        wait_for_finished(harness.ctx.queue.tracker(), 1).await;

        assert_eq!(harness.ctx.queue.tracker().summary().failed, 1);
        assert_eq!(
            harness.channel.last_text().as_deref(),
            Some("Operation failed: timed out after 100ms")
        );
        assert!(harness.channel.documents().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_operation_tells_the_user() {
        let operations = Arc::new(FakeOperations::new(1).panicking("index out of range"));
        let mut harness = Harness::new(RecordingChannel::new(), operations);
        harness.set_current("a.pdf").await;

        harness.send("/rotate 90").await;
        harness.send("/split").await;
        harness.start_worker();
        wait_for_finished(harness.ctx.queue.tracker(), 2).await;

        let summary = harness.ctx.queue.tracker().summary();
        assert_eq!(summary.failed, 2);
        assert_eq!(
            harness.channel.last_text().as_deref(),
            Some("Operation failed: Operation aborted unexpectedly: index out of range")
        );
        assert!(harness.channel.documents().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_fails_job() {
        let mut harness = Harness::new(
            RecordingChannel::new().failing_documents(),
            Arc::new(FakeOperations::new(3)),
        );
        harness.set_current("a.pdf").await;

        harness.send("/split").await;
        harness.start_worker();
        wait_for_finished(harness.ctx.queue.tracker(), 1).await;

        let summary = harness.ctx.queue.tracker().summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(
            harness.channel.last_text().as_deref(),
            Some("✔ Split! Sending 3 files...")
        );
    }

    #[tokio::test]
    async fn test_reset_forgets_document_and_merge_set() {
        let harness = Harness::new(RecordingChannel::new(), Arc::new(FakeOperations::new(1)));
        harness.set_current("a.pdf").await;
        harness.send("/merge").await;

        harness.send("/reset").await;
        assert_eq!(harness.channel.last_text().as_deref(), Some(messages::RESET_DONE));
        assert!(harness.ctx.store.current(&"42".into()).await.is_none());
        assert_eq!(harness.ctx.store.merge_set_len(&"42".into()).await, 0);

        harness.send("/compress").await;
        assert_eq!(harness.channel.last_text().as_deref(), Some(messages::UPLOAD_FIRST));

        harness.send("/reset").await;
        assert_eq!(
            harness.channel.last_text().as_deref(),
            Some(messages::NOTHING_TO_RESET)
        );
        assert_eq!(harness.ctx.store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_non_pdf_upload_is_rejected() {
        let harness = Harness::new(RecordingChannel::new(), Arc::new(FakeOperations::new(1)));

        harness.upload("file-1", "notes.docx").await;

        assert_eq!(harness.channel.sent_texts(), vec![messages::NOT_A_PDF.to_string()]);
        assert!(harness.ctx.store.current(&"42".into()).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_store_unchanged() {
        let harness = Harness::new(RecordingChannel::new(), Arc::new(FakeOperations::new(1)));

        harness.upload("missing", "report.pdf").await;

        let texts = harness.channel.sent_texts();
        assert_eq!(texts[0], messages::DOWNLOADING);
        assert!(texts[1].starts_with("Could not download your file:"));
        assert!(harness.ctx.store.current(&"42".into()).await.is_none());
    }

    #[tokio::test]
    async fn test_status_and_watermarks() {
        let harness = Harness::new(RecordingChannel::new(), Arc::new(FakeOperations::new(4)));
        harness.set_current("a.pdf").await;

        harness.send("/status").await;
        let status = harness.channel.last_text().unwrap();
        assert!(status.contains("Last PDF: a.pdf"));
        assert!(status.contains("Pages: 4"));

        harness.send("/watermarks").await;
        assert_eq!(
            harness.channel.last_text().as_deref(),
            Some("Watermark keywords: CONFIDENTIAL")
        );

        harness.send("/nope").await;
        assert!(harness.channel.last_text().unwrap().starts_with("Unknown command /nope"));

        harness.send("just chatting").await;
        assert_eq!(harness.channel.sent_texts().len(), 3);
    }

    #[tokio::test]
    async fn test_upload_then_split_end_to_end() {
        let channel = RecordingChannel::new().with_file("file-1", pdf_bytes(&["one", "two", "three"]));
        let mut harness = Harness::new(channel, Arc::new(LopdfOperations::new()));

        harness.upload("file-1", "report.pdf").await;

        let current = harness.ctx.store.current(&"42".into()).await.unwrap();
        let stored = current.display_name();
        assert!(stored.starts_with("42_"));
        assert!(stored.ends_with("_report.pdf"));
        assert_eq!(
            LopdfOperations::new().page_count(current.path()),
            Some(3)
        );
        let receipt = harness.channel.last_text().unwrap();
        assert!(receipt.contains("Pages: 3"), "{receipt}");
        assert!(receipt.contains(&format!("Saved as: {stored}")));

        harness.send("/split").await;
        harness.start_worker();
        wait_for_finished(harness.ctx.queue.tracker(), 1).await;

        let pages_dir = naming::pages_dir(current.path());
        assert_eq!(
            harness.channel.documents(),
            vec![
                pages_dir.join("page_1.pdf"),
                pages_dir.join("page_2.pdf"),
                pages_dir.join("page_3.pdf"),
            ]
        );
        assert_eq!(harness.ctx.queue.tracker().summary().completed, 1);
        for page in harness.channel.documents() {
            assert!(Path::new(&page).exists());
        }
    }
}
