//! Application wiring and the control-plane loop.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;

use crate::channels::Channel;
use crate::dispatch::{DispatchSettings, Dispatcher};
use crate::pdf::PdfOperations;
use crate::queue::JobQueue;
use crate::session::DocumentStore;

/// Shared state handed to the dispatcher and captured by jobs.
pub struct AppContext {
    pub store: DocumentStore,
    pub queue: JobQueue,
    pub operations: Arc<dyn PdfOperations>,
    pub channel: Arc<dyn Channel>,
    pub settings: DispatchSettings,
}

impl AppContext {
    pub fn new(
        channel: Arc<dyn Channel>,
        operations: Arc<dyn PdfOperations>,
        queue: JobQueue,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store: DocumentStore::new(),
            queue,
            operations,
            channel,
            settings,
        }
    }
}

/// Receives messages and hands each one to the dispatcher.
///
/// Handlers run concurrently with each other; only jobs are serialized.
pub struct App {
    ctx: Arc<AppContext>,
}

impl App {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// Run until the channel stream ends or Ctrl+C is received.
    pub async fn run(&self) -> crate::Result<()> {
        let channel = Arc::clone(&self.ctx.channel);
        let mut stream = channel.start().await?;
        let dispatcher = Dispatcher::new(Arc::clone(&self.ctx));
        let mut tasks = JoinSet::new();

        tracing::info!(channel = channel.name(), "Listening for messages");

        loop {
            tokio::select! {
                next = stream.next() => {
                    let Some(msg) = next else {
                        tracing::info!("Message stream ended");
                        break;
                    };
                    let dispatcher = dispatcher.clone();
                    tasks.spawn(async move {
                        if let Err(e) = dispatcher.handle_message(&msg).await {
                            tracing::error!(user_id = %msg.user_id, "Failed to handle message: {}", e);
                        }
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Message handler panicked: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Message handler panicked: {}", e);
            }
        }

        tracing::info!(
            sessions = self.ctx.store.session_count().await,
            jobs = ?self.ctx.queue.tracker().summary(),
            "Message handling stopped"
        );
        channel.shutdown().await?;
        Ok(())
    }
}
