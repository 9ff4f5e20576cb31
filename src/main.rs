use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pdfdesk::app::{App, AppContext};
use pdfdesk::channels::{Channel, TelegramChannel};
use pdfdesk::config::Config;
use pdfdesk::dispatch::DispatchSettings;
use pdfdesk::pdf::LopdfOperations;
use pdfdesk::queue::JobQueue;

/// How long queued jobs may keep running after the bot stops receiving messages.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "pdfdesk", version, about = "Chat-driven PDF utility bot")]
struct Cli {
    /// Directory for uploads and outputs (overrides WORK_DIR).
    #[arg(long, env = "WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "pdfdesk=info".into());
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = Config::from_env()?;
    if let Some(work_dir) = cli.work_dir {
        config.work_dir = work_dir;
    }
    config.ensure_work_dir()?;
    tracing::info!(
        work_dir = %config.work_dir.display(),
        keywords = config.watermark_keywords.len(),
        job_timeout = ?config.queue.job_timeout,
        max_pending = ?config.queue.max_pending,
        "Configuration loaded"
    );

    let channel = Arc::new(TelegramChannel::new(&config.telegram));
    if let Err(e) = channel.health_check().await {
        tracing::warn!("Telegram health check failed: {}", e);
    }

    let (queue, worker) = JobQueue::new(config.queue);
    let worker = worker.spawn();

    let mut operations = LopdfOperations::new();
    if let Some(path) = &config.pdfium_library {
        operations = operations.with_pdfium_library(path);
    }

    let app = App::new(AppContext::new(
        channel,
        Arc::new(operations),
        queue,
        DispatchSettings::from_config(&config),
    ));
    app.run().await?;

    // Dropping the app releases the last queue handle, so the worker exits
    // once the remaining jobs are done.
    drop(app);
    match tokio::time::timeout(SHUTDOWN_GRACE, worker).await {
        Ok(Ok(())) => tracing::info!("Job worker finished"),
        Ok(Err(e)) => tracing::error!("Job worker panicked: {}", e),
        Err(_) => tracing::warn!(grace = ?SHUTDOWN_GRACE, "Gave up waiting for queued jobs"),
    }

    Ok(())
}
