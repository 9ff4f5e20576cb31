//! Decorative progress bar rendered into a live status message.
//!
//! The animation is not tied to real work: a job runs a fixed number of
//! steps against its status message, then starts the operation.

use std::time::Duration;

use crate::channels::{Channel, MessageHandle};

/// Width of the rendered bar in characters.
pub const BAR_WIDTH: u32 = 20;

const FILLED: char = '█';
const EMPTY: char = '-';

/// One bounded run of progress updates.
#[derive(Debug, Clone)]
pub struct ProgressSession {
    label: String,
    total_steps: u32,
    current_step: u32,
}

impl ProgressSession {
    pub fn new(label: impl Into<String>, total_steps: u32) -> Self {
        Self {
            label: label.into(),
            total_steps,
            current_step: 0,
        }
    }

    /// Move one step forward. Returns `false` once all steps are used.
    pub fn advance(&mut self) -> bool {
        if self.current_step >= self.total_steps {
            return false;
        }
        self.current_step += 1;
        true
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn is_finished(&self) -> bool {
        self.current_step >= self.total_steps
    }

    /// Percentage shown for the current step, rounded down.
    pub fn percent(&self) -> u32 {
        if self.total_steps == 0 {
            return 0;
        }
        (u64::from(self.current_step) * 100 / u64::from(self.total_steps)) as u32
    }

    /// `"{label}: [{bar}] {percent}%"`
    pub fn render(&self) -> String {
        format!(
            "{}: [{}] {}%",
            self.label,
            render_bar(self.current_step, self.total_steps),
            self.percent()
        )
    }
}

/// Bar of `BAR_WIDTH` characters with `floor(BAR_WIDTH * step / total)` filled.
pub fn render_bar(step: u32, total: u32) -> String {
    let filled = if total == 0 {
        0
    } else {
        (u64::from(step.min(total)) * u64::from(BAR_WIDTH) / u64::from(total)) as u32
    };

    let mut bar = String::with_capacity(BAR_WIDTH as usize * FILLED.len_utf8());
    bar.extend(std::iter::repeat_n(FILLED, filled as usize));
    bar.extend(std::iter::repeat_n(EMPTY, (BAR_WIDTH - filled) as usize));
    bar
}

/// Animate `total_steps` updates on `status`, pausing `interval` after each.
///
/// Edit failures are logged and ignored; progress never fails a job.
pub async fn run_progress(
    channel: &dyn Channel,
    status: &MessageHandle,
    total_steps: u32,
    label: &str,
    interval: Duration,
) {
    let mut progress = ProgressSession::new(label, total_steps);
    while progress.advance() {
        if let Err(e) = channel.edit_message(status, &progress.render()).await {
            tracing::debug!(step = progress.current_step(), "Progress update failed: {}", e);
        }
        tokio::time::sleep(interval).await;
    }
}
