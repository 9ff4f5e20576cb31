//! User-facing texts.

use crate::queue::QueueSummary;

pub const UPLOAD_FIRST: &str = "Please upload a PDF first.";
pub const NOT_A_PDF: &str = "Please upload a PDF file.";
pub const DOWNLOADING: &str = "Downloading your PDF...";
pub const QUEUE_BUSY: &str = "The job queue is full right now, please try again in a moment.";
pub const QUEUE_STOPPED: &str = "The worker is not running, please try again later.";
pub const NO_IMAGES: &str = "No embedded images found in this PDF.";
pub const NOTHING_TO_SEND: &str = "Done, but there was nothing to send.";
pub const RESET_DONE: &str = "Forgot your PDF and merge queue.";
pub const NOTHING_TO_RESET: &str = "There was nothing to forget.";

pub const HELP: &str = "Hi! PDF Utility Bot ready.\n\
Send me a PDF, then use a command:\n\
/clean - Remove watermark\n\
/compress - Compress PDF\n\
/split - Split into pages\n\
/merge - Add PDF to merge queue\n\
/done - Merge queued PDFs\n\
/rotate [90|180|270] - Rotate pages\n\
/extract [dpi] - Extract page images\n\
/status - Last PDF info\n\
/watermarks - Show keywords\n\
/reset - Forget your PDF and merge queue";

/// Format a byte count as `"{:.1} {unit}"` with 1024-based units.
pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    for unit in &UNITS[..UNITS.len() - 1] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} {}", UNITS[UNITS.len() - 1])
}

fn pages_text(pages: Option<u32>) -> String {
    pages.map_or_else(|| "unknown".to_string(), |n| n.to_string())
}

pub fn upload_receipt(pages: Option<u32>, bytes: u64, saved_as: &str) -> String {
    format!(
        "📄 PDF received!\n📝 Pages: {}\n💾 Size: {}\nSaved as: {}",
        pages_text(pages),
        human_readable_size(bytes),
        saved_as
    )
}

pub fn download_failed(reason: &str) -> String {
    format!("Could not download your file: {reason}")
}

pub fn finished(done: &str) -> String {
    format!("✔ {done}! Sending file...")
}

pub fn finished_many(done: &str, count: usize) -> String {
    format!("✔ {done}! Sending {count} files...")
}

pub fn operation_failed(reason: &str) -> String {
    format!("Operation failed: {reason}")
}

pub fn merge_added(count: usize) -> String {
    let noun = if count == 1 { "PDF" } else { "PDFs" };
    format!("Added to merge queue ({count} {noun}). Send /done when ready.")
}

pub fn merge_too_small(count: usize) -> String {
    match count {
        0 => "Merge queue is empty. Use /merge to add PDFs first.".to_string(),
        _ => format!("Merge needs at least two PDFs, you have {count}. Use /merge to add more."),
    }
}

pub fn invalid_argument(reason: &str) -> String {
    format!("Invalid argument: {reason}")
}

pub fn unknown_command(command: &str) -> String {
    format!("Unknown command /{command}. Send /help for the list of commands.")
}

pub fn watermarks(keywords: &[String]) -> String {
    if keywords.is_empty() {
        "No watermark keywords configured. /clean will only remove images.".to_string()
    } else {
        format!("Watermark keywords: {}", keywords.join(", "))
    }
}

/// Current document details for `/status`.
pub struct StatusReport<'a> {
    pub document: Option<(&'a str, Option<u32>, u64)>,
    pub merge_set: usize,
    pub queue: &'a QueueSummary,
    pub pending: usize,
}

pub fn status(report: &StatusReport<'_>) -> String {
    let document = match report.document {
        Some((name, pages, bytes)) => format!(
            "📄 Last PDF: {}\n📝 Pages: {}\n💾 Size: {}",
            name,
            pages_text(pages),
            human_readable_size(bytes)
        ),
        None => "No PDF uploaded yet.".to_string(),
    };
    format!(
        "{}\n🧩 Merge queue: {}\n⏳ Jobs waiting: {} (running: {}, done: {}, failed: {})",
        document,
        report.merge_set,
        report.pending,
        report.queue.running,
        report.queue.completed,
        report.queue.failed
    )
}
