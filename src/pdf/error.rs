//! Operation library errors.

/// Failure of a single PDF transformation.
///
/// Callers only distinguish success from failure; the variants exist for
/// logs and user-facing messages.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("Failed to load {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("Failed to save {path}: {reason}")]
    Save { path: String, reason: String },

    #[error("Malformed PDF structure: {0}")]
    Structure(String),

    #[error("Document has no pages")]
    NoPages,

    #[error("Merge needs at least one input document")]
    EmptyMerge,

    #[error("Invalid watermark keywords: {0}")]
    Keywords(String),

    #[error("Page rendering failed: {0}")]
    Render(String),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error("Operation aborted unexpectedly: {0}")]
    Panicked(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
