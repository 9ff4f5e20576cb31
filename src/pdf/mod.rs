//! PDF operation library.
//!
//! Every operation is a stateless, synchronous transformation from input
//! file(s) to output file(s). Jobs call them from `spawn_blocking`, so
//! implementations are free to do heavy CPU work and blocking I/O.

mod compress;
mod document;
mod error;
mod images;
mod pages;
mod render;
mod watermark;

#[cfg(test)]
pub(crate) mod fixtures;

use std::fmt;
use std::path::{Path, PathBuf};

pub use error::OperationError;

/// Page rotation accepted by `/rotate`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalise an angle in degrees. Only non-zero multiples of 90 are
    /// accepted; negative angles rotate counter-clockwise.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

/// The transformations the bot can run on a document.
pub trait PdfOperations: Send + Sync {
    /// Strip text matching any keyword (case-insensitive) and all images.
    fn remove_watermark(
        &self,
        input: &Path,
        output: &Path,
        keywords: &[String],
    ) -> Result<(), OperationError>;

    /// Rewrite the document with unused objects removed and streams compressed.
    fn compress(&self, input: &Path, output: &Path) -> Result<(), OperationError>;

    /// Write one `page_{n}.pdf` per page into `out_dir`. Paths are in page order.
    fn split(&self, input: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, OperationError>;

    /// Concatenate `inputs` in order into a single document.
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), OperationError>;

    fn rotate(&self, input: &Path, output: &Path, rotation: Rotation)
    -> Result<(), OperationError>;

    /// Write one `page_{n}.png` per page at `dpi`. Paths are in page order.
    ///
    /// Without a page renderer only pages carrying an embedded image are
    /// written, so the result may be shorter than the page count or empty.
    fn extract_images(
        &self,
        input: &Path,
        out_dir: &Path,
        dpi: u32,
    ) -> Result<Vec<PathBuf>, OperationError>;

    /// Number of pages, or `None` if the file cannot be parsed.
    fn page_count(&self, input: &Path) -> Option<u32>;
}

/// `PdfOperations` backed by lopdf and the image crate, with PDFium for
/// page rendering when it can be bound.
#[derive(Debug, Default, Clone)]
pub struct LopdfOperations {
    pdfium_library: Option<PathBuf>,
}

impl LopdfOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind PDFium from this file instead of searching for it.
    pub fn with_pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.pdfium_library = Some(path.into());
        self
    }
}

impl PdfOperations for LopdfOperations {
    fn remove_watermark(
        &self,
        input: &Path,
        output: &Path,
        keywords: &[String],
    ) -> Result<(), OperationError> {
        watermark::remove_watermark(input, output, keywords)
    }

    fn compress(&self, input: &Path, output: &Path) -> Result<(), OperationError> {
        compress::compress(input, output)
    }

    fn split(&self, input: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, OperationError> {
        pages::split(input, out_dir)
    }

    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), OperationError> {
        pages::merge(inputs, output)
    }

    fn rotate(
        &self,
        input: &Path,
        output: &Path,
        rotation: Rotation,
    ) -> Result<(), OperationError> {
        pages::rotate(input, output, rotation)
    }

    fn extract_images(
        &self,
        input: &Path,
        out_dir: &Path,
        dpi: u32,
    ) -> Result<Vec<PathBuf>, OperationError> {
        match render::load_pdfium(self.pdfium_library.as_deref()) {
            Ok(pdfium) => render::render_pages(&pdfium, input, out_dir, dpi),
            Err(e) => {
                tracing::warn!("Extracting embedded images instead of rendering pages: {}", e);
                images::extract_images(input, out_dir, dpi)
            }
        }
    }

    fn page_count(&self, input: &Path) -> Option<u32> {
        document::page_count(input)
    }
}
