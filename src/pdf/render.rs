//! Full-page rasterisation through PDFium.
//!
//! PDFium is bound at runtime, so a missing library is an ordinary error and
//! callers can fall back to embedded-image extraction. `Pdfium` is loaded per
//! call; the OS caches the `dlopen`.

use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};
use pdfium_render::prelude::*;

use crate::pdf::OperationError;
use crate::pdf::images::target_dimensions;

/// Bind PDFium.
///
/// Discovery order: `explicit` (when set, nothing else is tried), next to the
/// running executable, then the system library search path.
pub(crate) fn load_pdfium(explicit: Option<&Path>) -> Result<Pdfium, OperationError> {
    if let Some(path) = explicit {
        let path = path.to_string_lossy().to_string();
        tracing::debug!(path = %path, "Loading PDFium from configured path");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            OperationError::Render(format!("failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_string_lossy().to_string()))
    {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(&exe_dir);
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            tracing::debug!(dir = %exe_dir, "Loaded PDFium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        OperationError::Render(format!(
            "PDFium library not found, set PDFIUM_DYNAMIC_LIB_PATH or install it: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Render every page to `out_dir/page_{n}.png` at `dpi`. Paths are in page order.
pub(crate) fn render_pages(
    pdfium: &Pdfium,
    input: &Path,
    out_dir: &Path,
    dpi: u32,
) -> Result<Vec<PathBuf>, OperationError> {
    let input_str = input.to_string_lossy().to_string();
    let document = pdfium
        .load_pdf_from_file(&input_str, None)
        .map_err(|e| OperationError::Load {
            path: input_str.clone(),
            reason: e.to_string(),
        })?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(OperationError::NoPages);
    }
    std::fs::create_dir_all(out_dir)?;

    let mut outputs = Vec::with_capacity(pages.len() as usize);
    for (index, page) in pages.iter().enumerate() {
        let number = index + 1;
        let (width, height) = target_dimensions(
            f64::from(page.width().value),
            f64::from(page.height().value),
            dpi,
        );

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(height as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| OperationError::Render(format!("page {number}: {e}")))?;

        let (rendered_w, rendered_h) = (bitmap.width() as u32, bitmap.height() as u32);
        let image = RgbaImage::from_raw(rendered_w, rendered_h, bitmap.as_rgba_bytes())
            .ok_or_else(|| {
                OperationError::Render(format!(
                    "page {number}: bitmap does not match {rendered_w}x{rendered_h}"
                ))
            })?;

        let path = out_dir.join(format!("page_{number}.png"));
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| OperationError::Image(format!("failed to write {}: {e}", path.display())))?;
        outputs.push(path);
    }

    tracing::debug!(pages = outputs.len(), dpi, "Rendered pages");
    Ok(outputs)
}
