//! File names for uploads and operation outputs.
//!
//! Uploads are stored as `{user_id}_{timestamp}_{file_name}` in the work
//! directory. Outputs sit next to their input and carry an operation suffix.

use std::path::{Path, PathBuf};

use crate::pdf::Rotation;

/// Longest sanitised file name kept from an upload.
const MAX_FILE_NAME_CHARS: usize = 128;

/// Whether the file name looks like a PDF (by suffix, case-insensitive).
pub fn is_pdf_name(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Reduce an uploaded name to a single safe path component.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document.pdf".to_string()
    } else {
        truncate_keeping_extension(cleaned, MAX_FILE_NAME_CHARS)
    }
}

/// Cut `name` to `max` chars, shortening the stem so a short extension survives.
fn truncate_keeping_extension(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.chars().count() < max / 2 => {
            let keep = max - ext.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{stem}.{ext}")
        }
        _ => name.chars().take(max).collect(),
    }
}

/// `{work_dir}/{user_id}_{timestamp}_{file_name}`
pub fn upload_path(work_dir: &Path, user_id: &str, timestamp: i64, file_name: &str) -> PathBuf {
    work_dir.join(format!(
        "{}_{}_{}",
        sanitize_file_name(user_id),
        timestamp,
        sanitize_file_name(file_name)
    ))
}

/// `{work_dir}/{user_id}_{timestamp}_merged.pdf`
pub fn merged_path(work_dir: &Path, user_id: &str, timestamp: i64) -> PathBuf {
    work_dir.join(format!(
        "{}_{}_merged.pdf",
        sanitize_file_name(user_id),
        timestamp
    ))
}

fn stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

fn sibling(input: &Path, name: String) -> PathBuf {
    match input.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

pub fn clean_path(input: &Path) -> PathBuf {
    sibling(input, format!("{}_clean.pdf", stem(input)))
}

pub fn compressed_path(input: &Path) -> PathBuf {
    sibling(input, format!("{}_compressed.pdf", stem(input)))
}

pub fn rotated_path(input: &Path, rotation: Rotation) -> PathBuf {
    sibling(input, format!("{}_rotated_{}.pdf", stem(input), rotation))
}

pub fn pages_dir(input: &Path) -> PathBuf {
    sibling(input, format!("{}_pages", stem(input)))
}

pub fn images_dir(input: &Path, dpi: u32) -> PathBuf {
    sibling(input, format!("{}_images_{}dpi", stem(input), dpi))
}
