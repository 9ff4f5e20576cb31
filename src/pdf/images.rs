//! Embedded page image extraction, used when PDFium is unavailable.
//!
//! For each page the largest embedded image XObject is decoded, scaled to the
//! page's physical size at the requested dpi and written as PNG. JPEG
//! (DCTDecode) streams are decoded directly; other streams are tried as an
//! encoded image first and fall back to raw samples described by the image
//! dictionary.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::pdf::OperationError;
use crate::pdf::document::{
    inherited_attribute, is_image_subtype, load, page_size, require_pages, resolve,
};

/// Longest output side in pixels, whatever the dpi.
const MAX_SIDE: u32 = 10_000;

pub(crate) fn extract_images(
    input: &Path,
    out_dir: &Path,
    dpi: u32,
) -> Result<Vec<PathBuf>, OperationError> {
    let doc = load(input)?;
    let pages = require_pages(&doc)?;
    std::fs::create_dir_all(out_dir)?;

    let mut outputs = Vec::new();
    for (number, page_id) in pages {
        let Some(image) = largest_page_image(&doc, page_id) else {
            tracing::debug!(page = number, "No decodable image on page, skipping");
            continue;
        };

        let (width_pt, height_pt) = page_size(&doc, page_id);
        let (width, height) = target_dimensions(width_pt, height_pt, dpi);
        let scaled = image.resize_exact(width, height, FilterType::Triangle);

        let path = out_dir.join(format!("page_{number}.png"));
        scaled
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| OperationError::Image(format!("failed to write {}: {e}", path.display())))?;
        outputs.push(path);
    }

    tracing::debug!(images = outputs.len(), dpi, "Extracted page images");
    Ok(outputs)
}

/// Output size in pixels for a page of the given size in points.
pub(crate) fn target_dimensions(width_pt: f64, height_pt: f64, dpi: u32) -> (u32, u32) {
    let scale = f64::from(dpi) / 72.0;
    let mut width = (width_pt * scale).round().max(1.0);
    let mut height = (height_pt * scale).round().max(1.0);

    let longest = width.max(height);
    if longest > f64::from(MAX_SIDE) {
        let shrink = f64::from(MAX_SIDE) / longest;
        width = (width * shrink).round().max(1.0);
        height = (height * shrink).round().max(1.0);
    }
    (width as u32, height as u32)
}

/// Decode every image XObject on the page and keep the one with most pixels.
fn largest_page_image(doc: &Document, page_id: ObjectId) -> Option<DynamicImage> {
    let resources = inherited_attribute(doc, page_id, b"Resources")?;
    let resources = resolve(doc, &resources).as_dict().ok()?;
    let xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_dict().ok())?;

    let mut largest: Option<DynamicImage> = None;
    for (name, obj) in xobjects.iter() {
        let Object::Stream(stream) = resolve(doc, obj) else {
            continue;
        };
        if !is_image_subtype(&stream.dict) {
            continue;
        }

        match decode_image(doc, stream) {
            Ok(image) => {
                let area = u64::from(image.width()) * u64::from(image.height());
                let best = largest
                    .as_ref()
                    .map_or(0, |prev| u64::from(prev.width()) * u64::from(prev.height()));
                if area > best {
                    largest = Some(image);
                }
            }
            Err(e) => {
                tracing::warn!(
                    name = %String::from_utf8_lossy(name),
                    "Skipping undecodable image: {}",
                    e
                );
            }
        }
    }
    largest
}

fn is_dct(stream: &Stream) -> bool {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => n == b"DCTDecode",
        Ok(Object::Array(filters)) => filters
            .iter()
            .any(|f| matches!(f, Object::Name(n) if n == b"DCTDecode")),
        _ => false,
    }
}

fn decode_image(doc: &Document, stream: &Stream) -> Result<DynamicImage, OperationError> {
    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    if is_dct(stream) {
        return image::load_from_memory_with_format(&content, ImageFormat::Jpeg)
            .map_err(|e| OperationError::Image(format!("JPEG decode failed: {e}")));
    }

    // Some streams carry a complete encoded file (PNG, TIFF).
    if let Ok(image) = image::load_from_memory(&content) {
        return Ok(image);
    }

    reconstruct_raw_image(doc, &stream.dict, content)
}

/// Build an image from raw 8-bit samples using the stream's dictionary.
fn reconstruct_raw_image(
    doc: &Document,
    dict: &Dictionary,
    samples: Vec<u8>,
) -> Result<DynamicImage, OperationError> {
    let width = dimension(dict, b"Width")?;
    let height = dimension(dict, b"Height")?;
    let bits = dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    if bits != 8 {
        return Err(OperationError::Image(format!(
            "unsupported BitsPerComponent {bits}"
        )));
    }

    let channels = color_channels(doc, dict)?;
    let expected = width as usize * height as usize * channels;
    if samples.len() < expected {
        return Err(OperationError::Image(format!(
            "raw sample buffer too small: {} bytes, expected {} ({}x{}x{})",
            samples.len(),
            expected,
            width,
            height,
            channels
        )));
    }

    let mut samples = samples;
    samples.truncate(expected);
    let too_small = || OperationError::Image("sample buffer does not match dimensions".to_string());

    let image = match channels {
        1 => DynamicImage::ImageLuma8(
            image::GrayImage::from_raw(width, height, samples).ok_or_else(too_small)?,
        ),
        3 => DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(width, height, samples).ok_or_else(too_small)?,
        ),
        4 => DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(width, height, cmyk_to_rgb(&samples))
                .ok_or_else(too_small)?,
        ),
        other => {
            return Err(OperationError::Image(format!(
                "unsupported channel count {other}"
            )));
        }
    };
    Ok(image)
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Result<u32, OperationError> {
    let value = dict.get(key).and_then(Object::as_i64).map_err(|_| {
        OperationError::Image(format!(
            "missing /{} in image dictionary",
            String::from_utf8_lossy(key)
        ))
    })?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            OperationError::Image(format!(
                "invalid /{} {value}",
                String::from_utf8_lossy(key)
            ))
        })
}

/// Number of colour components from the /ColorSpace entry.
fn color_channels(doc: &Document, dict: &Dictionary) -> Result<usize, OperationError> {
    let Ok(space) = dict.get(b"ColorSpace") else {
        return Ok(3);
    };

    let unsupported = |name: &[u8]| {
        OperationError::Image(format!(
            "unsupported colour space {}",
            String::from_utf8_lossy(name)
        ))
    };

    match resolve(doc, space) {
        Object::Name(n) => match n.as_slice() {
            b"DeviceGray" | b"CalGray" => Ok(1),
            b"DeviceRGB" | b"CalRGB" => Ok(3),
            b"DeviceCMYK" => Ok(4),
            other => Err(unsupported(other)),
        },
        Object::Array(parts) => match parts.first() {
            Some(Object::Name(n)) if n == b"ICCBased" => {
                let components = parts
                    .get(1)
                    .map(|obj| resolve(doc, obj))
                    .and_then(|obj| obj.as_stream().ok())
                    .and_then(|s| s.dict.get(b"N").and_then(Object::as_i64).ok())
                    .unwrap_or(3);
                usize::try_from(components).map_err(|_| unsupported(b"ICCBased"))
            }
            Some(Object::Name(n)) => Err(unsupported(n)),
            _ => Err(unsupported(b"array")),
        },
        _ => Ok(3),
    }
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - u16::from(px[3]);
            let channel = |c: u8| ((255 - u16::from(c)) * k / 255) as u8;
            [channel(px[0]), channel(px[1]), channel(px[2])]
        })
        .collect()
}
