//! Watermark removal.
//!
//! Text-show operators whose string contains a configured keyword are dropped
//! from every page's content stream, along with every image draw. Image
//! XObjects are then deleted from the document.

use std::collections::HashSet;
use std::path::Path;

use aho_corasick::AhoCorasick;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};

use crate::pdf::OperationError;
use crate::pdf::document::{inherited_attribute, is_image_subtype, load, require_pages, resolve, save};

pub(crate) fn remove_watermark(
    input: &Path,
    output: &Path,
    keywords: &[String],
) -> Result<(), OperationError> {
    let mut doc = load(input)?;
    let pages = require_pages(&doc)?;
    let matcher = keyword_matcher(keywords)?;
    let images = image_object_ids(&doc);

    let mut text_removed = 0usize;
    let mut draws_removed = 0usize;

    for page_id in pages.into_values() {
        let image_names = page_image_names(&doc, page_id, &images);
        let raw = doc.get_page_content(page_id)?;
        let mut content = Content::decode(&raw)?;

        let before = content.operations.len();
        content.operations.retain(|op| match classify(op, matcher.as_ref(), &image_names) {
            Some(Removal::Text) => {
                text_removed += 1;
                false
            }
            Some(Removal::ImageDraw) => {
                draws_removed += 1;
                false
            }
            None => true,
        });

        if content.operations.len() != before {
            doc.change_page_content(page_id, content.encode()?)?;
        }
    }

    for id in &images {
        doc.delete_object(*id);
    }
    doc.prune_objects();

    tracing::debug!(
        text_removed,
        draws_removed,
        images_deleted = images.len(),
        "Removed watermark content"
    );
    save(&mut doc, output)
}

enum Removal {
    Text,
    ImageDraw,
}

fn keyword_matcher(keywords: &[String]) -> Result<Option<AhoCorasick>, OperationError> {
    let patterns: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if patterns.is_empty() {
        return Ok(None);
    }
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(patterns)
        .map(Some)
        .map_err(|e| OperationError::Keywords(e.to_string()))
}

fn classify(
    op: &Operation,
    matcher: Option<&AhoCorasick>,
    image_names: &HashSet<Vec<u8>>,
) -> Option<Removal> {
    if op.operator == "Do" {
        return match op.operands.first() {
            Some(Object::Name(name)) if image_names.contains(name) => Some(Removal::ImageDraw),
            _ => None,
        };
    }

    let matcher = matcher?;
    let text = shown_bytes(op)?;
    matcher.is_match(text.as_slice()).then_some(Removal::Text)
}

/// Bytes shown by a text-show operator, or `None` for any other operator.
fn shown_bytes(op: &Operation) -> Option<Vec<u8>> {
    let string_at = |index: usize| match op.operands.get(index) {
        Some(Object::String(bytes, _)) => Some(bytes.clone()),
        _ => None,
    };

    match op.operator.as_str() {
        "Tj" | "'" => string_at(0),
        // aw ac string "
        "\"" => string_at(2),
        "TJ" => match op.operands.first() {
            Some(Object::Array(parts)) => Some(
                parts
                    .iter()
                    .filter_map(|part| match part {
                        Object::String(bytes, _) => Some(bytes.as_slice()),
                        _ => None,
                    })
                    .flatten()
                    .copied()
                    .collect(),
            ),
            _ => None,
        },
        _ => None,
    }
}

fn image_object_ids(doc: &Document) -> HashSet<ObjectId> {
    doc.objects
        .iter()
        .filter_map(|(id, obj)| match obj {
            Object::Stream(stream) if is_image_subtype(&stream.dict) => Some(*id),
            _ => None,
        })
        .collect()
}

/// XObject resource names on a page that point at images.
fn page_image_names(
    doc: &Document,
    page_id: ObjectId,
    images: &HashSet<ObjectId>,
) -> HashSet<Vec<u8>> {
    let Some(resources) = inherited_attribute(doc, page_id, b"Resources") else {
        return HashSet::new();
    };
    let Ok(resources) = resolve(doc, &resources).as_dict() else {
        return HashSet::new();
    };
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
    else {
        return HashSet::new();
    };

    xobjects
        .iter()
        .filter(|(_, obj)| match obj {
            Object::Reference(id) => images.contains(id),
            Object::Stream(stream) => is_image_subtype(&stream.dict),
            _ => false,
        })
        .map(|(name, _)| name.clone())
        .collect()
}
