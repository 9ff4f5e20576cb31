//! Shared lopdf helpers: loading, saving and page tree lookups.

use std::collections::BTreeMap;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::pdf::OperationError;

/// Page tree depth after which we assume a reference cycle.
const MAX_TREE_DEPTH: usize = 64;

/// US Letter in points, used when a page carries no usable MediaBox.
const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Attributes a page may inherit from its ancestors in the page tree.
pub(crate) const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

pub(crate) fn load(path: &Path) -> Result<Document, OperationError> {
    Document::load(path).map_err(|e| OperationError::Load {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn save(doc: &mut Document, path: &Path) -> Result<(), OperationError> {
    doc.save(path).map(|_| ()).map_err(|e| OperationError::Save {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Page number -> page object id, failing on documents without pages.
pub(crate) fn require_pages(doc: &Document) -> Result<BTreeMap<u32, ObjectId>, OperationError> {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(OperationError::NoPages);
    }
    Ok(pages)
}

pub(crate) fn page_count(path: &Path) -> Option<u32> {
    let doc = Document::load(path).ok()?;
    u32::try_from(doc.get_pages().len()).ok()
}

/// Resolve a PDF object reference to its target, or return the object as-is.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Look up `key` on a page, walking up `/Parent` links when it is inherited.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Copy inherited attributes onto the page itself so it survives being
/// moved into another page tree.
pub(crate) fn materialize_inherited(doc: &mut Document, page_id: ObjectId) {
    for key in INHERITABLE {
        let present = doc
            .get_dictionary(page_id)
            .map(|dict| dict.has(key))
            .unwrap_or(true);
        if present {
            continue;
        }
        if let Some(value) = inherited_attribute(doc, page_id, key) {
            if let Ok(dict) = doc.get_dictionary_mut(page_id) {
                dict.set(key.to_vec(), value);
            }
        }
    }
}

pub(crate) fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Page width and height in points, from the (possibly inherited) MediaBox.
pub(crate) fn page_size(doc: &Document, page_id: ObjectId) -> (f64, f64) {
    let Some(media_box) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return DEFAULT_PAGE_SIZE;
    };
    let Ok(corners) = resolve(doc, &media_box).as_array() else {
        return DEFAULT_PAGE_SIZE;
    };
    let values: Vec<f64> = corners
        .iter()
        .filter_map(|c| as_number(resolve(doc, c)))
        .collect();
    match values.as_slice() {
        [x0, y0, x1, y1] if x1 != x0 && y1 != y0 => ((x1 - x0).abs(), (y1 - y0).abs()),
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Whether `obj` is a dictionary (or stream) with the given `/Type`.
pub(crate) fn has_type(obj: &Object, ty: &[u8]) -> bool {
    let dict = match obj {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return false,
    };
    dict.get(b"Type").and_then(Object::as_name).ok() == Some(ty)
}

/// Check if a stream dictionary has /Subtype /Image.
pub(crate) fn is_image_subtype(dict: &Dictionary) -> bool {
    dict.get(b"Subtype")
        .map(|obj| matches!(obj, Object::Name(n) if n == b"Image"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures;

    #[test]
    fn test_page_count_reads_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three.pdf");
        fixtures::write_pdf(fixtures::text_pdf(&["one", "two", "three"]), &path);

        assert_eq!(page_count(&path), Some(3));
    }

    #[test]
    fn test_page_count_of_garbage_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        assert_eq!(page_count(&path), None);
        assert!(matches!(load(&path), Err(OperationError::Load { .. })));
    }

    #[test]
    fn test_inherited_media_box_is_found() {
        let doc = fixtures::text_pdf(&["only"]);
        let page_id = doc.get_pages()[&1];

        // The fixture puts MediaBox on the page tree root.
        assert!(!doc.get_dictionary(page_id).unwrap().has(b"MediaBox"));
        assert_eq!(page_size(&doc, page_id), (612.0, 792.0));
    }

    #[test]
    fn test_materialize_copies_inherited_attributes() {
        let mut doc = fixtures::text_pdf(&["only"]);
        let page_id = doc.get_pages()[&1];

        materialize_inherited(&mut doc, page_id);

        let page = doc.get_dictionary(page_id).unwrap();
        assert!(page.has(b"MediaBox"));
        assert!(page.has(b"Resources"));
    }
}
