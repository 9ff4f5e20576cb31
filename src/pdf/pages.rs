//! Page level operations: split, merge and rotate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId, dictionary};

use crate::pdf::document::{
    has_type, inherited_attribute, load, materialize_inherited, require_pages, save,
};
use crate::pdf::{OperationError, Rotation};

/// Write each page to `out_dir/page_{n}.pdf`.
pub(crate) fn split(input: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, OperationError> {
    let doc = load(input)?;
    let numbers: Vec<u32> = require_pages(&doc)?.into_keys().collect();
    std::fs::create_dir_all(out_dir)?;

    let mut outputs = Vec::with_capacity(numbers.len());
    for (index, &keep) in numbers.iter().enumerate() {
        let others: Vec<u32> = numbers.iter().copied().filter(|&n| n != keep).collect();
        let mut single = doc.clone();
        single.delete_pages(&others);
        single.prune_objects();

        let path = out_dir.join(format!("page_{}.pdf", index + 1));
        save(&mut single, &path)?;
        outputs.push(path);
    }

    tracing::debug!(pages = outputs.len(), out_dir = %out_dir.display(), "Split document");
    Ok(outputs)
}

/// Concatenate all pages of `inputs`, in order, into `output`.
pub(crate) fn merge(inputs: &[PathBuf], output: &Path) -> Result<(), OperationError> {
    if inputs.is_empty() {
        return Err(OperationError::EmptyMerge);
    }

    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut kids: Vec<ObjectId> = Vec::new();

    for input in inputs {
        let mut doc = load(input)?;
        for page_id in require_pages(&doc)?.into_values() {
            materialize_inherited(&mut doc, page_id);
        }

        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;
        kids.extend(doc.get_pages().into_values());

        // The old page trees, catalogs and outlines are replaced wholesale.
        let dropped: HashSet<ObjectId> = doc
            .objects
            .iter()
            .filter(|(_, obj)| {
                has_type(obj, b"Catalog") || has_type(obj, b"Pages") || has_type(obj, b"Outlines")
            })
            .map(|(id, _)| *id)
            .collect();
        merged
            .objects
            .extend(doc.objects.into_iter().filter(|(id, _)| !dropped.contains(id)));
    }

    let pages_id = (next_id, 0);
    let catalog_id = (next_id + 1, 0);
    for kid in &kids {
        merged
            .get_dictionary_mut(*kid)?
            .set("Parent", Object::Reference(pages_id));
    }

    let count = kids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => Object::Integer(count),
        }),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages_id),
        }),
    );
    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = next_id + 1;
    merged.renumber_objects();

    tracing::debug!(inputs = inputs.len(), pages = count, "Merged documents");
    save(&mut merged, output)
}

/// Add `rotation` to every page's (possibly inherited) `/Rotate`.
pub(crate) fn rotate(input: &Path, output: &Path, rotation: Rotation) -> Result<(), OperationError> {
    let mut doc = load(input)?;
    let pages = require_pages(&doc)?;

    for page_id in pages.values().copied() {
        let current = inherited_attribute(&doc, page_id, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(0);
        let next = (current + i64::from(rotation.degrees())).rem_euclid(360);
        doc.get_dictionary_mut(page_id)?.set("Rotate", Object::Integer(next));
    }

    tracing::debug!(pages = pages.len(), degrees = rotation.degrees(), "Rotated document");
    save(&mut doc, output)
}
