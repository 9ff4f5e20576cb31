//! Structural compression.

use std::path::Path;

use crate::pdf::OperationError;
use crate::pdf::document::{load, require_pages, save};

pub(crate) fn compress(input: &Path, output: &Path) -> Result<(), OperationError> {
    let mut doc = load(input)?;
    require_pages(&doc)?;

    let empty_streams = doc.delete_zero_length_streams().len();
    let pruned = doc.prune_objects().len();
    doc.renumber_objects();
    doc.compress();

    tracing::debug!(empty_streams, pruned, objects = doc.objects.len(), "Compressed document");
    save(&mut doc, output)
}
