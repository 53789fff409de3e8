//! Filename inference from a located document's property bag

use crate::types::{DocumentId, PropertyBag};

/// Property holding the original file name of the indexed version
pub const VERSION_FILE_NAME: &str = "%VERSION_FILE_NAME";

/// Extension used when the property bag does not name one
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Infer `<doc_id>.<ext>` from the version file name property
///
/// Total: a missing property, an empty value, or a value without an
/// extension all fall back to `<doc_id>.jpg`.
pub fn infer_filename(doc_id: &DocumentId, properties: &PropertyBag) -> String {
    let extension = properties
        .get(VERSION_FILE_NAME)
        .and_then(extension_of)
        .unwrap_or(DEFAULT_EXTENSION);
    format!("{doc_id}.{extension}")
}

/// Extension after the last dot of the final path component
///
/// Both `/` and `\` separate components. Leading dots belong to the stem,
/// so `.profile` has no extension.
fn extension_of(path: &str) -> Option<&str> {
    let base = path.trim().rsplit(['/', '\\']).next().unwrap_or_default();
    let stem_start = base.len() - base.trim_start_matches('.').len();
    let dot = stem_start + base[stem_start..].rfind('.')?;
    let extension = &base[dot + 1..];
    (!extension.is_empty()).then_some(extension)
}
