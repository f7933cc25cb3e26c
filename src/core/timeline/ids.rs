//! Content-addressed identifiers.
//!
//! An id is the first 12 hex chars of SHA-256 over the canonical provenance
//! tuple, fields joined by U+001F. Ids depend on where a thing came from, never
//! on recognised text or pixels, so re-running unchanged input reproduces them.
//!
//! | entity | fields |
//! |---|---|
//! | post | source_file, chunk_index, region_index, y_global_start |
//! | image | source_file, chunk_index, region_index, x, y (region-local) |
//! | crawl target | kind, owner id |

use std::fmt::Display;

use sha2::{Digest, Sha256};

const ID_LEN: usize = 12;
const FIELD_SEPARATOR: &str = "\u{1f}";

pub fn content_id(fields: &[&dyn Display]) -> String {
    let canonical = fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(ID_LEN);
    hex
}

pub fn post_id(source_file: &str, chunk_index: u32, region_index: u32, y_global: u32) -> String {
    content_id(&[&source_file, &chunk_index, &region_index, &y_global])
}

pub fn image_id(source_file: &str, chunk_index: u32, region_index: u32, x: u32, y: u32) -> String {
    content_id(&[&source_file, &chunk_index, &region_index, &x, &y])
}

pub fn crawl_id(kind: &str, owner_id: &str) -> String {
    content_id(&[&kind, &owner_id])
}
