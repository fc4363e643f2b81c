//! Deduplication stage
//!
//! Replaces repeated content with a short back-reference to the first item
//! carrying it.

use std::collections::HashMap;

use crate::cache::content_hash;
use crate::models::{ContentItem, Technique};

/// Back-reference text left in place of a duplicate.
pub fn back_reference(first_id: &str) -> String {
    format!("[duplicate of {}]", first_id)
}

/// Returns the deduplicated list and the number of items replaced.
///
/// Exempt items are never replaced, but they still claim their content so
/// that later non-exempt copies point at them. Items that already are
/// back-references are passed through untouched, which makes a second run a
/// no-op.
pub fn deduplicate(items: &[ContentItem]) -> (Vec<ContentItem>, usize) {
    let mut first_seen: HashMap<String, String> = HashMap::new();
    let mut replaced = 0;

    let out = items
        .iter()
        .map(|item| {
            if item.metadata.duplicate_of.is_some() || item.content.is_empty() {
                return item.clone();
            }

            let hash = content_hash(&item.content);
            match first_seen.get(&hash) {
                Some(first_id) if !item.is_exempt() && *first_id != item.id => {
                    let mut dup = item.rewritten(back_reference(first_id), Technique::Deduplicated);
                    dup.metadata.duplicate_of = Some(first_id.clone());
                    replaced += 1;
                    dup
                }
                Some(_) => item.clone(),
                None => {
                    first_seen.insert(hash, item.id.clone());
                    item.clone()
                }
            }
        })
        .collect();

    (out, replaced)
}
