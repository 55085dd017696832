// src/matcher.rs
//! First-match keyword scanning.
//!
//! The rule is deliberately blunt: lowercase the entry's title and summary
//! into one blob, then take the first keyword (in list order) whose
//! lowercase form occurs as a substring. At most one keyword matches per
//! entry; scanning stops at the first hit.

use crate::ingest::feed::Entry;

/// Returns the winning keyword, or `None` when nothing matches. An empty
/// keyword list never matches.
pub fn first_match<'a>(entry: &Entry, keywords: &'a [String]) -> Option<&'a str> {
    let blob = format!("{} {}", entry.title, entry.summary).to_lowercase();
    keywords
        .iter()
        .find(|kw| !kw.is_empty() && blob.contains(&kw.to_lowercase()))
        .map(|kw| kw.as_str())
}
