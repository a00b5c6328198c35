//! Shared validation predicates for domain types.
//!
//! This module contains validation functions used by nutype-based domain types
//! across the searchcore crates.

/// Characters a cluster refuses inside an index name.
const FORBIDDEN_INDEX_CHARACTERS: [char; 11] =
    ['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#'];

/// Validation predicate: index names the cluster will accept.
///
/// Index names may not contain path separators, wildcards, quoting or
/// whitespace, and may not start with `-`, `_` or `+`. The dot names `.`
/// and `..` are reserved.
pub fn legal_index_name(s: &str) -> bool {
    !s.contains(FORBIDDEN_INDEX_CHARACTERS)
        && !s.starts_with(['-', '_', '+'])
        && s != "."
        && s != ".."
}

/// Validation predicate: document ids must not contain control characters.
pub fn no_control_characters(s: &str) -> bool {
    !s.chars().any(char::is_control)
}
