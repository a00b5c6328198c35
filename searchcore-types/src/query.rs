//! Term-filtered, paged queries and their results.

use crate::document::StoredDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exact-value filter on one source field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFilter {
    /// Source field the filter applies to.
    pub field: String,
    /// Value the field must equal.
    pub value: Value,
}

/// Search request against a single index.
///
/// `SearchQuery` provides a composable API for the subset of the query DSL
/// the engine needs: conjunctive term filters plus paging.
///
/// # Examples
///
/// ```rust,ignore
/// use searchcore_types::SearchQuery;
///
/// let query = SearchQuery::match_all()
///     .filter_term("type", "Box")
///     .size(50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    terms: Vec<TermFilter>,
    from: usize,
    size: usize,
}

impl SearchQuery {
    /// Page size used when none is given.
    pub const DEFAULT_SIZE: usize = 10;

    /// Query matching every document in the index.
    pub const fn match_all() -> Self {
        Self {
            terms: Vec::new(),
            from: 0,
            size: Self::DEFAULT_SIZE,
        }
    }

    /// Require `field` to equal `value`.
    #[must_use]
    pub fn filter_term(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push(TermFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Skip the first `from` matches.
    #[must_use]
    pub const fn from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    /// Return at most `size` matches.
    #[must_use]
    pub const fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Filters every hit must satisfy.
    pub fn terms(&self) -> &[TermFilter] {
        &self.terms
    }

    /// Number of matches skipped.
    pub const fn offset(&self) -> usize {
        self.from
    }

    /// Page size.
    pub const fn limit(&self) -> usize {
        self.size
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::match_all()
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHits {
    total: u64,
    hits: Vec<StoredDocument>,
}

impl SearchHits {
    /// Page `hits` out of `total` matches.
    pub const fn new(total: u64, hits: Vec<StoredDocument>) -> Self {
        Self { total, hits }
    }

    /// A result with no hits, used when the index does not exist yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total number of matching documents, across all pages.
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Documents on this page.
    pub fn hits(&self) -> &[StoredDocument] {
        &self.hits
    }

    /// Whether this page holds no document.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Number of documents on this page.
    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

impl IntoIterator for SearchHits {
    type Item = StoredDocument;
    type IntoIter = std::vec::IntoIter<StoredDocument>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}
