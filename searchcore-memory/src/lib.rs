//! In-memory search cluster for the `SearchCore` request engine
//!
//! This crate provides an in-process implementation of the `SearchCluster`
//! trait from searchcore-types, useful for testing and development scenarios
//! where a real cluster is not required. It enforces the rules the engine
//! relies on: indices must exist, op-type create refuses taken ids, versions
//! guard optimistic writes and mappings type their fields.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{hash_map, BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use searchcore_types::{
    Acknowledged, ClusterError, DocumentId, DocumentVersion, FieldType, IndexAck, IndexName,
    MappingSchema, OpType, SearchCluster, SearchHits, SearchQuery, StoredDocument, WriteResult,
};
use serde_json::Value;
use tracing::debug;

/// Largest `from + size` window a search may request.
pub const MAX_RESULT_WINDOW: usize = 10_000;

const ILLEGAL_STATE: &str = "illegal_state_exception";
const RESOURCE_ALREADY_EXISTS: &str = "resource_already_exists_exception";

type Indices = HashMap<IndexName, IndexState>;

#[derive(Debug, Clone)]
struct Entry {
    version: DocumentVersion,
    source: Value,
}

#[derive(Debug, Default)]
struct IndexState {
    mapping: MappingSchema,
    documents: BTreeMap<DocumentId, Entry>,
    flushes: u64,
}

impl IndexState {
    /// Check `source` against the mapping, returning newly inferred fields.
    fn check_source(&self, source: &Value) -> Result<Vec<(String, FieldType)>, ClusterError> {
        let Value::Object(fields) = source else {
            return Err(ClusterError::mapper_parsing(
                "failed to parse, document is empty or not an object",
            ));
        };

        let mut inferred = Vec::new();
        for (name, value) in fields {
            match self.mapping.field_type(name) {
                Some(field_type) if !field_type.accepts(value) => {
                    return Err(ClusterError::mapper_parsing(format!(
                        "failed to parse field [{name}] of type [{}]",
                        field_type.name()
                    )));
                }
                Some(_) => {}
                None => {
                    if let Some(field_type) = FieldType::infer(value) {
                        inferred.push((name.clone(), field_type));
                    }
                }
            }
        }
        Ok(inferred)
    }

    fn apply_source(
        &mut self,
        id: &DocumentId,
        source: &Value,
        version: DocumentVersion,
    ) -> Result<(), ClusterError> {
        let inferred = self.check_source(source)?;
        for (name, field_type) in inferred {
            self.mapping = std::mem::take(&mut self.mapping).field(name, field_type);
        }
        let _ = self.documents.insert(
            id.clone(),
            Entry {
                version,
                source: source.clone(),
            },
        );
        Ok(())
    }
}

fn check_version(
    id: &DocumentId,
    current: Option<DocumentVersion>,
    expected: Option<DocumentVersion>,
) -> Result<(), ClusterError> {
    match (expected, current) {
        (Some(expected), Some(current)) if expected != current => Err(
            ClusterError::version_conflict(id, current.into_inner(), expected.into_inner()),
        ),
        (Some(expected), None) => Err(ClusterError::version_conflict(
            id,
            0,
            expected.into_inner(),
        )),
        _ => Ok(()),
    }
}

fn matches(source: &Value, query: &SearchQuery) -> bool {
    query
        .terms()
        .iter()
        .all(|term| source.get(&term.field) == Some(&term.value))
}

/// Thread-safe in-memory search cluster for testing
///
/// Clones share the same state, so a clone can be handed to a fault-injecting
/// wrapper while the original is used to inspect what actually landed.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    indices: Arc<RwLock<Indices>>,
}

impl InMemoryCluster {
    /// Create a new cluster without any index
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `index` with an initial mapping.
    ///
    /// Fails with `resource_already_exists_exception` if the index exists.
    pub fn create_index(
        &self,
        index: &IndexName,
        mapping: MappingSchema,
    ) -> Result<(), ClusterError> {
        let mut indices = self.indices.write().map_err(|_| poisoned())?;
        match indices.entry(index.clone()) {
            hash_map::Entry::Occupied(_) => Err(ClusterError::new(
                RESOURCE_ALREADY_EXISTS,
                format!("index [{index}] already exists"),
            )),
            hash_map::Entry::Vacant(slot) => {
                debug!(index = %index, "creating index");
                let _ = slot.insert(IndexState {
                    mapping,
                    ..IndexState::default()
                });
                Ok(())
            }
        }
    }

    /// Drop `index` and every document in it. Returns whether it existed.
    pub fn delete_index(&self, index: &IndexName) -> bool {
        self.inspect_mut(|indices| indices.remove(index).is_some())
    }

    /// Whether `index` exists.
    pub fn index_exists(&self, index: &IndexName) -> bool {
        self.inspect(|indices| indices.contains_key(index))
    }

    /// Current stored state of one document, bypassing any fault injection.
    pub fn document(&self, index: &IndexName, id: &DocumentId) -> Option<StoredDocument> {
        self.inspect(|indices| {
            indices
                .get(index)
                .and_then(|state| state.documents.get(id))
                .map(|entry| {
                    StoredDocument::from_source(id.clone(), entry.version, entry.source.clone())
                })
        })
    }

    /// Number of documents stored in `index` (0 if it does not exist).
    pub fn document_count(&self, index: &IndexName) -> usize {
        self.inspect(|indices| indices.get(index).map_or(0, |state| state.documents.len()))
    }

    /// Number of acknowledged translog flushes on `index`.
    pub fn flush_count(&self, index: &IndexName) -> u64 {
        self.inspect(|indices| indices.get(index).map_or(0, |state| state.flushes))
    }

    /// Current mapping of `index`, including dynamically inferred fields.
    pub fn mapping(&self, index: &IndexName) -> Option<MappingSchema> {
        self.inspect(|indices| indices.get(index).map(|state| state.mapping.clone()))
    }

    fn with_index<R>(
        &self,
        index: &IndexName,
        f: impl FnOnce(&IndexState) -> Result<R, ClusterError>,
    ) -> Result<R, ClusterError> {
        let indices = self.indices.read().map_err(|_| poisoned())?;
        indices.get(index).map_or_else(|| Err(missing(index)), f)
    }

    fn with_index_mut<R>(
        &self,
        index: &IndexName,
        f: impl FnOnce(&mut IndexState) -> Result<R, ClusterError>,
    ) -> Result<R, ClusterError> {
        let mut indices = self.indices.write().map_err(|_| poisoned())?;
        indices.get_mut(index).map_or_else(|| Err(missing(index)), f)
    }

    fn inspect<R>(&self, f: impl FnOnce(&Indices) -> R) -> R {
        let indices = self.indices.read().unwrap_or_else(PoisonError::into_inner);
        f(&indices)
    }

    fn inspect_mut<R>(&self, f: impl FnOnce(&mut Indices) -> R) -> R {
        let mut indices = self.indices.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut indices)
    }
}

fn missing(index: &IndexName) -> ClusterError {
    ClusterError::index_not_found(index)
}

fn poisoned() -> ClusterError {
    ClusterError::new(ILLEGAL_STATE, "cluster state lock poisoned")
}

impl SearchCluster for InMemoryCluster {
    async fn attempt_index(
        &self,
        index: &IndexName,
        id: &DocumentId,
        source: &Value,
        op_type: OpType,
        expected_version: Option<DocumentVersion>,
    ) -> Result<IndexAck, ClusterError> {
        let (version, result) = self.with_index_mut(index, |state| {
            let current = state.documents.get(id).map(|entry| entry.version);
            if op_type == OpType::Create && current.is_some() {
                return Err(ClusterError::document_already_exists(id));
            }
            check_version(id, current, expected_version)?;

            let (version, result) = match current {
                Some(version) => (version.increment(), WriteResult::Updated),
                None => (DocumentVersion::first(), WriteResult::Created),
            };
            state.apply_source(id, source, version)?;
            Ok((version, result))
        })?;
        debug!(index = %index, id = %id, version = %version, "indexed document");

        Ok(IndexAck {
            id: id.clone(),
            version,
            result,
        })
    }

    /// Every read is realtime: writes are visible as soon as they are acknowledged.
    async fn attempt_get(
        &self,
        index: &IndexName,
        id: &DocumentId,
        _realtime: bool,
    ) -> Result<Option<StoredDocument>, ClusterError> {
        self.with_index(index, |state| {
            Ok(state.documents.get(id).map(|entry| {
                StoredDocument::from_source(id.clone(), entry.version, entry.source.clone())
            }))
        })
    }

    async fn attempt_update(
        &self,
        index: &IndexName,
        id: &DocumentId,
        source: &Value,
        expected_version: Option<DocumentVersion>,
    ) -> Result<IndexAck, ClusterError> {
        let version = self.with_index_mut(index, |state| {
            let Some(current) = state.documents.get(id).map(|entry| entry.version) else {
                return Err(ClusterError::document_missing(id));
            };
            check_version(id, Some(current), expected_version)?;

            let version = current.increment();
            state.apply_source(id, source, version)?;
            Ok(version)
        })?;
        debug!(index = %index, id = %id, version = %version, "updated document");

        Ok(IndexAck {
            id: id.clone(),
            version,
            result: WriteResult::Updated,
        })
    }

    async fn attempt_delete(
        &self,
        index: &IndexName,
        id: &DocumentId,
        expected_version: Option<DocumentVersion>,
    ) -> Result<IndexAck, ClusterError> {
        let removed = self.with_index_mut(index, |state| {
            let current = state.documents.get(id).map(|entry| entry.version);
            check_version(id, current, expected_version)?;
            Ok(state.documents.remove(id).and(current))
        })?;

        let Some(current) = removed else {
            return Ok(IndexAck {
                id: id.clone(),
                version: DocumentVersion::first(),
                result: WriteResult::NotFound,
            });
        };
        debug!(index = %index, id = %id, "deleted document");

        Ok(IndexAck {
            id: id.clone(),
            version: current.increment(),
            result: WriteResult::Deleted,
        })
    }

    async fn attempt_search(
        &self,
        index: &IndexName,
        query: &SearchQuery,
    ) -> Result<SearchHits, ClusterError> {
        self.with_index(index, |state| {
            let window = query.offset().saturating_add(query.limit());
            if window > MAX_RESULT_WINDOW {
                return Err(ClusterError::search_phase_execution(format!(
                    "Result window is too large, from + size must be less than or equal to: [{MAX_RESULT_WINDOW}] but was [{window}]"
                )));
            }

            let matching: Vec<_> = state
                .documents
                .iter()
                .filter(|(_, entry)| matches(&entry.source, query))
                .collect();
            let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
            let hits = matching
                .into_iter()
                .skip(query.offset())
                .take(query.limit())
                .map(|(id, entry)| {
                    StoredDocument::from_source(id.clone(), entry.version, entry.source.clone())
                })
                .collect();

            Ok(SearchHits::new(total, hits))
        })
    }

    async fn attempt_put_mapping(
        &self,
        index: &IndexName,
        schema: &MappingSchema,
    ) -> Result<Acknowledged, ClusterError> {
        self.with_index_mut(index, |state| {
            for (name, field_type) in schema.properties() {
                if let Some(existing) = state
                    .mapping
                    .field_type(name)
                    .filter(|existing| *existing != field_type)
                {
                    return Err(ClusterError::merge_mapping(format!(
                        "mapper [{name}] cannot be changed from type [{}] to [{}]",
                        existing.name(),
                        field_type.name()
                    )));
                }
            }

            let mut merged = std::mem::take(&mut state.mapping);
            for (name, field_type) in schema.properties() {
                merged = merged.field(name, field_type);
            }
            state.mapping = merged;
            Ok(Acknowledged::yes())
        })
    }

    async fn attempt_flush(&self, index: &IndexName) -> Result<Acknowledged, ClusterError> {
        self.with_index_mut(index, |state| {
            state.flushes += 1;
            Ok(Acknowledged::yes())
        })
    }
}
