//! The request surface of a clustered document-search backend.

use crate::document::{DocumentId, DocumentVersion, IndexName, StoredDocument};
use crate::error::ClusterError;
use crate::mapping::MappingSchema;
use crate::query::{SearchHits, SearchQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// How an index request treats an existing document with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    /// Create or overwrite.
    Index,
    /// Fail with `document_already_exists_exception` if the id is taken.
    Create,
}

/// What a single-document write did on the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteResult {
    /// A new document was stored.
    Created,
    /// An existing document was replaced.
    Updated,
    /// The document was removed.
    Deleted,
    /// The targeted document did not exist.
    NotFound,
}

/// Cluster acknowledgement of a single-document write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAck {
    /// Id of the written document.
    pub id: DocumentId,
    /// Version after the write.
    pub version: DocumentVersion,
    /// What the write did.
    pub result: WriteResult,
}

/// Cluster acknowledgement of an index-level request (mapping, flush).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledged {
    /// Whether the cluster accepted the request.
    pub acknowledged: bool,
}

impl Acknowledged {
    /// A positive acknowledgement.
    pub const fn yes() -> Self {
        Self { acknowledged: true }
    }
}

/// Trait defining the request surface of a clustered document-search backend.
///
/// Each method is one physical attempt: it may succeed, fail permanently, or
/// fail ambiguously (the request may have been applied even though an error
/// was returned). The engine never assumes more than that.
///
/// Implementations must be safe for concurrent use by independent operations;
/// the engine performs no client-side locking.
///
/// Implementations include:
/// - `searchcore-memory`: In-process cluster for development and tests
/// - `searchcore-testing`: Fault-injecting wrappers around another cluster
pub trait SearchCluster {
    /// Index `source` under `id`.
    ///
    /// With [`OpType::Create`] the request fails if the id already exists.
    /// With `expected_version` set the request fails on a version mismatch.
    fn attempt_index(
        &self,
        index: &IndexName,
        id: &DocumentId,
        source: &Value,
        op_type: OpType,
        expected_version: Option<DocumentVersion>,
    ) -> impl Future<Output = Result<IndexAck, ClusterError>> + Send;

    /// Read one document. `Ok(None)` means the document does not exist.
    ///
    /// A realtime read observes writes that have not been refreshed yet.
    fn attempt_get(
        &self,
        index: &IndexName,
        id: &DocumentId,
        realtime: bool,
    ) -> impl Future<Output = Result<Option<StoredDocument>, ClusterError>> + Send;

    /// Replace the source of an existing document.
    fn attempt_update(
        &self,
        index: &IndexName,
        id: &DocumentId,
        source: &Value,
        expected_version: Option<DocumentVersion>,
    ) -> impl Future<Output = Result<IndexAck, ClusterError>> + Send;

    /// Delete a document.
    fn attempt_delete(
        &self,
        index: &IndexName,
        id: &DocumentId,
        expected_version: Option<DocumentVersion>,
    ) -> impl Future<Output = Result<IndexAck, ClusterError>> + Send;

    /// Run a query against one index.
    fn attempt_search(
        &self,
        index: &IndexName,
        query: &SearchQuery,
    ) -> impl Future<Output = Result<SearchHits, ClusterError>> + Send;

    /// Install or extend the mapping of an index.
    fn attempt_put_mapping(
        &self,
        index: &IndexName,
        schema: &MappingSchema,
    ) -> impl Future<Output = Result<Acknowledged, ClusterError>> + Send;

    /// Ask the cluster to flush the write-ahead log of an index.
    fn attempt_flush(
        &self,
        index: &IndexName,
    ) -> impl Future<Output = Result<Acknowledged, ClusterError>> + Send;
}
