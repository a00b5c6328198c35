//! Cluster-reported errors and the taxonomy they classify into.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire-level error type names reported by the cluster.
///
/// These are the `type` values carried in a cluster error object. The
/// engine's default classifier rules are keyed on them.
pub mod wire {
    /// A node dropped out of the cluster while handling the request.
    pub const NODE_DISCONNECTED: &str = "node_disconnected_exception";
    /// No node could be selected to serve the request.
    pub const NO_NODE_AVAILABLE: &str = "no_node_available_exception";
    /// No shard copy was available for the target document.
    pub const NO_SHARD_AVAILABLE: &str = "no_shard_available_action_exception";
    /// A cluster-level block rejected the request (e.g. during recovery).
    pub const CLUSTER_BLOCK: &str = "cluster_block_exception";
    /// Execution failed without a category; observed while the translog is replayed.
    pub const UNCATEGORIZED_EXECUTION: &str = "uncategorized_execution_exception";
    /// The target index does not exist.
    pub const INDEX_NOT_FOUND: &str = "index_not_found_exception";
    /// Older spelling of [`INDEX_NOT_FOUND`].
    pub const INDEX_MISSING: &str = "index_missing_exception";
    /// Optimistic concurrency check failed.
    pub const VERSION_CONFLICT: &str = "version_conflict_engine_exception";
    /// A document field does not fit the index mapping.
    pub const MAPPER_PARSING: &str = "mapper_parsing_exception";
    /// A mapping update conflicts with the existing mapping.
    pub const MERGE_MAPPING: &str = "merge_mapping_exception";
    /// Query execution failed on one or more shards.
    pub const SEARCH_PHASE_EXECUTION: &str = "search_phase_execution_exception";
    /// A create collided with an existing document id.
    pub const DOCUMENT_ALREADY_EXISTS: &str = "document_already_exists_exception";
    /// An update targeted a document that does not exist.
    pub const DOCUMENT_MISSING: &str = "document_missing_exception";
    /// A broadcast (flush, refresh) failed on a shard.
    pub const BROADCAST_SHARD_OPERATION_FAILED: &str =
        "broadcast_shard_operation_failed_exception";
    /// The shard engine refused a flush in its current state.
    pub const FLUSH_NOT_ALLOWED_ENGINE: &str = "flush_not_allowed_engine_exception";
    /// Transport wrapper whose cause carries the real failure.
    pub const REMOTE_TRANSPORT: &str = "remote_transport_exception";
    /// Settings wrapper whose cause carries the real failure.
    pub const SETTINGS: &str = "settings_exception";
}

/// Error object reported by the cluster for a failed request.
///
/// Mirrors the JSON error body returned by the cluster:
/// `{"type": "...", "reason": "...", "caused_by": {...}}`. Only the
/// immediate error and its direct cause are consulted by classification.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{error_type}: {reason}")]
pub struct ClusterError {
    #[serde(rename = "type")]
    error_type: String,
    reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[source]
    caused_by: Option<Box<ClusterError>>,
}

impl ClusterError {
    /// Create an error with the given wire type and human-readable reason.
    pub fn new(error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            reason: reason.into(),
            caused_by: None,
        }
    }

    /// Attach the underlying cause of this error.
    #[must_use]
    pub fn with_cause(mut self, cause: Self) -> Self {
        self.caused_by = Some(Box::new(cause));
        self
    }

    /// The wire `type` of this error.
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    /// The reason reported alongside the error.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The direct cause, if the cluster reported one.
    pub fn cause(&self) -> Option<&Self> {
        self.caused_by.as_deref()
    }

    /// `node` dropped out of the cluster mid-request.
    pub fn node_disconnected(node: &str) -> Self {
        Self::new(wire::NODE_DISCONNECTED, format!("[{node}] disconnected"))
    }

    /// No configured node could serve the request.
    pub fn no_node_available() -> Self {
        Self::new(
            wire::NO_NODE_AVAILABLE,
            "None of the configured nodes are available",
        )
    }

    /// No shard copy of `index` was available.
    pub fn no_shard_available(index: &str) -> Self {
        Self::new(
            wire::NO_SHARD_AVAILABLE,
            format!("[{index}] no shard available for request"),
        )
    }

    /// A cluster-level block rejected the request.
    pub fn cluster_blocked(reason: &str) -> Self {
        Self::new(wire::CLUSTER_BLOCK, format!("blocked by: [{reason}]"))
    }

    /// Execution failed without a more specific category.
    pub fn uncategorized_execution(reason: &str) -> Self {
        Self::new(wire::UNCATEGORIZED_EXECUTION, reason)
    }

    /// `index` does not exist.
    pub fn index_not_found(index: &str) -> Self {
        Self::new(wire::INDEX_NOT_FOUND, format!("no such index [{index}]"))
    }

    /// The document `id` is at `current`, not the `provided` version.
    pub fn version_conflict(id: &str, current: u64, provided: u64) -> Self {
        Self::new(
            wire::VERSION_CONFLICT,
            format!("[{id}]: version conflict, current version [{current}] is different than the one provided [{provided}]"),
        )
    }

    /// A create found `id` already taken.
    pub fn document_already_exists(id: &str) -> Self {
        Self::new(
            wire::DOCUMENT_ALREADY_EXISTS,
            format!("[{id}]: document already exists"),
        )
    }

    /// An update found no document `id`.
    pub fn document_missing(id: &str) -> Self {
        Self::new(wire::DOCUMENT_MISSING, format!("[{id}]: document missing"))
    }

    /// A field value does not fit its mapped type.
    pub fn mapper_parsing(reason: impl Into<String>) -> Self {
        Self::new(wire::MAPPER_PARSING, reason)
    }

    /// A mapping change conflicts with the installed mapping.
    pub fn merge_mapping(reason: impl Into<String>) -> Self {
        Self::new(wire::MERGE_MAPPING, reason)
    }

    /// The query failed on the shards.
    pub fn search_phase_execution(reason: impl Into<String>) -> Self {
        Self::new(wire::SEARCH_PHASE_EXECUTION, reason)
    }

    /// A broadcast request on `index` failed on a shard.
    pub fn broadcast_shard_operation_failed(index: &str) -> Self {
        Self::new(
            wire::BROADCAST_SHARD_OPERATION_FAILED,
            format!("[{index}] operation failed on shard"),
        )
    }

    /// The shard engine of `index` refused a flush.
    pub fn flush_not_allowed(index: &str) -> Self {
        Self::new(
            wire::FLUSH_NOT_ALLOWED_ENGINE,
            format!("[{index}] already flushing..."),
        )
    }

    /// Wrap `cause` in a remote transport error, as relayed by a coordinating node.
    pub fn remote_transport(node: &str, cause: Self) -> Self {
        Self::new(wire::REMOTE_TRANSPORT, format!("[{node}] remote failure")).with_cause(cause)
    }

    /// Wrap `cause` in a settings error.
    pub fn settings(reason: &str, cause: Self) -> Self {
        Self::new(wire::SETTINGS, reason).with_cause(cause)
    }
}

/// Closed taxonomy of cluster conditions the engine can tell apart.
///
/// Produced from a [`ClusterError`] by the engine's classifier. Anything the
/// classifier does not recognize is [`ErrorKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Target index absent.
    IndexMissing,
    /// Optimistic concurrency check failed.
    VersionConflict,
    /// Payload or mapping does not conform to the index's field typing.
    SchemaMismatch,
    /// Query execution failed on the cluster.
    SearchPhaseFailure,
    /// A create collided with an existing document.
    DocumentAlreadyExists,
    /// Disconnected node, no node, no shard, or cluster block.
    TransientNodeUnavailable,
    /// Uncategorized execution failure, possibly racing a translog replay.
    UncategorizedExecution,
    /// A broadcast shard operation (such as flush) failed.
    BroadcastShardOperationFailed,
    /// The shard engine refused to flush.
    FlushNotAllowed,
    /// Not recognized.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IndexMissing => "index_missing",
            Self::VersionConflict => "version_conflict",
            Self::SchemaMismatch => "schema_mismatch",
            Self::SearchPhaseFailure => "search_phase_failure",
            Self::DocumentAlreadyExists => "document_already_exists",
            Self::TransientNodeUnavailable => "transient_node_unavailable",
            Self::UncategorizedExecution => "uncategorized_execution",
            Self::BroadcastShardOperationFailed => "broadcast_shard_operation_failed",
            Self::FlushNotAllowed => "flush_not_allowed",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Identifies the cluster verb an error or retry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Index (create or overwrite) a document.
    Index,
    /// Read a single document.
    Get,
    /// Update an existing document.
    Update,
    /// Delete a document.
    Delete,
    /// Run a search query.
    Search,
    /// Install or extend an index mapping.
    PutMapping,
    /// Flush the translog of an index.
    Flush,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::Get => write!(f, "get"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Search => write!(f, "search"),
            Self::PutMapping => write!(f, "put_mapping"),
            Self::Flush => write!(f, "flush"),
        }
    }
}
