use searchcore_types::{ClusterError, DocumentId, ErrorKind, IndexName, UpdateTimestamp};
use thiserror::Error;

/// Error type for document operation failures.
///
/// Represents every terminal outcome a caller can see. Transient
/// infrastructure errors never appear here directly: the engine absorbs them
/// and only reports [`DocumentError::NoResponse`] once retries run out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// Target index absent at write time.
    ///
    /// Reads map a missing index to an empty result instead of this error.
    #[error("index {index} does not exist")]
    IndexMissing {
        /// Index the write targeted.
        index: IndexName,
        /// Error reported by the cluster.
        #[source]
        source: ClusterError,
    },

    /// Optimistic concurrency check failed.
    ///
    /// Another writer changed the document since the caller read it. Reload
    /// and retry at a higher level.
    #[error("version conflict: {source}")]
    VersionConflict {
        /// Error reported by the cluster.
        source: ClusterError,
    },

    /// Payload or mapping does not conform to the index's field typing.
    #[error("schema mismatch: {source}")]
    SchemaMismatch {
        /// Error reported by the cluster.
        source: ClusterError,
    },

    /// Query execution failed on the cluster.
    #[error("search phase failed: {source}")]
    SearchPhaseFailure {
        /// Error reported by the cluster.
        source: ClusterError,
    },

    /// Retries exhausted while only observing transient infrastructure errors.
    ///
    /// The true outcome of the request is unknown: a write may have been
    /// applied. Callers must re-check state rather than assume failure.
    #[error("no response from cluster for {operation} after {attempts} attempts")]
    NoResponse {
        /// Label of the verb that ran out of retries.
        operation: String,
        /// Physical calls made, including the first.
        attempts: u32,
        /// Error seen on the final call.
        #[source]
        last_error: ClusterError,
    },

    /// A create collided with a genuinely different, pre-existing document.
    #[error(
        "document {id} already exists with {}, intended {intended}",
        .stored.map_or_else(
            || "no update timestamp".to_string(),
            |stored| format!("update timestamp {stored}")
        )
    )]
    Conflict {
        /// Id both writes target.
        id: DocumentId,
        /// Fingerprint of the stored document; `None` when it carries none.
        stored: Option<UpdateTimestamp>,
        /// Fingerprint of the rejected create.
        intended: UpdateTimestamp,
    },

    /// Reconciliation of an ambiguous create could not reach a verdict.
    #[error("reconciliation of document {id} failed: {reason}")]
    Reconciliation {
        /// Id of the create being reconciled.
        id: DocumentId,
        /// What the read-back found.
        reason: String,
    },

    /// Error the classifier does not recognize, propagated unmodified.
    #[error(transparent)]
    Unclassified(ClusterError),
}

impl DocumentError {
    /// True when the caller cannot know whether the request took effect.
    pub const fn is_outcome_unknown(&self) -> bool {
        matches!(self, Self::NoResponse { .. })
    }

    /// The taxonomy entry this error corresponds to, if any.
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::IndexMissing { .. } => Some(ErrorKind::IndexMissing),
            Self::VersionConflict { .. } => Some(ErrorKind::VersionConflict),
            Self::SchemaMismatch { .. } => Some(ErrorKind::SchemaMismatch),
            Self::SearchPhaseFailure { .. } => Some(ErrorKind::SearchPhaseFailure),
            Self::Conflict { .. } => Some(ErrorKind::DocumentAlreadyExists),
            Self::NoResponse { .. } | Self::Reconciliation { .. } | Self::Unclassified(_) => None,
        }
    }
}
