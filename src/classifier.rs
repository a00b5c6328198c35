//! Mapping from cluster-reported errors to the engine's error taxonomy.
//!
//! Classification is a single lookup of the wire error type, falling back to
//! the direct cause when the immediate error is not recognized. The cause
//! chain is never walked further than one level.

use std::collections::{HashMap, HashSet};

use searchcore_types::{wire, ClusterError, ErrorKind};

use crate::retry::ParticularErrors;

/// How the retry engine must treat one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Infrastructure failure expected to clear on its own; retry it.
    Transient {
        /// Taxonomy entry of the failed attempt.
        kind: ErrorKind,
        /// Request a translog flush before the next attempt.
        flush_translog: bool,
    },
    /// Application-meaningful condition with a handler in the verb's table.
    Particular(ErrorKind),
    /// Anything else. Fail fast.
    Unclassified,
}

/// Maps [`ClusterError`]s to [`ErrorKind`]s and decides retryability.
///
/// The rule table is keyed on the wire `type` of the error and can be
/// extended per deployment, since wire names drift between cluster versions.
/// Which kinds require a translog flush before retrying is also configurable;
/// by default only [`ErrorKind::UncategorizedExecution`] does.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: HashMap<String, ErrorKind>,
    flush_triggers: HashSet<ErrorKind>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        let rules = [
            (wire::NODE_DISCONNECTED, ErrorKind::TransientNodeUnavailable),
            (wire::NO_NODE_AVAILABLE, ErrorKind::TransientNodeUnavailable),
            (wire::NO_SHARD_AVAILABLE, ErrorKind::TransientNodeUnavailable),
            (wire::CLUSTER_BLOCK, ErrorKind::TransientNodeUnavailable),
            (wire::UNCATEGORIZED_EXECUTION, ErrorKind::UncategorizedExecution),
            (wire::INDEX_NOT_FOUND, ErrorKind::IndexMissing),
            (wire::INDEX_MISSING, ErrorKind::IndexMissing),
            (wire::VERSION_CONFLICT, ErrorKind::VersionConflict),
            (wire::MAPPER_PARSING, ErrorKind::SchemaMismatch),
            (wire::MERGE_MAPPING, ErrorKind::SchemaMismatch),
            (wire::SEARCH_PHASE_EXECUTION, ErrorKind::SearchPhaseFailure),
            (wire::DOCUMENT_ALREADY_EXISTS, ErrorKind::DocumentAlreadyExists),
            (
                wire::BROADCAST_SHARD_OPERATION_FAILED,
                ErrorKind::BroadcastShardOperationFailed,
            ),
            (wire::FLUSH_NOT_ALLOWED_ENGINE, ErrorKind::FlushNotAllowed),
        ]
        .into_iter()
        .map(|(error_type, kind)| (error_type.to_string(), kind))
        .collect();

        Self {
            rules,
            flush_triggers: HashSet::from([ErrorKind::UncategorizedExecution]),
        }
    }
}

impl ErrorClassifier {
    /// Classifier with the default wire rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognize `error_type` as `kind`, replacing any existing rule for it.
    #[must_use]
    pub fn with_rule(mut self, error_type: impl Into<String>, kind: ErrorKind) -> Self {
        let _ = self.rules.insert(error_type.into(), kind);
        self
    }

    /// Treat `kind` as transient and flush the translog before retrying it.
    #[must_use]
    pub fn with_flush_trigger(mut self, kind: ErrorKind) -> Self {
        let _ = self.flush_triggers.insert(kind);
        self
    }

    /// Stop flushing the translog for `kind`.
    ///
    /// [`ErrorKind::UncategorizedExecution`] stays transient even without a
    /// flush; any other kind reverts to its normal classification.
    #[must_use]
    pub fn without_flush_trigger(mut self, kind: ErrorKind) -> Self {
        let _ = self.flush_triggers.remove(&kind);
        self
    }

    /// Resolve the taxonomy entry for `error`.
    ///
    /// Inspects the immediate error and, if unrecognized, its direct cause.
    pub fn kind_of(&self, error: &ClusterError) -> ErrorKind {
        match self.lookup(error) {
            ErrorKind::Other => error
                .cause()
                .map_or(ErrorKind::Other, |cause| self.lookup(cause)),
            kind => kind,
        }
    }

    /// Whether `error` would be retried regardless of the verb.
    pub fn is_transient(&self, error: &ClusterError) -> bool {
        self.transient_kind(self.kind_of(error))
    }

    /// Decide how the engine treats `error` given a verb's particular table.
    ///
    /// Transient kinds win over the table; a recognized kind without a
    /// handler is unclassified.
    pub fn classify<T>(
        &self,
        error: &ClusterError,
        particular: &ParticularErrors<'_, T>,
    ) -> Classification {
        let kind = self.kind_of(error);

        if self.transient_kind(kind) {
            Classification::Transient {
                kind,
                flush_translog: self.flush_triggers.contains(&kind),
            }
        } else if particular.handles(kind) {
            Classification::Particular(kind)
        } else {
            Classification::Unclassified
        }
    }

    fn lookup(&self, error: &ClusterError) -> ErrorKind {
        self.rules
            .get(error.error_type())
            .copied()
            .unwrap_or(ErrorKind::Other)
    }

    fn transient_kind(&self, kind: ErrorKind) -> bool {
        matches!(
            kind,
            ErrorKind::TransientNodeUnavailable | ErrorKind::UncategorizedExecution
        ) || self.flush_triggers.contains(&kind)
    }
}
