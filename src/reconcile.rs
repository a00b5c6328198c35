//! Idempotent-create reconciliation.
//!
//! A create retried after a lost acknowledgement can collide with its own
//! earlier attempt. When the cluster reports "document already exists", the
//! reconciler reads the stored document back and compares write-time
//! fingerprints: equal means the earlier attempt landed and the create
//! succeeded; different means a genuinely different document owns the id.

use searchcore_types::{
    ClusterError, DocumentId, IndexName, SearchCluster, UpdateTimestamp, WriteIntent,
};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::errors::DocumentError;
use crate::operations::WriteAck;

/// Why reconciliation could not confirm the intended write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A different write occupies the id, or one without a fingerprint.
    #[error("document {id} holds a different write than the one intended at {intended}")]
    Conflict {
        /// Id of the create being reconciled.
        id: DocumentId,
        /// Fingerprint found on the stored document.
        stored: Option<UpdateTimestamp>,
        /// Fingerprint of the create.
        intended: UpdateTimestamp,
    },

    /// The cluster reported the id as taken, but the read-back found nothing.
    #[error("document {id} reported as existing but not found on read-back")]
    Vanished {
        /// Id of the create being reconciled.
        id: DocumentId,
    },

    /// The read-back itself failed.
    #[error("read-back of document {id} failed: {source}")]
    Read {
        /// Id of the create being reconciled.
        id: DocumentId,
        /// Error the read-back failed with.
        #[source]
        source: ClusterError,
    },
}

impl From<ReconcileError> for DocumentError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::Conflict {
                id,
                stored,
                intended,
            } => Self::Conflict {
                id,
                stored,
                intended,
            },
            ReconcileError::Vanished { id } => Self::Reconciliation {
                id,
                reason: "document reported as existing but not found".to_string(),
            },
            ReconcileError::Read { source, .. } => Self::Unclassified(source),
        }
    }
}

/// Resolves ambiguous create outcomes by re-reading the target document.
///
/// Never mutates the stored document and never caches it: every call is one
/// fresh realtime read.
#[derive(Debug)]
pub struct WriteReconciler<'a, C> {
    cluster: &'a C,
}

impl<'a, C> WriteReconciler<'a, C>
where
    C: SearchCluster + Sync,
{
    /// Reconciler reading through `cluster`.
    pub const fn new(cluster: &'a C) -> Self {
        Self { cluster }
    }

    /// Decide whether `intent` is already persisted under `id`.
    #[instrument(name = "search.reconcile", skip_all, fields(index = %index, id = %id))]
    pub async fn reconcile(
        &self,
        index: &IndexName,
        id: &DocumentId,
        intent: &WriteIntent,
    ) -> Result<WriteAck, ReconcileError> {
        let stored = self
            .cluster
            .attempt_get(index, id, true)
            .await
            .map_err(|source| ReconcileError::Read {
                id: id.clone(),
                source,
            })?;

        let Some(stored) = stored else {
            warn!("document already exists but read-back found nothing");
            return Err(ReconcileError::Vanished { id: id.clone() });
        };

        if stored.update_timestamp() == Some(intent.update_timestamp()) {
            info!(
                version = %stored.version(),
                "existing document is the effect of this write, treating create as successful"
            );
            Ok(WriteAck::reconciled(&stored))
        } else {
            info!(
                stored = ?stored.update_timestamp(),
                intended = %intent.update_timestamp(),
                "existing document belongs to a different write"
            );
            Err(ReconcileError::Conflict {
                id: id.clone(),
                stored: stored.update_timestamp(),
                intended: intent.update_timestamp(),
            })
        }
    }
}
