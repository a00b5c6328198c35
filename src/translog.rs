//! Translog flush recovery for uncategorized execution failures.
//!
//! An uncategorized execution failure is suspected to race a translog replay
//! on the shard. Before retrying such a failure the outer engine asks the
//! cluster to flush the index translog. The flush runs in its own nested
//! [`RetryEngine`] with an independent [`RetryPolicy`]: it never consumes the
//! outer attempt budget, and its failure is advisory only.

use futures::future::BoxFuture;
use searchcore_types::{ErrorKind, IndexName, SearchCluster};
use tracing::instrument;

use crate::classifier::ErrorClassifier;
use crate::errors::DocumentError;
use crate::retry::{ParticularErrors, RetryEngine, RetryPolicy};

/// What a flush request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The cluster acknowledged the flush.
    Flushed,
    /// The shard refused or failed the flush; the outer retry proceeds anyway.
    Skipped(ErrorKind),
}

/// Object-safe handle the retry engine uses to request a flush.
pub trait TranslogFlush: Send + Sync {
    /// Request a flush; failures are reported, never retried by the caller.
    fn flush(&self) -> BoxFuture<'_, Result<FlushOutcome, DocumentError>>;
}

/// Nested retry engine bound to "flush the translog of this index".
pub struct TranslogFlushCoordinator<'a, C> {
    cluster: &'a C,
    index: &'a IndexName,
    policy: RetryPolicy,
    classifier: &'a ErrorClassifier,
}

impl<'a, C> TranslogFlushCoordinator<'a, C>
where
    C: SearchCluster + Sync,
{
    /// Coordinator flushing `index` under its own `policy`.
    pub const fn new(
        cluster: &'a C,
        index: &'a IndexName,
        policy: RetryPolicy,
        classifier: &'a ErrorClassifier,
    ) -> Self {
        Self {
            cluster,
            index,
            policy,
            classifier,
        }
    }

    /// Flush the index translog, retrying node-level failures.
    ///
    /// Broadcast shard failures and engines that refuse to flush are not
    /// retried; they resolve to [`FlushOutcome::Skipped`].
    #[instrument(name = "search.flush", skip_all, fields(index = %self.index))]
    pub async fn flush_translog(&self) -> Result<FlushOutcome, DocumentError> {
        let particular = ParticularErrors::new()
            .recover_with(ErrorKind::BroadcastShardOperationFailed, || {
                FlushOutcome::Skipped(ErrorKind::BroadcastShardOperationFailed)
            })
            .recover_with(ErrorKind::FlushNotAllowed, || {
                FlushOutcome::Skipped(ErrorKind::FlushNotAllowed)
            });
        let engine =
            RetryEngine::new(self.policy.clone(), self.classifier).with_particular_errors(particular);

        let (cluster, index) = (self.cluster, self.index);
        engine
            .run(move || async move {
                cluster
                    .attempt_flush(index)
                    .await
                    .map(|_| FlushOutcome::Flushed)
            })
            .await
    }
}

impl<C> TranslogFlush for TranslogFlushCoordinator<'_, C>
where
    C: SearchCluster + Sync,
{
    fn flush(&self) -> BoxFuture<'_, Result<FlushOutcome, DocumentError>> {
        Box::pin(self.flush_translog())
    }
}
