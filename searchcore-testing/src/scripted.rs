//! Deterministic per-verb fault scripts with call counters.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Mutex;

use searchcore_types::{
    Acknowledged, ClusterError, DocumentId, DocumentVersion, IndexAck, IndexName, MappingSchema,
    OpType, Operation, SearchCluster, SearchHits, SearchQuery, StoredDocument,
};
use serde_json::Value;
use tracing::debug;

/// One scripted outcome for the next call of a verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail without reaching the wrapped cluster.
    Fail(ClusterError),
    /// Forward the call and, if it succeeded, report `error` instead: the
    /// request landed but its acknowledgement was lost.
    LostAck(ClusterError),
}

#[derive(Debug, Default)]
struct Script {
    faults: HashMap<Operation, VecDeque<Fault>>,
    calls: HashMap<Operation, u32>,
}

/// Cluster wrapper that replays a fixed fault script per verb.
///
/// Each call to a verb pops the next scripted [`Fault`] for that verb; once
/// the script for a verb is empty, calls pass through to the wrapped
/// cluster. Every call is counted, faulted or not.
///
/// Op-type create and plain index requests share [`Operation::Index`].
///
/// # Examples
///
/// ```ignore
/// use searchcore_testing::ScriptedCluster;
/// use searchcore_types::{ClusterError, Operation};
///
/// let cluster = ScriptedCluster::new(InMemoryCluster::new())
///     .fail_times(Operation::Index, 4, ClusterError::cluster_blocked("recovering"));
/// ```
#[derive(Debug)]
pub struct ScriptedCluster<C> {
    inner: C,
    script: Mutex<Script>,
}

impl<C> ScriptedCluster<C> {
    /// Wrap `inner` with an empty script.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            script: Mutex::new(Script::default()),
        }
    }

    /// Append `fault` to the script for `operation`.
    #[must_use]
    pub fn then(self, operation: Operation, fault: Fault) -> Self {
        self.push(operation, fault);
        self
    }

    /// Fail the next `times` calls of `operation` with `error`.
    #[must_use]
    pub fn fail_times(self, operation: Operation, times: u32, error: ClusterError) -> Self {
        (0..times).fold(self, |cluster, _| {
            cluster.then(operation, Fault::Fail(error.clone()))
        })
    }

    /// Apply the next call of `operation` but report `error` to the caller.
    #[must_use]
    pub fn lose_ack(self, operation: Operation, error: ClusterError) -> Self {
        self.then(operation, Fault::LostAck(error))
    }

    /// Append `fault` to the script while the cluster is in use.
    pub fn push(&self, operation: Operation, fault: Fault) {
        self.script()
            .faults
            .entry(operation)
            .or_default()
            .push_back(fault);
    }

    /// Number of calls made to `operation` so far.
    pub fn calls(&self, operation: Operation) -> u32 {
        self.script().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Number of calls made across all verbs.
    pub fn total_calls(&self) -> u32 {
        self.script().calls.values().sum()
    }

    /// Scripted faults not yet consumed for `operation`.
    pub fn pending(&self, operation: Operation) -> usize {
        self.script()
            .faults
            .get(&operation)
            .map_or(0, VecDeque::len)
    }

    /// The wrapped cluster.
    pub const fn inner(&self) -> &C {
        &self.inner
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .expect("fault script mutex should not be poisoned")
    }

    fn next_fault(&self, operation: Operation) -> Option<Fault> {
        let fault = {
            let mut script = self.script();
            *script.calls.entry(operation).or_insert(0) += 1;
            script
                .faults
                .get_mut(&operation)
                .and_then(VecDeque::pop_front)
        };
        if let Some(fault) = &fault {
            debug!(operation = %operation, ?fault, "injecting scripted fault");
        }
        fault
    }
}

async fn replay<T, F>(fault: Option<Fault>, call: F) -> Result<T, ClusterError>
where
    F: Future<Output = Result<T, ClusterError>> + Send,
    T: Send,
{
    match fault {
        None => call.await,
        Some(Fault::Fail(error)) => Err(error),
        Some(Fault::LostAck(error)) => call.await.and(Err(error)),
    }
}

impl<C> SearchCluster for ScriptedCluster<C>
where
    C: SearchCluster + Sync,
{
    fn attempt_index(
        &self,
        index: &IndexName,
        id: &DocumentId,
        source: &Value,
        op_type: OpType,
        expected_version: Option<DocumentVersion>,
    ) -> impl Future<Output = Result<IndexAck, ClusterError>> + Send {
        let fault = self.next_fault(Operation::Index);
        replay(
            fault,
            self.inner
                .attempt_index(index, id, source, op_type, expected_version),
        )
    }

    fn attempt_get(
        &self,
        index: &IndexName,
        id: &DocumentId,
        realtime: bool,
    ) -> impl Future<Output = Result<Option<StoredDocument>, ClusterError>> + Send {
        let fault = self.next_fault(Operation::Get);
        replay(fault, self.inner.attempt_get(index, id, realtime))
    }

    fn attempt_update(
        &self,
        index: &IndexName,
        id: &DocumentId,
        source: &Value,
        expected_version: Option<DocumentVersion>,
    ) -> impl Future<Output = Result<IndexAck, ClusterError>> + Send {
        let fault = self.next_fault(Operation::Update);
        replay(
            fault,
            self.inner
                .attempt_update(index, id, source, expected_version),
        )
    }

    fn attempt_delete(
        &self,
        index: &IndexName,
        id: &DocumentId,
        expected_version: Option<DocumentVersion>,
    ) -> impl Future<Output = Result<IndexAck, ClusterError>> + Send {
        let fault = self.next_fault(Operation::Delete);
        replay(fault, self.inner.attempt_delete(index, id, expected_version))
    }

    fn attempt_search(
        &self,
        index: &IndexName,
        query: &SearchQuery,
    ) -> impl Future<Output = Result<SearchHits, ClusterError>> + Send {
        let fault = self.next_fault(Operation::Search);
        replay(fault, self.inner.attempt_search(index, query))
    }

    fn attempt_put_mapping(
        &self,
        index: &IndexName,
        schema: &MappingSchema,
    ) -> impl Future<Output = Result<Acknowledged, ClusterError>> + Send {
        let fault = self.next_fault(Operation::PutMapping);
        replay(fault, self.inner.attempt_put_mapping(index, schema))
    }

    fn attempt_flush(
        &self,
        index: &IndexName,
    ) -> impl Future<Output = Result<Acknowledged, ClusterError>> + Send {
        let fault = self.next_fault(Operation::Flush);
        replay(fault, self.inner.attempt_flush(index))
    }
}
