//! Per-verb document operations bound to one index.
//!
//! Every verb wires the classifier, a fresh [`RetryEngine`] and its own table
//! of particular errors together. Reads treat a missing index as "nothing
//! there yet"; writes treat it as a caller error.

use std::fmt;
use std::sync::Arc;

use searchcore_types::{
    Acknowledged, ClusterError, DocumentId, DocumentVersion, ErrorKind, IndexAck, IndexName,
    MappingSchema, OpType, SearchCluster, SearchHits, SearchQuery, StoredDocument,
    WriteIntent, WriteResult,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::classifier::ErrorClassifier;
use crate::config::RetrySettings;
use crate::errors::DocumentError;
use crate::metrics::MetricsHook;
use crate::reconcile::{ReconcileError, WriteReconciler};
use crate::retry::{ParticularErrors, ParticularOutcome, RetryEngine};
use crate::translog::TranslogFlushCoordinator;

/// Confirmed outcome of a single-document write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    id: DocumentId,
    version: DocumentVersion,
    result: WriteResult,
    reconciled: bool,
}

impl WriteAck {
    /// Success inferred from a read-back of an already persisted create.
    pub fn reconciled(stored: &StoredDocument) -> Self {
        Self {
            id: stored.id().clone(),
            version: stored.version(),
            result: WriteResult::Created,
            reconciled: true,
        }
    }

    /// Id of the written document.
    pub const fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Version of the document after the write.
    pub const fn version(&self) -> DocumentVersion {
        self.version
    }

    /// What the write did to the document.
    pub const fn result(&self) -> WriteResult {
        self.result
    }

    /// True when the acknowledgement was lost and the write was confirmed by
    /// reading the document back.
    pub const fn is_reconciled(&self) -> bool {
        self.reconciled
    }
}

impl From<IndexAck> for WriteAck {
    fn from(ack: IndexAck) -> Self {
        Self {
            id: ack.id,
            version: ack.version,
            result: ack.result,
            reconciled: false,
        }
    }
}

/// Entry point for document verbs against one index.
///
/// Holds no state between calls besides its configuration, so concurrent
/// verbs on the same value are independent operations.
///
/// # Example
///
/// ```rust,no_run
/// # use searchcore::{DocumentOperations, IndexName, DocumentId, WriteIntent, SearchCluster};
/// # async fn example<C: SearchCluster + Sync>(cluster: &C) -> Result<(), Box<dyn std::error::Error>> {
/// let index = IndexName::try_new("cells")?;
/// let operations = DocumentOperations::new(cluster, index);
///
/// let id = DocumentId::try_new("cell-1")?;
/// let intent = WriteIntent::stamped_now(serde_json::Map::new());
/// let ack = operations.create(&id, &intent).await?;
/// assert_eq!(ack.id(), &id);
/// # Ok(())
/// # }
/// ```
pub struct DocumentOperations<'c, C> {
    cluster: &'c C,
    index: IndexName,
    settings: RetrySettings,
    classifier: ErrorClassifier,
    metrics: Option<Arc<dyn MetricsHook>>,
}

impl<C> fmt::Debug for DocumentOperations<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentOperations")
            .field("index", &self.index)
            .field("settings", &self.settings)
            .field("classifier", &self.classifier)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl<'c, C> DocumentOperations<'c, C>
where
    C: SearchCluster + Sync,
{
    /// Operations on `index` with default settings and classifier.
    pub fn new(cluster: &'c C, index: IndexName) -> Self {
        Self {
            cluster,
            index,
            settings: RetrySettings::default(),
            classifier: ErrorClassifier::default(),
            metrics: None,
        }
    }

    /// Retry budgets and delays for every verb.
    #[must_use]
    pub const fn with_settings(mut self, settings: RetrySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Classifier deciding which errors are retried.
    #[must_use]
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Report every retry of every verb to `metrics`.
    #[must_use]
    pub fn with_metrics_hook(mut self, metrics: Arc<dyn MetricsHook>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Index every verb targets.
    pub const fn index(&self) -> &IndexName {
        &self.index
    }

    /// Settings the verbs run under.
    pub const fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Realtime read of one document.
    ///
    /// A missing index reads as a missing document.
    #[instrument(name = "search.get", skip_all, fields(index = %self.index, id = %id))]
    pub async fn get(&self, id: &DocumentId) -> Result<Option<StoredDocument>, DocumentError> {
        let translog = self.translog();
        let particular = ParticularErrors::new().recover_with(ErrorKind::IndexMissing, || None);
        let engine = self
            .engine("get", &translog)
            .with_particular_errors(particular);

        let (cluster, index) = (self.cluster, &self.index);
        engine
            .run(move || cluster.attempt_get(index, id, true))
            .await
    }

    /// Run `query` against the index.
    ///
    /// A missing index yields no hits.
    #[instrument(name = "search.search", skip_all, fields(index = %self.index))]
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchHits, DocumentError> {
        let translog = self.translog();
        let particular = ParticularErrors::new()
            .recover_with(ErrorKind::IndexMissing, SearchHits::empty)
            .fail_with(ErrorKind::SearchPhaseFailure, |source| {
                DocumentError::SearchPhaseFailure { source }
            });
        let engine = self
            .engine("search", &translog)
            .with_particular_errors(particular);

        let (cluster, index) = (self.cluster, &self.index);
        engine
            .run(move || cluster.attempt_search(index, query))
            .await
    }

    /// Create a new document, failing if the id holds a different write.
    ///
    /// When a retried create reports that the document already exists, the
    /// stored document is read back. If it carries the intent's update
    /// timestamp the earlier attempt landed and the create succeeds with
    /// [`WriteAck::is_reconciled`] set.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::Conflict`] when a different write owns the id
    /// - [`DocumentError::IndexMissing`] when the index does not exist
    /// - [`DocumentError::SchemaMismatch`] when the body violates the mapping
    /// - [`DocumentError::NoResponse`] when the outcome could not be determined
    #[instrument(name = "search.create", skip_all, fields(index = %self.index, id = %id))]
    pub async fn create(
        &self,
        id: &DocumentId,
        intent: &WriteIntent,
    ) -> Result<WriteAck, DocumentError> {
        let translog = self.translog();
        let reconciler = WriteReconciler::new(self.cluster);
        let (reconciler, classifier, index) = (&reconciler, &self.classifier, &self.index);

        let particular = self
            .write_particulars()
            .on(ErrorKind::DocumentAlreadyExists, move |_| async move {
                match reconciler.reconcile(index, id, intent).await {
                    Ok(ack) => ParticularOutcome::Recovered(ack),
                    Err(ReconcileError::Read { source, .. }) if classifier.is_transient(&source) => {
                        ParticularOutcome::ContinueRetry
                    }
                    Err(error) => ParticularOutcome::Fail(error.into()),
                }
            })
            .fail_with(ErrorKind::SchemaMismatch, |source| {
                DocumentError::SchemaMismatch { source }
            });
        let engine = self
            .engine("create", &translog)
            .with_particular_errors(particular);

        let cluster = self.cluster;
        let source = intent.to_source();
        let source = &source;
        engine
            .run(move || async move {
                cluster
                    .attempt_index(index, id, source, OpType::Create, None)
                    .await
                    .map(WriteAck::from)
            })
            .await
    }

    /// Replace the body of an existing document.
    ///
    /// With `expected_version` set the update only applies if the stored
    /// document is still at that version.
    #[instrument(name = "search.update", skip_all, fields(index = %self.index, id = %id))]
    pub async fn update(
        &self,
        id: &DocumentId,
        intent: &WriteIntent,
        expected_version: Option<DocumentVersion>,
    ) -> Result<WriteAck, DocumentError> {
        let translog = self.translog();
        let particular = self
            .write_particulars()
            .fail_with(ErrorKind::VersionConflict, |source| {
                DocumentError::VersionConflict { source }
            })
            .fail_with(ErrorKind::SchemaMismatch, |source| {
                DocumentError::SchemaMismatch { source }
            });
        let engine = self
            .engine("update", &translog)
            .with_particular_errors(particular);

        let (cluster, index) = (self.cluster, &self.index);
        let source = intent.to_source();
        let source = &source;
        engine
            .run(move || async move {
                cluster
                    .attempt_update(index, id, source, expected_version)
                    .await
                    .map(WriteAck::from)
            })
            .await
    }

    /// Delete a document, optionally guarded by `expected_version`.
    #[instrument(name = "search.delete", skip_all, fields(index = %self.index, id = %id))]
    pub async fn delete(
        &self,
        id: &DocumentId,
        expected_version: Option<DocumentVersion>,
    ) -> Result<WriteAck, DocumentError> {
        let translog = self.translog();
        let particular = self
            .write_particulars()
            .fail_with(ErrorKind::VersionConflict, |source| {
                DocumentError::VersionConflict { source }
            });
        let engine = self
            .engine("delete", &translog)
            .with_particular_errors(particular);

        let (cluster, index) = (self.cluster, &self.index);
        engine
            .run(move || async move {
                cluster
                    .attempt_delete(index, id, expected_version)
                    .await
                    .map(WriteAck::from)
            })
            .await
    }

    /// Install or extend the index mapping.
    #[instrument(name = "search.put_mapping", skip_all, fields(index = %self.index))]
    pub async fn put_mapping(&self, schema: &MappingSchema) -> Result<Acknowledged, DocumentError> {
        let translog = self.translog();
        let particular = self
            .write_particulars()
            .fail_with(ErrorKind::SchemaMismatch, |source| {
                DocumentError::SchemaMismatch { source }
            });
        let engine = self
            .engine("put_mapping", &translog)
            .with_particular_errors(particular);

        let (cluster, index) = (self.cluster, &self.index);
        engine
            .run(move || cluster.attempt_put_mapping(index, schema))
            .await
    }

    /// Particular table shared by every write: a missing index is terminal.
    fn write_particulars<'a, T: Send + 'a>(&'a self) -> ParticularErrors<'a, T> {
        let index = &self.index;
        ParticularErrors::new().fail_with(ErrorKind::IndexMissing, move |source: ClusterError| {
            DocumentError::IndexMissing {
                index: index.clone(),
                source,
            }
        })
    }

    fn translog(&self) -> TranslogFlushCoordinator<'_, C> {
        TranslogFlushCoordinator::new(
            self.cluster,
            &self.index,
            self.settings.flush_policy(),
            &self.classifier,
        )
    }

    fn engine<'a, T: Send + 'a>(
        &'a self,
        operation: &str,
        translog: &'a TranslogFlushCoordinator<'a, C>,
    ) -> RetryEngine<'a, T> {
        RetryEngine::new(self.settings.policy(operation), &self.classifier)
            .with_translog_flush(translog)
            .with_optional_metrics_hook(self.metrics.as_deref())
    }
}
