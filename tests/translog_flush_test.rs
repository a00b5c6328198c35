//! Translog flush recovery as seen through document operations.

use searchcore::{
    ClusterError, DocumentId, DocumentOperations, ErrorClassifier, ErrorKind, FlushOutcome,
    IndexName, MappingSchema, MaxRetryAttempts, OpType, Operation, RetryDelayMs, RetrySettings,
    SearchCluster, TranslogFlushCoordinator, UpdateTimestamp, WriteIntent,
};
use searchcore_memory::InMemoryCluster;
use searchcore_testing::ScriptedCluster;
use serde_json::{json, Map};

fn index() -> IndexName {
    IndexName::try_new("cells").expect("valid index name")
}

fn id() -> DocumentId {
    DocumentId::try_new("doc-1").expect("valid document id")
}

fn settings() -> RetrySettings {
    RetrySettings::new(
        MaxRetryAttempts::try_new(3).expect("valid attempts"),
        RetryDelayMs::try_new(500).expect("valid delay"),
    )
    .with_flush(
        MaxRetryAttempts::try_new(2).expect("valid attempts"),
        RetryDelayMs::try_new(100).expect("valid delay"),
    )
}

async fn seeded() -> InMemoryCluster {
    let cluster = InMemoryCluster::new();
    cluster
        .create_index(&index(), MappingSchema::new())
        .expect("fresh index");
    let _ = cluster
        .attempt_index(&index(), &id(), &json!({"u": 1}), OpType::Index, None)
        .await
        .expect("seed document");
    cluster
}

fn intent() -> WriteIntent {
    WriteIntent::new(Map::new(), UpdateTimestamp::new(2))
}

#[tokio::test(start_paused = true)]
async fn uncategorized_execution_flushes_then_retries_update() {
    // Given: an update whose first attempt races a translog replay
    let cluster = ScriptedCluster::new(seeded().await).fail_times(
        Operation::Update,
        1,
        ClusterError::uncategorized_execution("Failed execution"),
    );
    let operations = DocumentOperations::new(&cluster, index()).with_settings(settings());

    // When: the caller updates the document
    let ack = operations
        .update(&id(), &intent(), None)
        .await
        .expect("update succeeds after flush");

    // Then: one flush ran and the second attempt landed
    assert_eq!(cluster.inner().flush_count(&index()), 1);
    assert_eq!(cluster.calls(Operation::Update), 2);
    assert!(!ack.is_reconciled());
}

#[tokio::test(start_paused = true)]
async fn refused_flush_is_skipped_and_the_retry_proceeds() {
    // Given: an engine that refuses to flush while the update races a replay
    let cluster = ScriptedCluster::new(seeded().await)
        .fail_times(
            Operation::Update,
            1,
            ClusterError::uncategorized_execution("Failed execution"),
        )
        .fail_times(Operation::Flush, 1, ClusterError::flush_not_allowed("cells"));
    let operations = DocumentOperations::new(&cluster, index()).with_settings(settings());

    // When: the caller updates the document
    let result = operations.update(&id(), &intent(), None).await;

    // Then: the flush was tried once, not retried, and the update still succeeded
    assert!(result.is_ok());
    assert_eq!(cluster.calls(Operation::Flush), 1);
    assert_eq!(cluster.inner().flush_count(&index()), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_flush_is_swallowed() {
    // Given: a flush that never gets through and a flush budget of two retries
    let cluster = ScriptedCluster::new(seeded().await)
        .fail_times(
            Operation::Delete,
            1,
            ClusterError::uncategorized_execution("Failed execution"),
        )
        .fail_times(Operation::Flush, 10, ClusterError::no_node_available());
    let operations = DocumentOperations::new(&cluster, index()).with_settings(settings());

    // When: the caller deletes the document
    let result = operations.delete(&id(), None).await;

    // Then: the nested engine spent its own budget and the delete went ahead
    assert!(result.is_ok(), "unexpected {result:?}");
    assert_eq!(cluster.calls(Operation::Flush), 3);
    assert_eq!(cluster.calls(Operation::Delete), 2);
}

#[tokio::test(start_paused = true)]
async fn coordinator_retries_transient_node_failures() {
    // Given: a flush that first hits an unavailable node
    let cluster = ScriptedCluster::new(seeded().await).fail_times(
        Operation::Flush,
        1,
        ClusterError::node_disconnected("node-1"),
    );
    let classifier = ErrorClassifier::new();
    let cells = index();
    let coordinator =
        TranslogFlushCoordinator::new(&cluster, &cells, settings().flush_policy(), &classifier);

    // When: flushing
    let outcome = coordinator.flush_translog().await;

    // Then: the second attempt flushed
    assert_eq!(outcome, Ok(FlushOutcome::Flushed));
    assert_eq!(cluster.calls(Operation::Flush), 2);
}

#[tokio::test(start_paused = true)]
async fn coordinator_skips_on_broadcast_shard_failure() {
    let cluster = ScriptedCluster::new(seeded().await).fail_times(
        Operation::Flush,
        1,
        ClusterError::broadcast_shard_operation_failed("cells"),
    );
    let classifier = ErrorClassifier::new();
    let cells = index();
    let coordinator =
        TranslogFlushCoordinator::new(&cluster, &cells, settings().flush_policy(), &classifier);

    let outcome = coordinator.flush_translog().await;

    assert_eq!(
        outcome,
        Ok(FlushOutcome::Skipped(ErrorKind::BroadcastShardOperationFailed))
    );
    assert_eq!(cluster.calls(Operation::Flush), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_flush_trigger_flushes_for_other_kinds() {
    // Given: a deployment that also flushes after shard unavailability
    let cluster = ScriptedCluster::new(seeded().await).fail_times(
        Operation::Update,
        1,
        ClusterError::no_shard_available("cells"),
    );
    let classifier =
        ErrorClassifier::new().with_flush_trigger(ErrorKind::TransientNodeUnavailable);
    let operations = DocumentOperations::new(&cluster, index())
        .with_settings(settings())
        .with_classifier(classifier);

    // When: the caller updates the document
    let result = operations.update(&id(), &intent(), None).await;

    // Then: the configured trigger flushed before the retry
    assert!(result.is_ok());
    assert_eq!(cluster.inner().flush_count(&index()), 1);
}

#[tokio::test(start_paused = true)]
async fn node_failures_do_not_flush_by_default() {
    let cluster = ScriptedCluster::new(seeded().await).fail_times(
        Operation::Update,
        1,
        ClusterError::no_shard_available("cells"),
    );
    let operations = DocumentOperations::new(&cluster, index()).with_settings(settings());

    let result = operations.update(&id(), &intent(), None).await;

    assert!(result.is_ok());
    assert_eq!(cluster.calls(Operation::Flush), 0);
}
