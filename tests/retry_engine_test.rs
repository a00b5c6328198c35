//! Behaviour of the retry loop in isolation, driven by closures instead of a
//! cluster so each property can be pinned to an exact call count.

use futures::future::BoxFuture;
use proptest::prelude::*;
use searchcore::{
    ClusterError, DocumentError, ErrorClassifier, ErrorKind, FlushOutcome, ParticularErrors,
    ParticularOutcome, RetryEngine, RetryPolicy, TranslogFlush,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn policy(max_attempts: u32, delay_ms: u64) -> RetryPolicy {
    RetryPolicy::new("test_operation", max_attempts, Duration::from_millis(delay_ms))
}

/// Translog flush double that records when it ran.
struct RecordingFlush {
    events: Arc<Mutex<Vec<&'static str>>>,
    fails: bool,
}

impl TranslogFlush for RecordingFlush {
    fn flush(&self) -> BoxFuture<'_, Result<FlushOutcome, DocumentError>> {
        self.events.lock().unwrap().push("flush");
        let outcome = if self.fails {
            Err(DocumentError::NoResponse {
                operation: "flush".to_string(),
                attempts: 4,
                last_error: ClusterError::no_node_available(),
            })
        } else {
            Ok(FlushOutcome::Flushed)
        };
        Box::pin(async move { outcome })
    }
}

#[tokio::test]
async fn first_attempt_success_returns_without_retrying() {
    // Given: an engine with a generous retry budget
    let classifier = ErrorClassifier::new();
    let engine = RetryEngine::new(policy(5, 100), &classifier);
    let calls = AtomicU32::new(0);

    // When: the operation succeeds immediately
    let result = engine
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ClusterError>("stored") }
        })
        .await;

    // Then: the value is returned after exactly one call
    assert_eq!(result, Ok("stored"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

proptest! {
    #[test]
    fn persistent_transient_failures_make_max_attempts_plus_one_calls(max_attempts in 0u32..8) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .expect("runtime");
        let classifier = ErrorClassifier::new();
        let engine = RetryEngine::<()>::new(policy(max_attempts, 250), &classifier);
        let calls = AtomicU32::new(0);

        let result = runtime.block_on(engine.run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ClusterError::no_node_available()) }
        }));

        prop_assert_eq!(calls.load(Ordering::SeqCst), max_attempts + 1);
        match result {
            Err(DocumentError::NoResponse { operation, attempts, last_error }) => {
                prop_assert_eq!(operation, "test_operation");
                prop_assert_eq!(attempts, max_attempts + 1);
                prop_assert_eq!(last_error, ClusterError::no_node_available());
            }
            other => prop_assert!(false, "expected NoResponse, got {:?}", other),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn retries_wait_the_fixed_delay_between_attempts() {
    // Given: three transient failures before success with a 200ms delay
    let classifier = ErrorClassifier::new();
    let engine = RetryEngine::new(policy(5, 200), &classifier);
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    // When: the engine runs to success
    let result = engine
        .run(|| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 3 {
                    Err(ClusterError::node_disconnected("node-1"))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

    // Then: three delays elapsed, not more and not exponentially growing
    assert_eq!(result, Ok(3));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(700), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn unclassified_error_fails_fast_with_the_original_error() {
    // Given: an error type nobody recognizes, with no recognizable cause
    let classifier = ErrorClassifier::new();
    let engine = RetryEngine::<()>::new(policy(5, 100), &classifier);
    let calls = AtomicU32::new(0);
    let unknown = ClusterError::new("illegal_state_exception", "shard is closed");

    // When: the operation fails with it
    let result = engine
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            let error = unknown.clone();
            async move { Err(error) }
        })
        .await;

    // Then: it propagates unmodified after a single call
    assert_eq!(result, Err(DocumentError::Unclassified(unknown.clone())));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn recognized_kind_without_handler_is_unclassified() {
    // Given: a version conflict, but a verb that has no handler for it
    let classifier = ErrorClassifier::new();
    let engine = RetryEngine::<()>::new(policy(5, 100), &classifier);
    let calls = AtomicU32::new(0);

    // When: the operation fails with a version conflict
    let result = engine
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ClusterError::version_conflict("doc-1", 3, 2)) }
        })
        .await;

    // Then: it is not retried
    assert!(matches!(result, Err(DocumentError::Unclassified(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn particular_failure_is_surfaced_without_retry() {
    // Given: a verb that treats version conflicts as terminal
    let classifier = ErrorClassifier::new();
    let particular = ParticularErrors::new().fail_with(ErrorKind::VersionConflict, |source| {
        DocumentError::VersionConflict { source }
    });
    let engine =
        RetryEngine::<()>::new(policy(5, 100), &classifier).with_particular_errors(particular);
    let calls = AtomicU32::new(0);

    // When: the operation reports a conflict
    let result = engine
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ClusterError::version_conflict("doc-1", 3, 2)) }
        })
        .await;

    // Then: the handler's error comes back after one call
    assert_eq!(
        result,
        Err(DocumentError::VersionConflict {
            source: ClusterError::version_conflict("doc-1", 3, 2),
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn particular_recovery_is_returned_as_success() {
    // Given: a verb that reads a missing index as an empty result
    let classifier = ErrorClassifier::new();
    let particular = ParticularErrors::new().recover_with(ErrorKind::IndexMissing, Vec::new);
    let engine = RetryEngine::<Vec<u32>>::new(policy(5, 100), &classifier)
        .with_particular_errors(particular);

    // When: the index is missing
    let result = engine
        .run(|| async { Err(ClusterError::index_not_found("cells")) })
        .await;

    // Then: the substitute value is a success
    assert_eq!(result, Ok(Vec::new()));
}

#[tokio::test(start_paused = true)]
async fn continue_retry_consumes_an_attempt_and_keeps_going() {
    // Given: a handler that asks the engine to keep retrying
    let classifier = ErrorClassifier::new();
    let handled = AtomicU32::new(0);
    let handled_ref = &handled;
    let particular = ParticularErrors::new().on(ErrorKind::DocumentAlreadyExists, move |_| {
        handled_ref.fetch_add(1, Ordering::SeqCst);
        async { ParticularOutcome::ContinueRetry }
    });
    let engine = RetryEngine::new(policy(3, 100), &classifier).with_particular_errors(particular);
    let calls = AtomicU32::new(0);

    // When: the first two attempts hit the particular condition
    let result = engine
        .run(|| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(ClusterError::document_already_exists("doc-1"))
                } else {
                    Ok("created")
                }
            }
        })
        .await;

    // Then: the third physical call succeeds
    assert_eq!(result, Ok("created"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(handled.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn continue_retry_then_transient_then_success_handles_once() {
    // Given: a particular condition that turns out recoverable
    let classifier = ErrorClassifier::new();
    let handled = AtomicU32::new(0);
    let handled_ref = &handled;
    let particular = ParticularErrors::new().on(ErrorKind::VersionConflict, move |_| {
        handled_ref.fetch_add(1, Ordering::SeqCst);
        async { ParticularOutcome::ContinueRetry }
    });
    let engine = RetryEngine::new(policy(3, 100), &classifier).with_particular_errors(particular);
    let calls = AtomicU32::new(0);

    // When: the particular error is followed by a transient one, then success
    let result = engine
        .run(|| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match call {
                    0 => Err(ClusterError::version_conflict("doc-1", 3, 2)),
                    1 => Err(ClusterError::no_shard_available("cells")),
                    _ => Ok(call),
                }
            }
        })
        .await;

    // Then: three calls, one handler invocation, success
    assert_eq!(result, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn uncategorized_execution_flushes_before_the_next_attempt() {
    // Given: an engine with a recording translog flush
    let classifier = ErrorClassifier::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let flush = RecordingFlush {
        events: Arc::clone(&events),
        fails: false,
    };
    let engine = RetryEngine::new(policy(3, 100), &classifier).with_translog_flush(&flush);

    // When: the first attempt fails with an uncategorized execution error
    let result = engine
        .run(|| {
            let mut log = events.lock().unwrap();
            log.push("attempt");
            let first = log.len() == 1;
            async move {
                if first {
                    Err(ClusterError::uncategorized_execution("Failed execution"))
                } else {
                    Ok(())
                }
            }
        })
        .await;

    // Then: the flush ran between the two attempts
    assert_eq!(result, Ok(()));
    assert_eq!(*events.lock().unwrap(), vec!["attempt", "flush", "attempt"]);
}

#[tokio::test(start_paused = true)]
async fn failed_flush_never_aborts_the_outer_retry() {
    // Given: a translog flush that always fails
    let classifier = ErrorClassifier::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let flush = RecordingFlush {
        events: Arc::clone(&events),
        fails: true,
    };
    let engine = RetryEngine::new(policy(3, 100), &classifier).with_translog_flush(&flush);
    let calls = AtomicU32::new(0);

    // When: two uncategorized failures precede success
    let result = engine
        .run(|| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call < 2 {
                    Err(ClusterError::uncategorized_execution("Failed execution"))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

    // Then: the operation still succeeds and both flushes were attempted
    assert_eq!(result, Ok(2));
    assert_eq!(
        events.lock().unwrap().iter().filter(|event| **event == "flush").count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn node_failures_never_request_a_flush() {
    // Given: an engine with a recording translog flush
    let classifier = ErrorClassifier::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let flush = RecordingFlush {
        events: Arc::clone(&events),
        fails: false,
    };
    let engine = RetryEngine::new(policy(3, 100), &classifier).with_translog_flush(&flush);
    let calls = AtomicU32::new(0);

    // When: a plain node failure precedes success
    let result = engine
        .run(|| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(ClusterError::cluster_blocked("SERVICE_UNAVAILABLE/1/state not recovered"))
                } else {
                    Ok(call)
                }
            }
        })
        .await;

    // Then: no flush was requested
    assert_eq!(result, Ok(1));
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhaustion_does_not_flush_when_no_retry_follows() {
    // Given: no retries allowed at all
    let classifier = ErrorClassifier::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let flush = RecordingFlush {
        events: Arc::clone(&events),
        fails: false,
    };
    let engine = RetryEngine::<()>::new(policy(0, 100), &classifier).with_translog_flush(&flush);

    // When: the only attempt fails with an uncategorized execution error
    let result = engine
        .run(|| async { Err(ClusterError::uncategorized_execution("Failed execution")) })
        .await;

    // Then: the caller learns the outcome is unknown and no flush was wasted
    assert!(result.as_ref().is_err_and(DocumentError::is_outcome_unknown));
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn wrapped_cause_is_classified_one_level_deep() {
    // Given: a verb that treats a missing index as empty
    let classifier = ErrorClassifier::new();
    let particular = ParticularErrors::new().recover_with(ErrorKind::IndexMissing, || 0_u32);
    let engine = RetryEngine::new(policy(3, 100), &classifier).with_particular_errors(particular);

    // When: the missing index arrives wrapped in a settings error
    let result = engine
        .run(|| async {
            Err(ClusterError::settings(
                "failed to resolve index",
                ClusterError::index_not_found("cells"),
            ))
        })
        .await;

    // Then: the cause decides the classification
    assert_eq!(result, Ok(0));
}

#[tokio::test]
async fn cause_two_levels_deep_is_not_inspected() {
    // Given: a verb that treats a missing index as empty
    let classifier = ErrorClassifier::new();
    let particular = ParticularErrors::new().recover_with(ErrorKind::IndexMissing, || 0_u32);
    let engine = RetryEngine::new(policy(3, 100), &classifier).with_particular_errors(particular);
    let nested = ClusterError::remote_transport(
        "node-3",
        ClusterError::new("wrapper_exception", "wrapped")
            .with_cause(ClusterError::index_not_found("cells")),
    );

    // When: the missing index is buried two levels deep
    let result = engine
        .run(|| {
            let error = nested.clone();
            async move { Err(error) }
        })
        .await;

    // Then: it is not recognized
    assert_eq!(result, Err(DocumentError::Unclassified(nested.clone())));
}
