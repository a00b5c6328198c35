//! Retry orchestration for single cluster operations.
//!
//! A [`RetryEngine`] drives one logical operation through the
//! classify → retry → particular-handling loop:
//!
//! - success returns immediately, the operation is never re-entered
//! - transient infrastructure errors are retried after a fixed delay, with an
//!   optional translog flush first
//! - particular errors go to the verb's handler, which may recover a value,
//!   fail terminally, or ask to keep retrying
//! - anything unclassified fails fast
//!
//! Attempts are strictly sequential. A policy with `max_attempts = n` makes at
//! most `n + 1` physical calls.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use searchcore_types::{ClusterError, ErrorKind};
use tracing::{debug, error, warn};

use crate::classifier::{Classification, ErrorClassifier};
use crate::errors::DocumentError;
use crate::metrics::{MetricsHook, RetryContext};
use crate::translog::{FlushOutcome, TranslogFlush};

/// Immutable retry configuration for one call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    operation: String,
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` retries after the first call,
    /// waiting `delay` between consecutive calls.
    pub fn new(operation: impl Into<String>, max_attempts: u32, delay: Duration) -> Self {
        Self {
            operation: operation.into(),
            max_attempts,
            delay,
        }
    }

    /// Label used in logs, metrics and [`DocumentError::NoResponse`].
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Number of retries after the initial attempt.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Fixed delay between attempts.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Upper bound on physical calls: one initial attempt plus retries.
    pub const fn max_calls(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }
}

/// Result of handling a particular error.
#[derive(Debug)]
pub enum ParticularOutcome<T> {
    /// The condition resolved to a success value.
    Recovered(T),
    /// Terminal failure; surfaced to the caller as-is.
    Fail(DocumentError),
    /// The condition is recoverable after all. Retry as if it were transient.
    ContinueRetry,
}

type Handler<'a, T> =
    Box<dyn Fn(ClusterError) -> BoxFuture<'a, ParticularOutcome<T>> + Send + Sync + 'a>;

/// Per-verb table of particular errors and their handlers.
///
/// An error kind present in the table is particular for that verb and is
/// never blindly retried. Kinds absent from the table (and not transient)
/// are unclassified.
pub struct ParticularErrors<'a, T> {
    handlers: HashMap<ErrorKind, Handler<'a, T>>,
}

impl<'a, T: Send + 'a> ParticularErrors<'a, T> {
    /// Empty table: every non-transient error is unclassified.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register an async handler for `kind`.
    #[must_use]
    pub fn on<F, Fut>(mut self, kind: ErrorKind, handler: F) -> Self
    where
        F: Fn(ClusterError) -> Fut + Send + Sync + 'a,
        Fut: Future<Output = ParticularOutcome<T>> + Send + 'a,
    {
        let _ = self
            .handlers
            .insert(kind, Box::new(move |error| handler(error).boxed()));
        self
    }

    /// Fail terminally on `kind`, translating the cluster error.
    #[must_use]
    pub fn fail_with<F>(self, kind: ErrorKind, translate: F) -> Self
    where
        F: Fn(ClusterError) -> DocumentError + Send + Sync + 'a,
    {
        self.on(kind, move |error| {
            future::ready(ParticularOutcome::Fail(translate(error)))
        })
    }

    /// Treat `kind` as success, producing the value with `recover`.
    #[must_use]
    pub fn recover_with<F>(self, kind: ErrorKind, recover: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'a,
    {
        self.on(kind, move |_| future::ready(ParticularOutcome::Recovered(recover())))
    }

    async fn handle(&self, kind: ErrorKind, error: ClusterError) -> ParticularOutcome<T> {
        match self.handlers.get(&kind) {
            Some(handler) => handler(error).await,
            None => ParticularOutcome::Fail(DocumentError::Unclassified(error)),
        }
    }
}

impl<T> ParticularErrors<'_, T> {
    /// Whether `kind` is particular in this table.
    pub fn handles(&self, kind: ErrorKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

impl<'a, T: Send + 'a> Default for ParticularErrors<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ParticularErrors<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("ParticularErrors")
            .field("kinds", &kinds)
            .finish()
    }
}

/// What the loop does after a failed attempt.
enum Transition<T> {
    Finish(Result<T, DocumentError>),
    Retry {
        kind: ErrorKind,
        flush_translog: bool,
    },
}

/// Orchestrator driving one logical operation to a terminal outcome.
///
/// The engine is stateless between runs: the attempt counter lives inside
/// [`RetryEngine::run`]. Independent operations use independent engines.
pub struct RetryEngine<'a, T> {
    policy: RetryPolicy,
    classifier: &'a ErrorClassifier,
    particular: ParticularErrors<'a, T>,
    translog: Option<&'a dyn TranslogFlush>,
    metrics: Option<&'a dyn MetricsHook>,
}

impl<'a, T: Send + 'a> RetryEngine<'a, T> {
    /// Engine with an empty particular table, no translog flush and no metrics.
    pub fn new(policy: RetryPolicy, classifier: &'a ErrorClassifier) -> Self {
        Self {
            policy,
            classifier,
            particular: ParticularErrors::new(),
            translog: None,
            metrics: None,
        }
    }

    /// Replace the verb's table of particular errors.
    #[must_use]
    pub fn with_particular_errors(mut self, particular: ParticularErrors<'a, T>) -> Self {
        self.particular = particular;
        self
    }

    /// Flush coordinator invoked before retrying flush-triggering errors.
    #[must_use]
    pub const fn with_translog_flush(mut self, translog: &'a dyn TranslogFlush) -> Self {
        self.translog = Some(translog);
        self
    }

    /// Report every retry to `metrics`.
    #[must_use]
    pub const fn with_metrics_hook(self, metrics: &'a dyn MetricsHook) -> Self {
        self.with_optional_metrics_hook(Some(metrics))
    }

    /// Report every retry to `metrics`, if any.
    #[must_use]
    pub const fn with_optional_metrics_hook(
        mut self,
        metrics: Option<&'a dyn MetricsHook>,
    ) -> Self {
        self.metrics = metrics;
        self
    }

    /// Policy this engine runs under.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or reaches a terminal failure.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::NoResponse`] when the retry budget is spent
    /// - [`DocumentError::Unclassified`] for unrecognized errors, without retry
    /// - whatever a particular handler fails with
    pub async fn run<F, Fut>(&self, mut operation: F) -> Result<T, DocumentError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ClusterError>> + Send,
    {
        let label = self.policy.operation();
        let mut attempt: u32 = 0;

        loop {
            let last_error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = label,
                            attempt = attempt + 1,
                            "operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let (kind, flush_translog) = match self.transition(&last_error).await {
                Transition::Finish(outcome) => return outcome,
                Transition::Retry {
                    kind,
                    flush_translog,
                } => (kind, flush_translog),
            };

            if attempt >= self.policy.max_attempts() {
                error!(
                    operation = label,
                    attempts = attempt + 1,
                    error = %last_error,
                    "retries exhausted without a response from the cluster"
                );
                return Err(DocumentError::NoResponse {
                    operation: label.to_string(),
                    attempts: attempt + 1,
                    last_error,
                });
            }

            if flush_translog {
                self.flush_translog().await;
            }

            attempt += 1;
            let delay = self.policy.delay();
            if let Some(metrics) = self.metrics {
                metrics.on_retry_attempt(&RetryContext {
                    operation: label.to_string(),
                    attempt,
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error_kind: kind,
                });
            }
            warn!(
                operation = label,
                attempt,
                max_attempts = self.policy.max_attempts(),
                error_kind = %kind,
                error = %last_error,
                "retrying after {delay:?}"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn transition(&self, error: &ClusterError) -> Transition<T> {
        match self.classifier.classify(error, &self.particular) {
            Classification::Transient {
                kind,
                flush_translog,
            } => Transition::Retry {
                kind,
                flush_translog,
            },
            Classification::Particular(kind) => {
                debug!(
                    operation = self.policy.operation(),
                    error_kind = %kind,
                    "handling particular error"
                );
                match self.particular.handle(kind, error.clone()).await {
                    ParticularOutcome::Recovered(value) => Transition::Finish(Ok(value)),
                    ParticularOutcome::Fail(failure) => Transition::Finish(Err(failure)),
                    ParticularOutcome::ContinueRetry => Transition::Retry {
                        kind,
                        flush_translog: false,
                    },
                }
            }
            Classification::Unclassified => {
                warn!(
                    operation = self.policy.operation(),
                    error = %error,
                    "unclassified cluster error, not retrying"
                );
                Transition::Finish(Err(DocumentError::Unclassified(error.clone())))
            }
        }
    }

    /// Best-effort flush; its failure never aborts the outer retry.
    async fn flush_translog(&self) {
        let Some(translog) = self.translog else {
            debug!(
                operation = self.policy.operation(),
                "no translog flush configured, retrying without flush"
            );
            return;
        };

        match translog.flush().await {
            Ok(FlushOutcome::Flushed) => {
                debug!(operation = self.policy.operation(), "translog flushed");
            }
            Ok(FlushOutcome::Skipped(reason)) => {
                debug!(
                    operation = self.policy.operation(),
                    reason = %reason,
                    "translog flush skipped"
                );
            }
            Err(failure) => {
                warn!(
                    operation = self.policy.operation(),
                    error = %failure,
                    "translog flush failed, retrying anyway"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new("test_operation", max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn max_calls_is_one_more_than_max_attempts() {
        assert_eq!(fast_policy(0).max_calls(), 1);
        assert_eq!(fast_policy(5).max_calls(), 6);
        assert_eq!(fast_policy(u32::MAX).max_calls(), u32::MAX);
    }

    #[tokio::test]
    async fn first_attempt_success_calls_operation_once() {
        let classifier = ErrorClassifier::new();
        let engine = RetryEngine::new(fast_policy(3), &classifier);
        let counter = AtomicU32::new(0);

        let result = engine
            .run(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ClusterError>(42) }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn continue_retry_on_last_attempt_reports_no_response() {
        let classifier = ErrorClassifier::new();
        let particular = ParticularErrors::new().on(ErrorKind::VersionConflict, |_| async {
            ParticularOutcome::ContinueRetry
        });
        let engine = RetryEngine::<u32>::new(fast_policy(1), &classifier)
            .with_particular_errors(particular);
        let counter = AtomicU32::new(0);

        let result = engine
            .run(|| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ClusterError::version_conflict("doc-1", 2, 1)) }
            })
            .await;

        assert!(matches!(
            result,
            Err(DocumentError::NoResponse { attempts: 2, .. })
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn metrics_hook_receives_one_based_retry_numbers() {
        struct CapturingHook(Mutex<Vec<RetryContext>>);

        impl MetricsHook for CapturingHook {
            fn on_retry_attempt(&self, ctx: &RetryContext) {
                self.0.lock().unwrap().push(ctx.clone());
            }
        }

        let hook = CapturingHook(Mutex::new(Vec::new()));
        let classifier = ErrorClassifier::new();
        let engine = RetryEngine::new(fast_policy(4), &classifier).with_metrics_hook(&hook);
        let counter = Arc::new(AtomicU32::new(0));

        let result = engine
            .run(|| {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 3 {
                        Err(ClusterError::no_node_available())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        let contexts = hook.0.lock().unwrap();
        let attempts: Vec<u32> = contexts.iter().map(|ctx| ctx.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        assert!(contexts.iter().all(|ctx| ctx.operation == "test_operation"
            && ctx.delay_ms == 1
            && ctx.error_kind == ErrorKind::TransientNodeUnavailable));
    }

    #[tokio::test]
    async fn uncategorized_execution_without_translog_still_retries() {
        let classifier = ErrorClassifier::new();
        let engine = RetryEngine::new(fast_policy(2), &classifier);
        let counter = AtomicU32::new(0);

        let result = engine
            .run(|| {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count == 0 {
                        Err(ClusterError::uncategorized_execution("Failed execution"))
                    } else {
                        Ok(count)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(1));
    }

    #[test]
    fn particular_table_debug_lists_kinds() {
        let particular = ParticularErrors::<()>::new()
            .fail_with(ErrorKind::VersionConflict, |source| {
                DocumentError::VersionConflict { source }
            })
            .recover_with(ErrorKind::IndexMissing, || ());

        let rendered = format!("{particular:?}");

        assert_eq!(
            rendered,
            "ParticularErrors { kinds: [IndexMissing, VersionConflict] }"
        );
    }
}
