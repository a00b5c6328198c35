//! Observation of retry activity.

use searchcore_types::ErrorKind;

/// Context passed to [`MetricsHook::on_retry_attempt`].
///
/// `attempt` is the 1-based retry number: the first retry after the initial
/// call is attempt 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    /// Label of the retried operation (the policy's operation name).
    pub operation: String,
    /// Retry number, starting at 1.
    pub attempt: u32,
    /// Delay that will elapse before the retry.
    pub delay_ms: u64,
    /// Kind of the error that caused the retry.
    pub error_kind: ErrorKind,
}

/// Observation seam for retry activity.
///
/// Implementations forward to whatever metrics backend the application uses.
/// Called synchronously from the retry loop, so it should not block.
pub trait MetricsHook: Send + Sync {
    /// Called once per retry, before its delay elapses.
    fn on_retry_attempt(&self, ctx: &RetryContext);
}
