#![forbid(invalid_value, overflowing_literals, unconditional_recursion, unsafe_code)]
#![deny(
    bad_style,
    deprecated,
    meta_variable_misuse,
    non_ascii_idents,
    rust_2018_idioms,
    unreachable_code,
    unused_must_use
)]

//! Resilient request engine for clustered document search.
//!
//! Every document verb runs through a [`RetryEngine`] that classifies each
//! cluster error, retries transient infrastructure failures after a fixed
//! delay, hands application-meaningful conditions to a per-verb table of
//! [`ParticularErrors`], and fails fast on anything it does not recognize.
//!
//! Two recoveries sit on top of the loop:
//!
//! - uncategorized execution failures trigger a best-effort translog flush
//!   ([`TranslogFlushCoordinator`]) before the next attempt
//! - a create whose acknowledgement was lost is confirmed by reading the
//!   document back and comparing update timestamps ([`WriteReconciler`])
//!
//! Callers normally go through [`DocumentOperations`], bound to one index.
//!
//! # Example
//!
//! ```rust,no_run
//! use searchcore::{DocumentError, DocumentId, DocumentOperations, IndexName, SearchCluster, WriteIntent};
//!
//! # async fn example<C: SearchCluster + Sync>(cluster: &C) -> Result<(), Box<dyn std::error::Error>> {
//! let operations = DocumentOperations::new(cluster, IndexName::try_new("cells")?);
//! let id = DocumentId::try_new("cell-1")?;
//! let intent = WriteIntent::stamped_now(serde_json::Map::new());
//!
//! match operations.create(&id, &intent).await {
//!     Ok(ack) => println!("stored version {}", ack.version()),
//!     Err(error) if error.is_outcome_unknown() => println!("re-check state: {error}"),
//!     Err(error) => return Err(error.into()),
//! }
//! # Ok(())
//! # }
//! ```

mod classifier;
mod config;
mod errors;
mod metrics;
mod operations;
mod reconcile;
mod retry;
mod translog;

pub use classifier::{Classification, ErrorClassifier};
pub use config::{
    ConfigError, MaxRetryAttempts, MaxRetryAttemptsError, RetryDelayMs, RetryDelayMsError,
    RetrySettings, ENV_DELAY_MS, ENV_FLUSH_DELAY_MS, ENV_FLUSH_MAX_ATTEMPTS, ENV_MAX_ATTEMPTS,
};
pub use errors::DocumentError;
pub use metrics::{MetricsHook, RetryContext};
pub use operations::{DocumentOperations, WriteAck};
pub use reconcile::{ReconcileError, WriteReconciler};
pub use retry::{ParticularErrors, ParticularOutcome, RetryEngine, RetryPolicy};
pub use translog::{FlushOutcome, TranslogFlush, TranslogFlushCoordinator};

pub use searchcore_types::{
    wire, Acknowledged, ClusterError, DocumentId, DocumentIdError, DocumentVersion, ErrorKind,
    FieldType, IndexAck, IndexName, IndexNameError, MappingSchema, OpType, Operation,
    SearchCluster, SearchHits, SearchQuery, StoredDocument, TermFilter, UpdateTimestamp,
    WriteIntent, WriteResult, UPDATE_TIMESTAMP_FIELD,
};
