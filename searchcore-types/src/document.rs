//! Validated identifiers, fingerprints and document payloads.

use crate::validation::{legal_index_name, no_control_characters};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the source field that carries the write-time fingerprint.
pub const UPDATE_TIMESTAMP_FIELD: &str = "u";

/// Index name domain type.
///
/// `IndexName` identifies one index on the cluster. Uses nutype for validation
/// ensuring all index names are:
/// - Sanitized (trimmed and lowercased, since the cluster rejects uppercase)
/// - Non-empty and at most 255 characters
/// - Free of path separators, wildcards, quoting, whitespace, `,` and `#`
/// - Not starting with `-`, `_` or `+`
#[nutype(
    sanitize(trim, lowercase),
    validate(not_empty, len_char_max = 255, predicate = legal_index_name),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct IndexName(String);

/// Document identifier domain type.
///
/// `DocumentId` uniquely identifies a document within an index. Ids are
/// trimmed, non-empty, at most 512 characters and free of control characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 512, predicate = no_control_characters),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct DocumentId(String);

/// Cluster-assigned document version used for optimistic concurrency.
///
/// Versions start at 1 for a freshly created document and increment with
/// each successful write.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Serialize,
    Deserialize
))]
pub struct DocumentVersion(u64);

impl DocumentVersion {
    /// Version of a document after its first write.
    pub fn first() -> Self {
        Self::new(1)
    }

    /// Returns the version following this one, saturating at `u64::MAX`.
    #[must_use]
    pub fn increment(self) -> Self {
        Self::new(self.into_inner().saturating_add(1))
    }
}

/// Write-time fingerprint stored in the `"u"` source field.
///
/// Callers stamp each [`WriteIntent`] before submission; epoch milliseconds
/// by convention. Two physical attempts of the same logical write carry the
/// same timestamp, which is what reconciliation compares.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Serialize,
    Deserialize
))]
pub struct UpdateTimestamp(i64);

impl UpdateTimestamp {
    /// Current wall-clock time in epoch milliseconds.
    pub fn now() -> Self {
        Self::new(chrono::Utc::now().timestamp_millis())
    }
}

/// Authoritative persisted state of one document, as read from the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    id: DocumentId,
    version: DocumentVersion,
    update_timestamp: Option<UpdateTimestamp>,
    body: Map<String, Value>,
}

impl StoredDocument {
    /// Build a stored document from the raw `_source` returned by the cluster.
    ///
    /// A non-object source yields an empty body. A missing or non-integer
    /// `"u"` field leaves the document without a fingerprint.
    pub fn from_source(id: DocumentId, version: DocumentVersion, source: Value) -> Self {
        let body = match source {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let update_timestamp = body
            .get(UPDATE_TIMESTAMP_FIELD)
            .and_then(Value::as_i64)
            .map(UpdateTimestamp::new);

        Self {
            id,
            version,
            update_timestamp,
            body,
        }
    }

    /// Id the document is stored under.
    pub const fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Version the cluster reported with the read.
    pub const fn version(&self) -> DocumentVersion {
        self.version
    }

    /// Fingerprint of the write that produced this document.
    ///
    /// `None` when the source has no integer `"u"` field, for example a
    /// document written by a client that does not stamp its writes.
    pub const fn update_timestamp(&self) -> Option<UpdateTimestamp> {
        self.update_timestamp
    }

    /// The full stored source, including the `"u"` field.
    pub const fn body(&self) -> &Map<String, Value> {
        &self.body
    }
}

/// Document payload a caller wants persisted.
///
/// The intent carries its own [`UpdateTimestamp`], set by the caller before
/// submission and written into the `"u"` field of the stored source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteIntent {
    body: Map<String, Value>,
    update_timestamp: UpdateTimestamp,
}

impl WriteIntent {
    /// Create an intent with an explicit fingerprint.
    pub const fn new(body: Map<String, Value>, update_timestamp: UpdateTimestamp) -> Self {
        Self {
            body,
            update_timestamp,
        }
    }

    /// Create an intent stamped with the current time.
    pub fn stamped_now(body: Map<String, Value>) -> Self {
        Self::new(body, UpdateTimestamp::now())
    }

    /// Fingerprint written into the `"u"` field.
    pub const fn update_timestamp(&self) -> UpdateTimestamp {
        self.update_timestamp
    }

    /// Caller-supplied fields, without the fingerprint.
    pub const fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Render the source sent to the cluster, with `"u"` set to the fingerprint.
    ///
    /// A `"u"` key already present in the body is overwritten.
    pub fn to_source(&self) -> Value {
        let mut source = self.body.clone();
        let _ = source.insert(
            UPDATE_TIMESTAMP_FIELD.to_string(),
            Value::from(self.update_timestamp.into_inner()),
        );
        Value::Object(source)
    }
}
