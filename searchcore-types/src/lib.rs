#![forbid(invalid_value, overflowing_literals, unconditional_recursion, unsafe_code)]
#![deny(
    bad_style,
    deprecated,
    meta_variable_misuse,
    non_ascii_idents,
    non_camel_case_types,
    non_snake_case,
    non_upper_case_globals,
    rust_2018_idioms,
    unreachable_code,
    unused_must_use
)]

//! Shared vocabulary types and traits for the `searchcore` request engine.
//!
//! This crate provides the foundational types that are shared between the
//! `searchcore` engine and cluster backends like `searchcore-memory`. Keeping
//! them in a separate crate lets backends and test doubles implement the
//! cluster surface without depending on the engine itself.
//!
//! # Overview
//!
//! This crate contains:
//! - The cluster surface: [`SearchCluster`] and its acknowledgement types
//! - Domain types: [`IndexName`], [`DocumentId`], [`DocumentVersion`], [`UpdateTimestamp`]
//! - Documents: [`StoredDocument`], [`WriteIntent`]
//! - Queries and schemas: [`SearchQuery`], [`SearchHits`], [`MappingSchema`], [`FieldType`]
//! - Errors: [`ClusterError`], [`ErrorKind`], [`Operation`]

mod cluster;
mod document;
mod error;
mod mapping;
mod query;
mod validation;

pub use cluster::{Acknowledged, IndexAck, OpType, SearchCluster, WriteResult};
pub use document::{
    DocumentId, DocumentIdError, DocumentVersion, IndexName, IndexNameError, StoredDocument,
    UpdateTimestamp, WriteIntent, UPDATE_TIMESTAMP_FIELD,
};
pub use error::{wire, ClusterError, ErrorKind, Operation};
pub use mapping::{FieldType, MappingSchema};
pub use query::{SearchHits, SearchQuery, TermFilter};
