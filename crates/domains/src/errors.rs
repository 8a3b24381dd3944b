//! # Port errors
//!
//! Failures reported by the storage ports. Adapters map their backend
//! errors onto these so the services layer never sees driver types.

use thiserror::Error;

/// Errors returned by `DataStore` and `Directory` implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A write targeted a document that does not exist.
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// The backend could not be reached or failed while serving the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request (malformed predicate, bad field name).
    #[error("query rejected: {0}")]
    Rejected(String),

    /// A stored document did not match the expected schema.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Errors returned by `BlobStore` implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    #[error("image {namespace}/{index} not found")]
    NotFound { namespace: String, index: u32 },

    /// The stored object is larger than the configured read ceiling.
    #[error("image too large: {size} bytes exceeds limit of {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("blob storage error: {0}")]
    Storage(String),
}

impl BlobError {
    /// Short stable label, used as a metrics label value.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::SizeExceeded { .. } => "size_exceeded",
            Self::Storage(_) => "storage",
        }
    }
}

/// Schema violations found while decoding a stored document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("document {id}: missing required field `{field}`")]
    MissingField { id: String, field: &'static str },

    #[error("document {id}: field `{field}` is not a {expected}")]
    WrongType {
        id: String,
        field: &'static str,
        expected: &'static str,
    },

    #[error("unknown {kind} value {value:?}")]
    UnknownVariant { kind: &'static str, value: String },
}
