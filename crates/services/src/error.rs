//! # AggregationError
//!
//! Typed failures of the read and write paths. Only mandatory dependencies
//! surface here; best-effort fan-out members (image fetches, batch members)
//! are absorbed and reported through [`crate::metrics`].

use domains::{DecodeError, StoreError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    /// The listing's owner could not be resolved to a display profile.
    #[error("author {user_id} could not be resolved")]
    MissingAuthor { user_id: String },

    #[error("listing {0} not found")]
    ListingNotFound(String),

    /// A backing store failed or timed out. Callers may retry with backoff.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store rejected the query or filter.
    #[error("query rejected: {0}")]
    QueryError(String),

    /// A stored document failed schema validation.
    #[error("malformed document: {0}")]
    ParseError(#[from] DecodeError),

    /// Caller input failed validation on a write path.
    #[error("validation error: {0}")]
    Validation(String),
}

impl AggregationError {
    /// Stable machine-readable code, used by transports and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingAuthor { .. } => "missing_author",
            Self::ListingNotFound(_) => "listing_not_found",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::QueryError(_) => "query_error",
            Self::ParseError(_) => "parse_error",
            Self::Validation(_) => "validation",
        }
    }
}

impl From<StoreError> for AggregationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(msg) => Self::QueryError(msg),
            StoreError::Decode(e) => Self::ParseError(e),
            StoreError::NotFound { collection, id } if collection == domains::LISTINGS => {
                Self::ListingNotFound(id)
            }
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

/// A specialized Result type for service operations.
pub type Result<T> = std::result::Result<T, AggregationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_the_taxonomy() {
        assert_eq!(
            AggregationError::from(StoreError::Rejected("bad field".into())),
            AggregationError::QueryError("bad field".into())
        );
        assert_eq!(
            AggregationError::from(StoreError::Unavailable("conn reset".into())).code(),
            "store_unavailable"
        );
        assert_eq!(
            AggregationError::from(StoreError::NotFound {
                collection: "posts".into(),
                id: "p1".into()
            }),
            AggregationError::ListingNotFound("p1".into())
        );
    }
}
