//! # Ports
//!
//! The three capabilities the services layer consumes. Any adapter must
//! implement these traits to be wired into the binary.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::documents::{Document, RecordQuery};
use crate::errors::{BlobError, StoreError};
use crate::models::AuthorProfile;

/// Document persistence for listings, users and reply sub-collections.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Returns `None` when no document has that id.
    async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Equality-filtered scan. Results follow [`RecordQuery::sort`] so the
    /// same query always yields the same order.
    async fn query_records(&self, query: &RecordQuery) -> Result<Vec<Document>, StoreError>;

    /// Stores a new document and returns its store-assigned id.
    async fn insert_record(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<String, StoreError>;

    /// Merges `fields` into an existing document.
    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Atomically adds `delta` to an integer field and returns the new value.
    async fn increment_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError>;

    /// Returns `true` if the document existed.
    async fn delete_record(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
}

/// Binary storage for listing images, addressed by namespace and 1-based index.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_image(&self, namespace: &str, index: u32) -> Result<Bytes, BlobError>;

    async fn put_image(&self, namespace: &str, index: u32, data: Bytes) -> Result<(), BlobError>;

    /// Removes every image in the namespace and returns how many were removed.
    async fn delete_namespace(&self, namespace: &str) -> Result<u32, BlobError>;
}

/// Resolves user ids to display profiles.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_author_profile(&self, user_id: &str) -> Result<Option<AuthorProfile>, StoreError>;
}
