use async_trait::async_trait;
use serde_json::{Map, Value};

use super::Filter;
use crate::error::SemanticResult;
use crate::models::StoredDocument;

/// Tenant-partitioned document store.
///
/// Documents are JSON objects keyed by a string id within a named collection.
/// Callers always pass an organization filter; the store itself is tenant-agnostic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document by id
    async fn get(&self, collection: &str, id: &str) -> SemanticResult<Option<StoredDocument>>;

    /// All documents matching every filter, in the store's native id order
    async fn find(&self, collection: &str, filters: &[Filter])
    -> SemanticResult<Vec<StoredDocument>>;

    /// Atomically set the given top-level fields; `NotFound` if the document is absent
    async fn merge(&self, collection: &str, id: &str, patch: Map<String, Value>)
    -> SemanticResult<()>;

    /// Insert or fully replace a document
    async fn put(&self, collection: &str, id: &str, data: Value) -> SemanticResult<()>;

    /// Insert only if no document has this id; `false` when one already exists
    async fn create(&self, collection: &str, id: &str, data: Value) -> SemanticResult<bool>;

    /// Set the given fields only if the document exists and matches every filter.
    /// Returns whether the patch was applied.
    async fn merge_if(
        &self,
        collection: &str,
        id: &str,
        filters: &[Filter],
        patch: Map<String, Value>,
    ) -> SemanticResult<bool>;

    /// Delete the document if it matches every filter; returns whether it was removed
    async fn remove(&self, collection: &str, id: &str, filters: &[Filter]) -> SemanticResult<bool>;
}
