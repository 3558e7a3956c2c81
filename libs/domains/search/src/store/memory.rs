use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{DocumentStore, Filter};
use crate::error::{SemanticError, SemanticResult};
use crate::models::StoredDocument;

type Collection = BTreeMap<String, Value>;

/// In-memory implementation of DocumentStore (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing the trait
    pub async fn insert(&self, collection: &str, id: &str, data: Value) {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }

    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> SemanticResult<Option<StoredDocument>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| StoredDocument::new(id, data.clone())))
    }

    async fn find(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> SemanticResult<Vec<StoredDocument>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(vec![]);
        };

        // BTreeMap iteration is already ordered by id
        Ok(docs
            .iter()
            .filter(|(_, data)| filters.iter().all(|f| f.matches(data)))
            .map(|(id, data)| StoredDocument::new(id.clone(), data.clone()))
            .collect())
    }

    async fn merge(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> SemanticResult<()> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| SemanticError::not_found(collection, id))?;

        let Some(object) = data.as_object_mut() else {
            return Err(SemanticError::Internal(format!(
                "document {}/{} is not an object",
                collection, id
            )));
        };
        object.extend(patch);
        Ok(())
    }

    async fn put(&self, collection: &str, id: &str, data: Value) -> SemanticResult<()> {
        self.insert(collection, id, data).await;
        Ok(())
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> SemanticResult<bool> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Ok(false);
        }
        docs.insert(id.to_string(), data);
        Ok(true)
    }

    async fn merge_if(
        &self,
        collection: &str,
        id: &str,
        filters: &[Filter],
        patch: Map<String, Value>,
    ) -> SemanticResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(data) = collections.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
            return Ok(false);
        };
        if !filters.iter().all(|f| f.matches(data)) {
            return Ok(false);
        }
        match data.as_object_mut() {
            Some(object) => {
                object.extend(patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, collection: &str, id: &str, filters: &[Filter]) -> SemanticResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        if !docs.get(id).is_some_and(|data| filters.iter().all(|f| f.matches(data))) {
            return Ok(false);
        }
        Ok(docs.remove(id).is_some())
    }
}
