use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::instrument;

use crate::embedding::EmbeddingProvider;
use crate::error::{SemanticError, SemanticResult};
use crate::models::{
    FIELD_EMBEDDING, FIELD_EMBEDDING_TEXT, FIELD_EMBEDDING_UPDATED_AT, IndexAck, IndexOutcome,
    RESERVED_FIELDS,
};
use crate::store::DocumentStore;

/// Writes embeddings back onto business documents.
///
/// The vector and the text it was computed from always land in the same merge
/// update, so a reader never sees one without the other.
pub struct EntityIndexer<S: DocumentStore> {
    store: Arc<S>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl<S: DocumentStore> Clone for EntityIndexer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            embedder: Arc::clone(&self.embedder),
        }
    }
}

impl<S: DocumentStore> EntityIndexer<S> {
    pub fn new(store: Arc<S>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Embed `text` and merge it onto `collection/doc_id`.
    ///
    /// Blank text is a no-op reported as [`IndexOutcome::Skipped`]. Caller
    /// metadata may add fields but never overwrite the reserved ones.
    #[instrument(skip(self, text, metadata), fields(text_len = text.len()))]
    pub async fn index_entity(
        &self,
        collection: &str,
        doc_id: &str,
        text: &str,
        metadata: Option<Map<String, Value>>,
    ) -> SemanticResult<IndexAck> {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("Nothing to index");
            return Ok(IndexAck {
                id: doc_id.to_string(),
                collection: collection.to_string(),
                outcome: IndexOutcome::Skipped,
            });
        }

        let embedding = self.embedder.embed(text).await?;

        let mut patch: Map<String, Value> = metadata
            .unwrap_or_default()
            .into_iter()
            .filter(|(key, _)| {
                let reserved = RESERVED_FIELDS.contains(&key.as_str());
                if reserved {
                    tracing::warn!(field = %key, "Dropping reserved metadata field");
                }
                !reserved && key != "_id"
            })
            .collect();
        patch.insert(FIELD_EMBEDDING.to_string(), json!(embedding.values));
        patch.insert(FIELD_EMBEDDING_TEXT.to_string(), json!(text));
        patch.insert(
            FIELD_EMBEDDING_UPDATED_AT.to_string(),
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        self.store
            .merge(collection, doc_id, patch)
            .await
            .map_err(|e| match e {
                SemanticError::NotFound(_) => SemanticError::not_found(collection, doc_id),
                other => other,
            })?;

        tracing::debug!(dimension = embedding.dimension, "Entity indexed");
        Ok(IndexAck {
            id: doc_id.to_string(),
            collection: collection.to_string(),
            outcome: IndexOutcome::Indexed,
        })
    }
}
