use std::sync::Arc;
use tracing::instrument;

use crate::embedding::EmbeddingProvider;
use crate::error::{SemanticError, SemanticResult};
use crate::metrics;
use crate::models::{
    DEFAULT_SNIPPET_LENGTH, FIELD_EMBEDDING, FIELD_ORGANIZATION_ID,
    MAX_SEARCH_LIMIT, SearchMetadata, SearchResult, StoredDocument, TenantContext,
};
use crate::similarity::{cosine_similarity, extract_snippet, rank_by};
use crate::store::{DocumentStore, Filter};
use crate::tenant::ensure_owner;

/// Apply the default and bounds to a caller-supplied result limit
pub fn resolve_limit(limit: Option<usize>, default: usize) -> SemanticResult<usize> {
    match limit {
        None => Ok(default.clamp(1, MAX_SEARCH_LIMIT)),
        Some(0) => Err(SemanticError::InvalidArgument(
            "limit must be at least 1".to_string(),
        )),
        Some(n) if n > MAX_SEARCH_LIMIT => Err(SemanticError::InvalidArgument(format!(
            "limit must be at most {}",
            MAX_SEARCH_LIMIT
        ))),
        Some(n) => Ok(n),
    }
}

/// How one collection scan should treat its candidates
struct Scan<'a> {
    collection: &'a str,
    query_vector: &'a [f32],
    /// Query text for snippets; `None` disables them
    query_text: Option<&'a str>,
    exclude_id: Option<&'a str>,
    limit: usize,
}

/// Runs similarity queries against tenant-scoped candidates
pub struct SearchOrchestrator<S: DocumentStore> {
    store: Arc<S>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl<S: DocumentStore> Clone for SearchOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            embedder: Arc::clone(&self.embedder),
        }
    }
}

impl<S: DocumentStore> SearchOrchestrator<S> {
    pub fn new(store: Arc<S>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Rank the tenant's indexed documents in `collection` against `query`
    #[instrument(skip(self, query, tenant), fields(organization_id = %tenant.organization_id))]
    pub async fn semantic_search(
        &self,
        query: &str,
        collection: &str,
        tenant: &TenantContext,
        limit: usize,
    ) -> SemanticResult<Vec<SearchResult>> {
        let query_vector = self.embedder.embed(query).await?.values;

        let results = self
            .scan(
                tenant,
                Scan {
                    collection,
                    query_vector: &query_vector,
                    query_text: Some(query),
                    exclude_id: None,
                    limit,
                },
            )
            .await?;

        metrics::search_executed(collection, "semantic", results.len());
        Ok(results)
    }

    /// Search several collections with one query embedding.
    ///
    /// A collection that fails is logged and left out; the rest are merged and
    /// re-ranked globally.
    #[instrument(skip(self, query, tenant), fields(organization_id = %tenant.organization_id))]
    pub async fn search_all(
        &self,
        query: &str,
        tenant: &TenantContext,
        collections: &[String],
        limit: usize,
    ) -> SemanticResult<Vec<SearchResult>> {
        let query_vector = self.embedder.embed(query).await?.values;

        let mut merged = Vec::new();
        for collection in collections {
            let scan = Scan {
                collection,
                query_vector: &query_vector,
                query_text: Some(query),
                exclude_id: None,
                limit,
            };
            match self.scan(tenant, scan).await {
                Ok(results) => {
                    metrics::search_executed(collection, "all", results.len());
                    merged.extend(results);
                }
                Err(e) => {
                    tracing::warn!(collection = %collection, error = %e, "Collection search failed, excluding it");
                    metrics::search_collection_failed(collection);
                }
            }
        }

        Ok(rank_by(merged, limit, |r| r.score))
    }

    /// Documents in `collection` closest to an existing document.
    ///
    /// The source must belong to the caller and carry an embedding; it never
    /// appears in its own results. Hits carry no snippet.
    #[instrument(skip(self, tenant), fields(organization_id = %tenant.organization_id))]
    pub async fn find_similar(
        &self,
        collection: &str,
        doc_id: &str,
        tenant: &TenantContext,
        limit: usize,
    ) -> SemanticResult<Vec<SearchResult>> {
        let source = self
            .store
            .get(collection, doc_id)
            .await?
            .ok_or_else(|| SemanticError::not_found(collection, doc_id))?;
        ensure_owner(tenant, collection, &source)?;

        let record = source.embedded_record().ok_or_else(|| {
            SemanticError::FailedPrecondition(format!(
                "document {}/{} has not been indexed",
                collection, doc_id
            ))
        })?;

        let results = self
            .scan(
                tenant,
                Scan {
                    collection,
                    query_vector: &record.embedding,
                    query_text: None,
                    exclude_id: Some(doc_id),
                    limit,
                },
            )
            .await?;

        metrics::search_executed(collection, "similar", results.len());
        Ok(results)
    }

    async fn scan(&self, tenant: &TenantContext, scan: Scan<'_>) -> SemanticResult<Vec<SearchResult>> {
        let filters = [
            Filter::eq(FIELD_ORGANIZATION_ID, tenant.organization_id.as_str()),
            Filter::exists(FIELD_EMBEDDING),
        ];
        let candidates = self.store.find(scan.collection, &filters).await?;

        let mut stale = 0usize;
        let mut scored: Vec<(StoredDocument, f32, String)> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if scan.exclude_id == Some(candidate.id.as_str()) {
                continue;
            }
            let Some(record) = candidate.embedded_record() else {
                tracing::debug!(doc_id = %candidate.id, "Skipping malformed embedding");
                continue;
            };
            // The store filter already scopes by tenant; never trust it alone
            if record.organization_id != tenant.organization_id {
                continue;
            }
            if record.embedding.len() != scan.query_vector.len() {
                stale += 1;
                continue;
            }
            let score = cosine_similarity(scan.query_vector, &record.embedding)?;
            scored.push((candidate, score, record.embedding_text));
        }

        if stale > 0 {
            tracing::warn!(
                collection = scan.collection,
                stale,
                expected_dimension = scan.query_vector.len(),
                "Skipped documents embedded with a different model"
            );
        }

        Ok(rank_by(scored, scan.limit, |(_, score, _)| *score)
            .into_iter()
            .map(|(doc, score, text)| SearchResult {
                collection: scan.collection.to_string(),
                score,
                data: doc.public_data(),
                metadata: SearchMetadata {
                    snippet: scan
                        .query_text
                        .filter(|_| !text.is_empty())
                        .map(|q| extract_snippet(&text, q, DEFAULT_SNIPPET_LENGTH)),
                },
                id: doc.id,
            })
            .collect())
    }
}
