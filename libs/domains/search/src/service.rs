use core_config::indexing::IndexingConfig;
use std::sync::Arc;
use tracing::instrument;
use validator::Validate;

use crate::embedding::EmbeddingProvider;
use crate::error::{SemanticError, SemanticResult};
use crate::indexer::EntityIndexer;
use crate::jobs::IndexingJobManager;
use crate::models::{
    BatchIndexOptions, DEFAULT_SEARCH_LIMIT, FindSimilarRequest, IndexAck, IndexEntityRequest,
    IndexingJob, SearchAllRequest, SearchResult, SemanticSearchRequest, validate_collection_name,
};
use crate::search::{SearchOrchestrator, resolve_limit};
use crate::store::DocumentStore;
use crate::tenant::{CallerContext, IdentityProvider, TenantGuard, ensure_owner};
use crate::text::{DEFAULT_SEARCH_COLLECTIONS, TextExtractor};

/// Public entry point for search, indexing and job control.
///
/// Every operation resolves the caller's tenant before anything else.
pub struct SemanticSearchService<S: DocumentStore> {
    store: Arc<S>,
    guard: TenantGuard<S>,
    search: SearchOrchestrator<S>,
    indexer: EntityIndexer<S>,
    jobs: IndexingJobManager<S>,
    default_collections: Vec<String>,
    default_options: BatchIndexOptions,
    default_limit: usize,
}

impl<S: DocumentStore> Clone for SemanticSearchService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            guard: self.guard.clone(),
            search: self.search.clone(),
            indexer: self.indexer.clone(),
            jobs: self.jobs.clone(),
            default_collections: self.default_collections.clone(),
            default_options: self.default_options.clone(),
            default_limit: self.default_limit,
        }
    }
}

impl<S: DocumentStore> SemanticSearchService<S> {
    pub fn new(
        store: Arc<S>,
        embedder: Arc<dyn EmbeddingProvider>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self::with_extractor(store, embedder, identity, TextExtractor::with_defaults())
    }

    pub fn with_extractor(
        store: Arc<S>,
        embedder: Arc<dyn EmbeddingProvider>,
        identity: Arc<dyn IdentityProvider>,
        extractor: TextExtractor,
    ) -> Self {
        let indexer = EntityIndexer::new(Arc::clone(&store), Arc::clone(&embedder));
        Self {
            guard: TenantGuard::new(identity, Arc::clone(&store)),
            search: SearchOrchestrator::new(Arc::clone(&store), embedder),
            jobs: IndexingJobManager::new(Arc::clone(&store), indexer.clone(), Arc::new(extractor)),
            indexer,
            store,
            default_collections: DEFAULT_SEARCH_COLLECTIONS.iter().map(|c| c.to_string()).collect(),
            default_options: BatchIndexOptions::default(),
            default_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Apply batch and search defaults from configuration
    pub fn with_config(mut self, config: &IndexingConfig) -> Self {
        self.default_options = BatchIndexOptions::from_config(config);
        self.default_limit = config.search_default_limit;
        self
    }

    pub fn with_default_collections(mut self, collections: Vec<String>) -> Self {
        self.default_collections = collections;
        self
    }

    pub fn default_options(&self) -> &BatchIndexOptions {
        &self.default_options
    }

    #[instrument(skip(self, caller, request), fields(collection = %request.collection))]
    pub async fn semantic_search(
        &self,
        caller: &CallerContext,
        request: SemanticSearchRequest,
    ) -> SemanticResult<Vec<SearchResult>> {
        let tenant = self.guard.resolve(caller).await?;
        request.validate()?;
        let limit = resolve_limit(request.limit, self.default_limit)?;

        self.search
            .semantic_search(&request.query, &request.collection, &tenant, limit)
            .await
    }

    /// Search several collections; the configured list is used when none are given
    #[instrument(skip(self, caller, request))]
    pub async fn search_all(
        &self,
        caller: &CallerContext,
        request: SearchAllRequest,
    ) -> SemanticResult<Vec<SearchResult>> {
        let tenant = self.guard.resolve(caller).await?;
        request.validate()?;
        let limit = resolve_limit(request.limit, self.default_limit)?;

        let collections = match request.collections {
            Some(collections) if !collections.is_empty() => collections,
            _ => self.default_collections.clone(),
        };
        for collection in &collections {
            check_collection(collection)?;
        }

        self.search
            .search_all(&request.query, &tenant, &collections, limit)
            .await
    }

    #[instrument(skip(self, caller, request), fields(collection = %request.collection, doc_id = %request.doc_id))]
    pub async fn find_similar(
        &self,
        caller: &CallerContext,
        request: FindSimilarRequest,
    ) -> SemanticResult<Vec<SearchResult>> {
        let tenant = self.guard.resolve(caller).await?;
        request.validate()?;
        let limit = resolve_limit(request.limit, self.default_limit)?;

        self.search
            .find_similar(&request.collection, &request.doc_id, &tenant, limit)
            .await
    }

    /// Index one document the caller owns
    #[instrument(skip(self, caller, request), fields(collection = %request.collection, doc_id = %request.doc_id))]
    pub async fn index_entity(
        &self,
        caller: &CallerContext,
        request: IndexEntityRequest,
    ) -> SemanticResult<IndexAck> {
        let tenant = self.guard.resolve(caller).await?;
        request.validate()?;

        let document = self
            .store
            .get(&request.collection, &request.doc_id)
            .await?
            .ok_or_else(|| SemanticError::not_found(&request.collection, &request.doc_id))?;
        ensure_owner(&tenant, &request.collection, &document)?;

        self.indexer
            .index_entity(&request.collection, &request.doc_id, &request.text, request.metadata)
            .await
    }

    /// Run a batch indexing job to its end; `None` uses the configured defaults
    pub async fn batch_index_collection(
        &self,
        caller: &CallerContext,
        collection: &str,
        options: Option<BatchIndexOptions>,
    ) -> SemanticResult<IndexingJob> {
        let tenant = self.guard.resolve(caller).await?;
        check_collection(collection)?;

        let options = options.unwrap_or_else(|| self.default_options.clone());
        self.jobs
            .batch_index_collection(collection, &tenant, options)
            .await
    }

    /// Latest job of the caller's organization for `collection`, if one was ever started
    pub async fn get_indexing_status(
        &self,
        caller: &CallerContext,
        collection: &str,
    ) -> SemanticResult<Option<IndexingJob>> {
        let tenant = self.guard.resolve(caller).await?;
        check_collection(collection)?;
        self.jobs.latest_job(collection, &tenant).await
    }

    /// One job by id, scoped to the caller's organization
    pub async fn get_job(&self, caller: &CallerContext, job_id: &str) -> SemanticResult<IndexingJob> {
        let tenant = self.guard.resolve(caller).await?;
        self.jobs.get_job(job_id, &tenant).await
    }

    pub async fn resume_indexing(
        &self,
        caller: &CallerContext,
        job_id: &str,
    ) -> SemanticResult<IndexingJob> {
        let tenant = self.guard.resolve(caller).await?;
        self.jobs.resume_indexing(job_id, &tenant).await
    }

    pub async fn pause_indexing(
        &self,
        caller: &CallerContext,
        job_id: &str,
    ) -> SemanticResult<IndexingJob> {
        let tenant = self.guard.resolve(caller).await?;
        self.jobs.pause_indexing(job_id, &tenant).await
    }
}

fn check_collection(collection: &str) -> SemanticResult<()> {
    validate_collection_name(collection).map_err(|e| {
        SemanticError::InvalidArgument(format!("collection '{}': {}", collection, e.code))
    })
}
