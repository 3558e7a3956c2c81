//! Semantic Search Domain Library
//!
//! Tenant-scoped semantic search over business records stored in a document
//! store, plus resumable batch jobs that (re)compute the embeddings.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────┐
//! │ SemanticSearchService │  ← guard first, then validated requests
//! └───┬──────────┬────────┘
//!     │          │
//! ┌───▼──────┐ ┌─▼──────────────────┐
//! │TenantGuard│ │ SearchOrchestrator │  IndexingJobManager
//! └───┬──────┘ └─┬──────────────────┘        │
//!     │          │                   ┌───────▼──────┐
//!     │          │                   │ EntityIndexer │
//!     │          │                   └───┬──────────┘
//! ┌───▼──────────▼───┐        ┌──────────▼────────┐
//! │  DocumentStore   │        │ EmbeddingProvider │
//! │  (trait)         │        │ (trait)           │
//! ├──────────────────┤        ├───────────────────┤
//! │ InMemory / Mongo │        │ OpenAI / VertexAI │
//! └──────────────────┘        └───────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_search::{
//!     CallerContext, JwtConfig, JwtIdentityProvider, MongoDocumentStore, OpenAIProvider,
//!     SemanticSearchRequest, SemanticSearchService, connect,
//! };
//! use core_config::{FromEnv, mongodb::MongoConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = connect(&MongoConfig::from_env()?).await?;
//! let store = Arc::new(MongoDocumentStore::new(db));
//! let embedder = Arc::new(OpenAIProvider::from_env()?);
//! let identity = Arc::new(JwtIdentityProvider::new(&JwtConfig::from_env()?));
//!
//! let service = SemanticSearchService::new(store, embedder, identity);
//! let caller = CallerContext::from_authorization_header(Some("Bearer <token>"));
//!
//! let results = service
//!     .semantic_search(
//!         &caller,
//!         SemanticSearchRequest {
//!             query: "roof repair".to_string(),
//!             collection: "projects".to_string(),
//!             limit: Some(5),
//!         },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod embedding;
pub mod error;
pub mod indexer;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod search;
pub mod service;
pub mod similarity;
pub mod store;
pub mod tenant;
pub mod text;

// Re-export commonly used types
pub use embedding::{
    EmbeddingProvider, OpenAIConfig, OpenAIProvider, VertexAIConfig, VertexAIProvider,
};
pub use error::{SemanticError, SemanticResult};
pub use indexer::EntityIndexer;
pub use jobs::{IndexingJobManager, JobStore, RunLocks};
pub use models::{
    BatchIndexOptions, EmbeddingModel, EmbeddingProviderType, EmbeddingResult,
    FindSimilarRequest, IndexAck, IndexEntityRequest, IndexOutcome, IndexingJob, JobStatus,
    SearchAllRequest, SearchResult, SemanticSearchRequest, StoredDocument, TenantContext,
};
pub use search::SearchOrchestrator;
pub use service::SemanticSearchService;
pub use similarity::{cosine_similarity, extract_snippet, rank};
pub use store::{DocumentStore, Filter, FilterValue, InMemoryDocumentStore, MongoDocumentStore, connect};
pub use tenant::{
    CallerContext, CallerIdentity, IdentityProvider, JwtConfig, JwtIdentityProvider, TenantGuard,
};
pub use text::{DEFAULT_SEARCH_COLLECTIONS, TextExtractor};
