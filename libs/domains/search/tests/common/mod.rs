//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Duration;
use domain_search::{
    CallerContext, EmbeddingModel, EmbeddingProvider, EmbeddingProviderType, EmbeddingResult,
    InMemoryDocumentStore, JwtConfig, JwtIdentityProvider, SemanticError, SemanticResult,
    SemanticSearchService,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

pub const SECRET: &str = "integration-secret-0123456789abcdef";
const DIMENSION: usize = 64;

/// Deterministic embedder: hashed bag of words, normalized.
///
/// Texts containing `fail_marker` are rejected; texts listed in `fixed` map to
/// the given vectors verbatim.
#[derive(Default)]
pub struct FakeEmbedder {
    calls: AtomicUsize,
    fail_marker: Option<String>,
    fixed: HashMap<String, Vec<f32>>,
    gate: Option<Gate>,
}

/// Blocks the embedder on its `at`-th call until released
pub struct Gate {
    pub at: usize,
    pub reached: Notify,
    pub release: Notify,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    pub fn with_fixed(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.to_string(), vector);
        self
    }

    pub fn gated_at(mut self, at: usize) -> Self {
        self.gate = Some(Gate {
            at,
            reached: Notify::new(),
            release: Notify::new(),
        });
        self
    }

    pub fn gate(&self) -> &Gate {
        self.gate.as_ref().expect("embedder has no gate")
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(fixed) = self.fixed.get(text) {
            return fixed.clone();
        }
        let mut vector = vec![0f32; DIMENSION];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            vector[fnv1a(&token) as usize % DIMENSION] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::OpenAI
    }

    fn model(&self) -> EmbeddingModel {
        EmbeddingModel::TextEmbedding3Small
    }

    async fn embed(&self, text: &str) -> SemanticResult<EmbeddingResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            if call == gate.at {
                gate.reached.notify_one();
                gate.release.notified().await;
            }
        }
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(SemanticError::InvalidArgument(format!(
                    "provider rejected input containing {}",
                    marker
                )));
            }
        }
        Ok(EmbeddingResult::new(self.vector_for(text)))
    }

    async fn embed_batch(&self, texts: &[String]) -> SemanticResult<Vec<EmbeddingResult>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

/// Service wired to the in-memory store, a fake embedder and JWT identities
pub struct Harness {
    pub store: Arc<InMemoryDocumentStore>,
    pub embedder: Arc<FakeEmbedder>,
    pub service: SemanticSearchService<InMemoryDocumentStore>,
    jwt: JwtIdentityProvider,
}

impl Harness {
    pub fn new(embedder: FakeEmbedder) -> Self {
        let config = JwtConfig::new(SECRET).expect("valid secret");
        let store = Arc::new(InMemoryDocumentStore::new());
        let embedder = Arc::new(embedder);
        let service = SemanticSearchService::new(
            Arc::clone(&store),
            Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
            Arc::new(JwtIdentityProvider::new(&config)),
        );
        Self {
            store,
            embedder,
            service,
            jwt: JwtIdentityProvider::new(&config),
        }
    }

    /// Another service instance over the same store, like a second process
    pub fn peer_service(&self) -> SemanticSearchService<InMemoryDocumentStore> {
        let config = JwtConfig::new(SECRET).expect("valid secret");
        SemanticSearchService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.embedder) as Arc<dyn EmbeddingProvider>,
            Arc::new(JwtIdentityProvider::new(&config)),
        )
    }

    /// Caller holding a valid token for `organization_id`
    pub fn caller(&self, organization_id: &str) -> CallerContext {
        let token = self
            .jwt
            .create_token("user-1", Some(organization_id), None, Duration::minutes(5))
            .expect("token");
        CallerContext::with_token(token)
    }

    pub async fn seed(&self, collection: &str, id: &str, data: Value) {
        self.store.insert(collection, id, data).await;
    }

    pub async fn document(&self, collection: &str, id: &str) -> Value {
        use domain_search::DocumentStore;
        self.store
            .get(collection, id)
            .await
            .expect("store read")
            .expect("document exists")
            .data
    }
}
