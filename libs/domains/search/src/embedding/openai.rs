use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_required};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::EmbeddingProvider;
use super::provider::{classify_status, ensure_non_empty, validate_response};
use crate::error::{SemanticError, SemanticResult};
use crate::models::{EmbeddingModel, EmbeddingProviderType, EmbeddingResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI embedding provider configuration
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: EmbeddingModel,
    /// Shortened output size (text-embedding-3 models only)
    pub dimensions: Option<u32>,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: EmbeddingModel::default(),
            dimensions: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: EmbeddingModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_dimensions(mut self, dimensions: u32) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Dimension every returned vector must have
    pub fn expected_dimension(&self) -> u32 {
        self.dimensions.unwrap_or_else(|| self.model.dimension())
    }
}

impl FromEnv for OpenAIConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_key = env_required("OPENAI_API_KEY")?;
        let base_url = env_or_default("OPENAI_BASE_URL", DEFAULT_BASE_URL);

        let model_name = env_or_default(
            "OPENAI_EMBEDDING_MODEL",
            EmbeddingModel::default().model_name(),
        );
        let model = EmbeddingModel::from_model_name(&model_name)
            .filter(|m| m.provider() == EmbeddingProviderType::OpenAI)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "OPENAI_EMBEDDING_MODEL".to_string(),
                details: format!("unsupported OpenAI embedding model '{}'", model_name),
            })?;

        let dimensions = match std::env::var("OPENAI_EMBEDDING_DIMENSIONS") {
            Ok(raw) => Some(raw.trim().parse().map_err(|e| ConfigError::ParseError {
                key: "OPENAI_EMBEDDING_DIMENSIONS".to_string(),
                details: format!("{}", e),
            })?),
            Err(_) => None,
        };

        Ok(Self {
            api_key,
            base_url,
            model,
            dimensions,
        })
    }
}

/// OpenAI embeddings provider
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(OpenAIConfig::from_env()?))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: u32,
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::OpenAI
    }

    fn model(&self) -> EmbeddingModel {
        self.config.model
    }

    async fn embed(&self, text: &str) -> SemanticResult<EmbeddingResult> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| SemanticError::Internal("No embedding returned".to_string()))
    }

    #[instrument(skip(self, texts), fields(model = self.config.model.model_name(), count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> SemanticResult<Vec<EmbeddingResult>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        ensure_non_empty(texts)?;

        let request = EmbeddingRequest {
            model: self.config.model.model_name(),
            input: texts,
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "OpenAI embeddings request rejected");
            return Err(classify_status("OpenAI", status, &error_text));
        }

        let embedding_response: EmbeddingResponse = response.json().await?;

        // The API may answer out of order
        let mut data = embedding_response.data;
        data.sort_by_key(|d| d.index);

        let tokens_per_embedding = embedding_response
            .usage
            .map(|u| u.total_tokens / texts.len() as u32)
            .unwrap_or(0);

        let results: Vec<EmbeddingResult> = data
            .into_iter()
            .map(|d| EmbeddingResult {
                dimension: d.embedding.len() as u32,
                values: d.embedding,
                tokens_used: tokens_per_embedding,
            })
            .collect();

        validate_response(
            self.config.model,
            self.config.expected_dimension(),
            texts.len(),
            &results,
        )?;
        Ok(results)
    }
}
