//! Vertex AI embedding provider
//!
//! Credentials come from `GOOGLE_ACCESS_TOKEN` for local development, or from
//! the GCE/GKE metadata server when running under Workload Identity.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_required};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::EmbeddingProvider;
use super::provider::{classify_status, ensure_non_empty, validate_response};
use crate::error::{SemanticError, SemanticResult};
use crate::models::{EmbeddingModel, EmbeddingProviderType, EmbeddingResult};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Vertex AI provider configuration
#[derive(Debug, Clone)]
pub struct VertexAIConfig {
    /// GCP Project ID
    pub project_id: String,
    /// GCP Region (e.g., "us-central1")
    pub location: String,
    pub model: EmbeddingModel,
    /// Static access token; the metadata server is asked when absent
    pub access_token: Option<String>,
    /// Overrides `https://{location}-aiplatform.googleapis.com`
    pub api_base: Option<String>,
}

impl VertexAIConfig {
    pub fn new(project_id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: location.into(),
            model: EmbeddingModel::TextEmbedding004,
            access_token: None,
            api_base: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_model(mut self, model: EmbeddingModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    fn endpoint_url(&self) -> String {
        let base = self
            .api_base
            .clone()
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", self.location));
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            base.trim_end_matches('/'),
            self.project_id,
            self.location,
            self.model.model_name()
        )
    }
}

impl FromEnv for VertexAIConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let project_id = env_required("GOOGLE_CLOUD_PROJECT")
            .or_else(|_| env_required("GCP_PROJECT_ID"))
            .map_err(|_| ConfigError::MissingEnvVar("GOOGLE_CLOUD_PROJECT".to_string()))?;
        let location = env_or_default("VERTEX_AI_LOCATION", "us-central1");

        let model_name = env_or_default(
            "VERTEX_AI_EMBEDDING_MODEL",
            EmbeddingModel::TextEmbedding004.model_name(),
        );
        let model = EmbeddingModel::from_model_name(&model_name)
            .filter(|m| m.provider() == EmbeddingProviderType::VertexAI)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "VERTEX_AI_EMBEDDING_MODEL".to_string(),
                details: format!("unsupported Vertex AI embedding model '{}'", model_name),
            })?;

        Ok(Self {
            project_id,
            location,
            model,
            access_token: std::env::var("GOOGLE_ACCESS_TOKEN").ok(),
            api_base: std::env::var("VERTEX_AI_API_BASE").ok(),
        })
    }
}

/// Vertex AI embeddings provider
pub struct VertexAIProvider {
    client: Client,
    config: VertexAIConfig,
}

impl VertexAIProvider {
    pub fn new(config: VertexAIConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(VertexAIConfig::from_env()?))
    }

    async fn access_token(&self) -> SemanticResult<String> {
        if let Some(ref token) = self.config.access_token {
            return Ok(token.clone());
        }
        self.metadata_token().await
    }

    async fn metadata_token(&self) -> SemanticResult<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| {
                SemanticError::Unavailable(format!(
                    "metadata server unreachable: {}; set GOOGLE_ACCESS_TOKEN for local development",
                    e
                ))
            })?;

        if !response.status().is_success() {
            return Err(SemanticError::Internal(format!(
                "metadata server refused a token ({}); set GOOGLE_ACCESS_TOKEN for local development",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

#[derive(Debug, Serialize)]
struct VertexAIRequest<'a> {
    instances: Vec<TextInstance<'a>>,
}

#[derive(Debug, Serialize)]
struct TextInstance<'a> {
    content: &'a str,
    task_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct VertexAIResponse {
    predictions: Vec<EmbeddingPrediction>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingPrediction {
    embeddings: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
    #[serde(default)]
    statistics: Option<EmbeddingStatistics>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingStatistics {
    #[serde(default)]
    token_count: u32,
}

#[async_trait]
impl EmbeddingProvider for VertexAIProvider {
    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::VertexAI
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

        let access_token = self.access_token().await?;
        let request = VertexAIRequest {
            instances: texts
                .iter()
                .map(|text| TextInstance {
                    content: text,
                    task_type: "RETRIEVAL_DOCUMENT",
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.config.endpoint_url())
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Vertex AI predict request rejected");
            return Err(classify_status("Vertex AI", status, &error_text));
        }

        let embedding_response: VertexAIResponse = response.json().await?;
        let results: Vec<EmbeddingResult> = embedding_response
            .predictions
            .into_iter()
            .map(|p| EmbeddingResult {
                dimension: p.embeddings.values.len() as u32,
                tokens_used: p.embeddings.statistics.map(|s| s.token_count).unwrap_or(0),
                values: p.embeddings.values,
            })
            .collect();

        validate_response(
            self.config.model,
            self.config.model.dimension(),
            texts.len(),
            &results,
        )?;
        Ok(results)
    }
}
