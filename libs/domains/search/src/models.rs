use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use strum::{Display, EnumString};
use validator::Validate;

use crate::error::{SemanticError, SemanticResult};

/// Field names written onto indexed business documents
pub const FIELD_EMBEDDING: &str = "embedding";
pub const FIELD_EMBEDDING_TEXT: &str = "embeddingText";
pub const FIELD_EMBEDDING_UPDATED_AT: &str = "embeddingUpdatedAt";
pub const FIELD_ORGANIZATION_ID: &str = "organizationId";

/// Fields owned by the indexer; caller metadata may never overwrite them
pub const RESERVED_FIELDS: [&str; 4] = [
    FIELD_EMBEDDING,
    FIELD_EMBEDDING_TEXT,
    FIELD_EMBEDDING_UPDATED_AT,
    FIELD_ORGANIZATION_ID,
];

/// Collection holding persisted indexing jobs
pub const JOBS_COLLECTION: &str = "indexing_jobs";
/// Collection holding one run lease per `(collection, organization)`
pub const LOCKS_COLLECTION: &str = "indexing_locks";
/// Collection holding user profiles (used to resolve a caller's organization)
pub const USERS_COLLECTION: &str = "users";

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 100;
pub const DEFAULT_SNIPPET_LENGTH: usize = 200;

static COLLECTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid collection regex"));

/// Custom validator for collection names
pub fn validate_collection_name(name: &str) -> Result<(), validator::ValidationError> {
    if !COLLECTION_NAME.is_match(name) {
        return Err(validator::ValidationError::new("invalid_collection_name"));
    }
    if [JOBS_COLLECTION, LOCKS_COLLECTION, USERS_COLLECTION].contains(&name) {
        return Err(validator::ValidationError::new("reserved_collection_name"));
    }
    Ok(())
}

fn validate_not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank"));
    }
    Ok(())
}

/// Resolved tenant for the current operation.
///
/// Only the tenant guard constructs this from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub organization_id: String,
    pub user_id: String,
}

impl TenantContext {
    pub fn new(organization_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// A business record as held by the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub data: Value,
}

impl StoredDocument {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.data.get(FIELD_ORGANIZATION_ID).and_then(Value::as_str)
    }

    pub fn has_embedding(&self) -> bool {
        matches!(self.data.get(FIELD_EMBEDDING), Some(v) if !v.is_null())
    }

    /// Parse the embedded fields; `None` when the record was never indexed
    /// or its embedding fields are malformed.
    pub fn embedded_record(&self) -> Option<EmbeddedRecord> {
        if !self.has_embedding() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }

    /// The document as returned to callers: everything except the raw vector
    pub fn public_data(&self) -> Value {
        let mut data = self.data.clone();
        if let Some(obj) = data.as_object_mut() {
            obj.remove(FIELD_EMBEDDING);
        }
        data
    }
}

/// The embedding field set attached to an indexed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedRecord {
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub embedding_text: String,
    #[serde(default)]
    pub embedding_updated_at: Option<DateTime<Utc>>,
    pub organization_id: String,
}

/// Display metadata attached to a search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// One ranked hit. Computed per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub collection: String,
    pub score: f32,
    pub data: Value,
    pub metadata: SearchMetadata,
}

/// Result of indexing a single entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IndexOutcome {
    Indexed,
    /// Nothing to index (empty text)
    Skipped,
}

/// Acknowledgement returned by the single-entity indexing operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAck {
    pub id: String,
    pub collection: String,
    pub outcome: IndexOutcome,
}

// ===== Indexing jobs =====

/// Lifecycle of a batch indexing job
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Running, Completed)
                | (Running, Failed)
                | (Running, Paused)
                | (Paused, Running)
                | (Failed, Running)
        )
    }

    pub fn is_resumable(self) -> bool {
        matches!(self, JobStatus::Paused | JobStatus::Failed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

/// A document that failed to index, or a system-level failure (`docId = "system"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub doc_id: String,
    pub error: String,
}

/// Last document processed by a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub last_doc_id: String,
    pub last_indexed_at: DateTime<Utc>,
}

/// Options for a batch indexing run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchIndexOptions {
    #[validate(range(min = 1, max = 500))]
    pub batch_size: usize,
    /// Embedding requests per second
    #[validate(range(min = 1, max = 10000))]
    pub rate_limit: u32,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for BatchIndexOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            rate_limit: 10,
            dry_run: false,
        }
    }
}

impl BatchIndexOptions {
    pub fn from_config(config: &core_config::indexing::IndexingConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            rate_limit: config.rate_limit,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Pause between two chunks: `(1000 / rate_limit) * batch_size` milliseconds
    pub fn chunk_delay(&self) -> std::time::Duration {
        let per_request_ms = 1000.0 / f64::from(self.rate_limit.max(1));
        std::time::Duration::from_millis((per_request_ms * self.batch_size as f64).round() as u64)
    }
}

/// A batch indexing job record, persisted in [`JOBS_COLLECTION`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingJob {
    pub job_id: String,
    pub collection: String,
    pub organization_id: String,
    pub status: JobStatus,
    pub total_documents: u64,
    pub indexed_documents: u64,
    pub failed_documents: u64,
    #[serde(default)]
    pub skipped_documents: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors: Vec<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
    pub created_by: String,
    pub user_org_id: String,
    #[serde(default)]
    pub options: BatchIndexOptions,
}

impl IndexingJob {
    /// Maximum number of error entries retained on a job record
    pub const MAX_ERRORS: usize = 100;
    /// Error entry id for failures not tied to one document
    pub const SYSTEM_ERROR_ID: &'static str = "system";

    pub fn new(collection: &str, tenant: &TenantContext, options: BatchIndexOptions) -> Self {
        let started_at = Utc::now();
        Self {
            job_id: Self::job_id_for(collection, &tenant.organization_id, started_at),
            collection: collection.to_string(),
            organization_id: tenant.organization_id.clone(),
            status: JobStatus::Running,
            total_documents: 0,
            indexed_documents: 0,
            failed_documents: 0,
            skipped_documents: 0,
            started_at,
            completed_at: None,
            errors: Vec::new(),
            checkpoint: None,
            created_by: tenant.user_id.clone(),
            user_org_id: tenant.organization_id.clone(),
            options,
        }
    }

    pub fn job_id_for(collection: &str, organization_id: &str, at: DateTime<Utc>) -> String {
        format!("index_{}_{}_{}", collection, organization_id, at.timestamp_micros())
    }

    /// Documents visited so far, whatever the outcome
    pub fn processed_documents(&self) -> u64 {
        self.indexed_documents + self.failed_documents + self.skipped_documents
    }

    /// Move to `next`, rejecting edges the lifecycle does not allow
    pub fn transition(&mut self, next: JobStatus) -> SemanticResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(SemanticError::FailedPrecondition(format!(
                "job {} cannot move from {} to {}",
                self.job_id, self.status, next
            )));
        }
        self.status = next;
        match next {
            JobStatus::Completed | JobStatus::Failed => self.completed_at = Some(Utc::now()),
            JobStatus::Running => self.completed_at = None,
            JobStatus::Paused => {}
        }
        Ok(())
    }

    /// Record an error; entries past [`Self::MAX_ERRORS`] are counted but not kept
    pub fn record_error(&mut self, doc_id: impl Into<String>, error: impl Into<String>) {
        if self.errors.len() < Self::MAX_ERRORS {
            self.errors.push(JobError {
                doc_id: doc_id.into(),
                error: error.into(),
            });
        }
    }

    /// Record a failure not tied to one document and fail the run when still running
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.record_error(Self::SYSTEM_ERROR_ID, reason);
        if self.status.can_transition_to(JobStatus::Failed) {
            self.status = JobStatus::Failed;
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn advance_checkpoint(&mut self, doc_id: &str) {
        self.checkpoint = Some(Checkpoint {
            last_doc_id: doc_id.to_string(),
            last_indexed_at: Utc::now(),
        });
    }
}

// ===== Requests =====

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SemanticSearchRequest {
    #[validate(length(max = 2000), custom(function = "validate_not_blank"))]
    pub query: String,
    #[validate(custom(function = "validate_collection_name"))]
    pub collection: String,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchAllRequest {
    #[validate(length(max = 2000), custom(function = "validate_not_blank"))]
    pub query: String,
    /// Defaults to the curated collection list when absent or empty
    #[serde(default)]
    pub collections: Option<Vec<String>>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FindSimilarRequest {
    #[validate(custom(function = "validate_collection_name"))]
    pub collection: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub doc_id: String,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IndexEntityRequest {
    #[validate(custom(function = "validate_collection_name"))]
    pub collection: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub doc_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

// ===== Embeddings =====

/// Embedding provider types
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EmbeddingProviderType {
    #[default]
    OpenAI,
    VertexAI,
}

/// Embedding model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmbeddingModel {
    /// OpenAI text-embedding-3-small (1536 dimensions)
    #[default]
    TextEmbedding3Small,
    /// OpenAI text-embedding-3-large (3072 dimensions)
    TextEmbedding3Large,
    /// OpenAI text-embedding-ada-002 (1536 dimensions, legacy)
    TextEmbeddingAda002,
    /// Vertex AI text-embedding-004 (768 dimensions)
    TextEmbedding004,
    /// Vertex AI text-embedding-005 (768 dimensions)
    TextEmbedding005,
    /// Vertex AI text-multilingual-embedding-002 (768 dimensions)
    TextMultilingualEmbedding002,
}

impl EmbeddingModel {
    pub fn dimension(&self) -> u32 {
        match self {
            EmbeddingModel::TextEmbedding3Small => 1536,
            EmbeddingModel::TextEmbedding3Large => 3072,
            EmbeddingModel::TextEmbeddingAda002 => 1536,
            EmbeddingModel::TextEmbedding004
            | EmbeddingModel::TextEmbedding005
            | EmbeddingModel::TextMultilingualEmbedding002 => 768,
        }
    }

    pub fn model_name(&self) -> &'static str {
        match self {
            EmbeddingModel::TextEmbedding3Small => "text-embedding-3-small",
            EmbeddingModel::TextEmbedding3Large => "text-embedding-3-large",
            EmbeddingModel::TextEmbeddingAda002 => "text-embedding-ada-002",
            EmbeddingModel::TextEmbedding004 => "text-embedding-004",
            EmbeddingModel::TextEmbedding005 => "text-embedding-005",
            EmbeddingModel::TextMultilingualEmbedding002 => "text-multilingual-embedding-002",
        }
    }

    pub fn from_model_name(name: &str) -> Option<Self> {
        [
            EmbeddingModel::TextEmbedding3Small,
            EmbeddingModel::TextEmbedding3Large,
            EmbeddingModel::TextEmbeddingAda002,
            EmbeddingModel::TextEmbedding004,
            EmbeddingModel::TextEmbedding005,
            EmbeddingModel::TextMultilingualEmbedding002,
        ]
        .into_iter()
        .find(|m| m.model_name() == name)
    }

    pub fn provider(&self) -> EmbeddingProviderType {
        match self {
            EmbeddingModel::TextEmbedding3Small
            | EmbeddingModel::TextEmbedding3Large
            | EmbeddingModel::TextEmbeddingAda002 => EmbeddingProviderType::OpenAI,
            EmbeddingModel::TextEmbedding004
            | EmbeddingModel::TextEmbedding005
            | EmbeddingModel::TextMultilingualEmbedding002 => EmbeddingProviderType::VertexAI,
        }
    }
}

/// Embedding result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub values: Vec<f32>,
    pub dimension: u32,
    pub tokens_used: u32,
}

impl EmbeddingResult {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            dimension: values.len() as u32,
            values,
            tokens_used: 0,
        }
    }
}
