use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{SemanticError, SemanticResult};
use crate::models::{EmbeddingModel, EmbeddingProviderType, EmbeddingResult};

/// Text → vector adapter over a remote embedding API.
///
/// Implementations hold only their credential and model; they never cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn provider_type(&self) -> EmbeddingProviderType;

    /// Model every vector from this provider is produced with
    fn model(&self) -> EmbeddingModel;

    /// Embed one text. Empty text is `InvalidArgument`.
    async fn embed(&self, text: &str) -> SemanticResult<EmbeddingResult>;

    /// Embed many texts, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> SemanticResult<Vec<EmbeddingResult>>;
}

/// Reject blank inputs before spending a request on them
pub fn ensure_non_empty<S: AsRef<str>>(texts: &[S]) -> SemanticResult<()> {
    if let Some(index) = texts.iter().position(|t| t.as_ref().trim().is_empty()) {
        return Err(SemanticError::InvalidArgument(format!(
            "cannot embed empty text (input #{})",
            index
        )));
    }
    Ok(())
}

/// Map a non-success provider response onto an error kind.
///
/// Throttling and server faults are retryable (`Unavailable`); a rejected
/// payload is the caller's problem; anything else is a misconfiguration.
pub fn classify_status(provider: &str, status: StatusCode, body: &str) -> SemanticError {
    let message = format!("{} API error ({}): {}", provider, status, body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SemanticError::Unavailable(message)
    } else if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
        SemanticError::InvalidArgument(message)
    } else {
        SemanticError::Internal(message)
    }
}

/// Check a provider answer against what was asked for
pub(crate) fn validate_response(
    model: EmbeddingModel,
    expected_dimension: u32,
    requested: usize,
    results: &[EmbeddingResult],
) -> SemanticResult<()> {
    if results.len() != requested {
        return Err(SemanticError::Internal(format!(
            "{} returned {} embeddings for {} inputs",
            model.model_name(),
            results.len(),
            requested
        )));
    }
    if let Some(bad) = results.iter().find(|r| r.dimension != expected_dimension) {
        return Err(SemanticError::Internal(format!(
            "{} returned a {}-dimensional vector, expected {}",
            model.model_name(),
            bad.dimension,
            expected_dimension
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_non_empty() {
        assert!(ensure_non_empty(&["a", "b"]).is_ok());
        let err = ensure_non_empty(&["a", "  "]).unwrap_err();
        assert!(matches!(err, SemanticError::InvalidArgument(_)));
        assert!(err.to_string().contains("#1"));
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status("OpenAI", StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(classify_status("OpenAI", StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(matches!(
            classify_status("OpenAI", StatusCode::BAD_REQUEST, "too long"),
            SemanticError::InvalidArgument(_)
        ));
        assert!(matches!(
            classify_status("OpenAI", StatusCode::UNAUTHORIZED, "bad key"),
            SemanticError::Internal(_)
        ));
    }

    #[test]
    fn test_validate_response_counts_and_dimensions() {
        let model = EmbeddingModel::TextEmbedding004;
        let ok = vec![EmbeddingResult::new(vec![0.0; 4])];
        assert!(validate_response(model, 4, 1, &ok).is_ok());
        assert!(validate_response(model, 4, 2, &ok).is_err());
        assert!(validate_response(model, 8, 1, &ok).is_err());
    }
}
