use thiserror::Error;

/// Errors surfaced by every search, indexing and job operation.
///
/// The variants are the closed set of failure kinds callers are expected to
/// branch on; transport-specific errors are folded into them at the boundary.
#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Embedding provider could not be reached or asked us to back off.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SemanticResult<T> = Result<T, SemanticError>;

impl SemanticError {
    /// Stable snake_case code for logs and API payloads
    pub fn code(&self) -> &'static str {
        match self {
            SemanticError::Unauthenticated(_) => "unauthenticated",
            SemanticError::PermissionDenied(_) => "permission_denied",
            SemanticError::InvalidArgument(_) => "invalid_argument",
            SemanticError::NotFound(_) => "not_found",
            SemanticError::Unavailable(_) => "unavailable",
            SemanticError::FailedPrecondition(_) => "failed_precondition",
            SemanticError::Internal(_) => "internal",
        }
    }

    /// Only provider transport failures are worth retrying; nothing here retries internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SemanticError::Unavailable(_))
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        SemanticError::NotFound(format!("document {}/{} does not exist", collection, id))
    }
}

impl From<reqwest::Error> for SemanticError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SemanticError::Internal(format!("Malformed embedding response: {}", err))
        } else {
            SemanticError::Unavailable(format!("Embedding provider request failed: {}", err))
        }
    }
}

impl From<serde_json::Error> for SemanticError {
    fn from(err: serde_json::Error) -> Self {
        SemanticError::Internal(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for SemanticError {
    fn from(err: mongodb::error::Error) -> Self {
        SemanticError::Internal(format!("Document store error: {}", err))
    }
}

impl From<mongodb::bson::ser::Error> for SemanticError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        SemanticError::Internal(format!("BSON serialization error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for SemanticError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        SemanticError::Unauthenticated(format!("Invalid credential: {}", err))
    }
}

impl From<validator::ValidationErrors> for SemanticError {
    fn from(err: validator::ValidationErrors) -> Self {
        SemanticError::InvalidArgument(err.to_string())
    }
}
