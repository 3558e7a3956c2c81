use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SemanticResult;

/// What the caller presented with a request.
///
/// `claimed_organization_id` is whatever the client asked for; it is never
/// trusted and only used to log mismatches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub token: Option<String>,
    pub claimed_organization_id: Option<String>,
}

impl CallerContext {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            claimed_organization_id: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build from an `Authorization: Bearer <token>` header value
    pub fn from_authorization_header(header: Option<&str>) -> Self {
        let token = header
            .and_then(|auth| auth.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self {
            token,
            claimed_organization_id: None,
        }
    }

    pub fn claiming(mut self, organization_id: impl Into<String>) -> Self {
        self.claimed_organization_id = Some(organization_id.into());
        self
    }
}

/// Verified identity behind a credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: String,
    /// Present when the credential itself carries the organization
    pub organization_id: Option<String>,
    pub email: Option<String>,
}

/// Verifies a presented credential.
///
/// Rejections are `Unauthenticated`; this trait never decides tenancy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> SemanticResult<CallerIdentity>;
}
