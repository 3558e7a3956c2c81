//! Tenant isolation.
//!
//! Every public operation starts by turning the caller's credential into a
//! [`TenantContext`]. The organization always comes from verified data: the
//! token's own claim, or the caller's user profile.

mod identity;
mod jwt;

pub use identity::{CallerContext, CallerIdentity, IdentityProvider};
pub use jwt::{JwtClaims, JwtConfig, JwtIdentityProvider};

#[cfg(test)]
pub use identity::MockIdentityProvider;

use std::sync::Arc;
use tracing::instrument;

use crate::error::{SemanticError, SemanticResult};
use crate::models::{FIELD_ORGANIZATION_ID, StoredDocument, TenantContext, USERS_COLLECTION};
use crate::store::DocumentStore;

pub struct TenantGuard<S: DocumentStore> {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<S>,
}

impl<S: DocumentStore> Clone for TenantGuard<S> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DocumentStore> TenantGuard<S> {
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<S>) -> Self {
        Self { identity, store }
    }

    /// Resolve the caller to exactly one organization.
    ///
    /// Missing or invalid credential is `Unauthenticated`; a valid identity
    /// without an organization is `PermissionDenied`.
    #[instrument(skip(self, caller))]
    pub async fn resolve(&self, caller: &CallerContext) -> SemanticResult<TenantContext> {
        let token = caller
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SemanticError::Unauthenticated("no credential presented".to_string()))?;

        let identity = self.identity.verify(token).await?;
        let organization_id = match identity.organization_id {
            Some(org) => org,
            None => self.profile_organization(&identity.user_id).await?,
        };

        if let Some(claimed) = caller.claimed_organization_id.as_deref() {
            if claimed != organization_id {
                tracing::warn!(
                    user_id = %identity.user_id,
                    claimed_organization_id = %claimed,
                    organization_id = %organization_id,
                    "Ignoring client-supplied organization id"
                );
            }
        }

        Ok(TenantContext::new(organization_id, identity.user_id))
    }

    async fn profile_organization(&self, user_id: &str) -> SemanticResult<String> {
        let profile = self.store.get(USERS_COLLECTION, user_id).await?;
        profile
            .as_ref()
            .and_then(|doc| doc.field(FIELD_ORGANIZATION_ID))
            .and_then(|v| v.as_str())
            .filter(|org| !org.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                SemanticError::PermissionDenied(format!(
                    "user {} does not belong to an organization",
                    user_id
                ))
            })
    }
}

/// Reject access to a stored document owned by another organization
pub fn ensure_owner(
    tenant: &TenantContext,
    collection: &str,
    document: &StoredDocument,
) -> SemanticResult<()> {
    if document.organization_id() != Some(tenant.organization_id.as_str()) {
        tracing::warn!(
            collection,
            doc_id = %document.id,
            organization_id = %tenant.organization_id,
            "Cross-tenant document access rejected"
        );
        return Err(SemanticError::PermissionDenied(format!(
            "document {}/{} belongs to another organization",
            collection, document.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryDocumentStore, MockDocumentStore};
    use serde_json::json;

    fn identity_with(org: Option<&'static str>) -> Arc<dyn IdentityProvider> {
        let mut mock = MockIdentityProvider::new();
        mock.expect_verify().returning(move |_| {
            Ok(CallerIdentity {
                user_id: "user-1".to_string(),
                organization_id: org.map(str::to_string),
                email: None,
            })
        });
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthenticated() {
        let guard = TenantGuard::new(identity_with(Some("org-1")), Arc::new(InMemoryDocumentStore::new()));
        let err = guard.resolve(&CallerContext::anonymous()).await.unwrap_err();
        assert!(matches!(err, SemanticError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthenticated() {
        let mut mock = MockIdentityProvider::new();
        mock.expect_verify()
            .returning(|_| Err(SemanticError::Unauthenticated("bad signature".to_string())));
        let guard = TenantGuard::new(Arc::new(mock), Arc::new(InMemoryDocumentStore::new()));

        let err = guard.resolve(&CallerContext::with_token("forged")).await.unwrap_err();
        assert!(matches!(err, SemanticError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_token_claim_wins_over_client_claim() {
        let mut store = MockDocumentStore::new();
        store.expect_get().never();
        let guard = TenantGuard::new(identity_with(Some("org-1")), Arc::new(store));

        let caller = CallerContext::with_token("t").claiming("org-2");
        let tenant = guard.resolve(&caller).await.unwrap();
        assert_eq!(tenant, TenantContext::new("org-1", "user-1"));
    }

    #[tokio::test]
    async fn test_falls_back_to_user_profile() {
        let store = InMemoryDocumentStore::new();
        store
            .insert(USERS_COLLECTION, "user-1", json!({ "organizationId": "org-7" }))
            .await;
        let guard = TenantGuard::new(identity_with(None), Arc::new(store));

        let tenant = guard.resolve(&CallerContext::with_token("t")).await.unwrap();
        assert_eq!(tenant.organization_id, "org-7");
    }

    #[tokio::test]
    async fn test_identity_without_organization_is_denied() {
        let guard = TenantGuard::new(identity_with(None), Arc::new(InMemoryDocumentStore::new()));
        let err = guard.resolve(&CallerContext::with_token("t")).await.unwrap_err();
        assert!(matches!(err, SemanticError::PermissionDenied(_)));
    }

    #[test]
    fn test_ensure_owner() {
        let tenant = TenantContext::new("org-1", "user-1");
        let own = StoredDocument::new("p-1", json!({ "organizationId": "org-1" }));
        let foreign = StoredDocument::new("p-2", json!({ "organizationId": "org-2" }));
        let orphan = StoredDocument::new("p-3", json!({}));

        assert!(ensure_owner(&tenant, "projects", &own).is_ok());
        assert!(matches!(
            ensure_owner(&tenant, "projects", &foreign),
            Err(SemanticError::PermissionDenied(_))
        ));
        assert!(ensure_owner(&tenant, "projects", &orphan).is_err());
    }
}
