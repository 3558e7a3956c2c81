use async_trait::async_trait;
use chrono::{Duration, Utc};
use core_config::{ConfigError, FromEnv, env_required};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::{CallerIdentity, IdentityProvider};
use crate::error::{SemanticError, SemanticResult};

const MIN_SECRET_LEN: usize = 32;

/// JWT verification configuration.
///
/// Loaded from environment variables:
/// - `JWT_SECRET` (required) - at least 32 characters
#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue {
                key: "JWT_SECRET".to_string(),
                details: format!(
                    "must be at least {} characters (got {}). Generate one with: openssl rand -base64 32",
                    MIN_SECRET_LEN,
                    secret.len()
                ),
            });
        }
        Ok(Self { secret })
    }
}

impl FromEnv for JwtConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Self::new(env_required("JWT_SECRET")?)
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String, // Subject (user ID)
    #[serde(default, alias = "organizationId", skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

/// HS256 bearer token verifier
#[derive(Clone)]
pub struct JwtIdentityProvider {
    secret: String,
}

impl JwtIdentityProvider {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            secret: config.secret.clone(),
        }
    }

    /// Issue a token; used by the operator CLI and tests
    pub fn create_token(
        &self,
        user_id: &str,
        organization_id: Option<&str>,
        email: Option<&str>,
        ttl: Duration,
    ) -> SemanticResult<String> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id.to_string(),
            org_id: organization_id.map(str::to_string),
            email: email.map(str::to_string),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| SemanticError::Internal(format!("failed to sign token: {}", e)))
    }

    pub fn decode_claims(&self, token: &str) -> SemanticResult<JwtClaims> {
        let data = decode::<JwtClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, token: &str) -> SemanticResult<CallerIdentity> {
        let claims = self.decode_claims(token)?;
        if claims.sub.trim().is_empty() {
            return Err(SemanticError::Unauthenticated(
                "token has no subject".to_string(),
            ));
        }
        Ok(CallerIdentity {
            user_id: claims.sub,
            organization_id: claims.org_id.filter(|org| !org.trim().is_empty()),
            email: claims.email,
        })
    }
}
