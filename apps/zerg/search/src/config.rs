//! Configuration for the search CLI

use core_config::indexing::IndexingConfig;
use core_config::mongodb::MongoConfig;
use core_config::{ConfigError, Environment, FromEnv, env_or_default};
use domain_search::{EmbeddingProviderType, JwtConfig};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub mongo: MongoConfig,
    pub indexing: IndexingConfig,
    pub jwt: JwtConfig,
    pub provider: EmbeddingProviderType,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            environment: Environment::from_env(),
            mongo: MongoConfig::from_env()?,
            indexing: IndexingConfig::from_env()?,
            jwt: JwtConfig::from_env()?,
            provider: provider_from_env()?,
        })
    }
}

/// `EMBEDDING_PROVIDER`: `openai` (default) or `vertexai`
pub fn provider_from_env() -> Result<EmbeddingProviderType, ConfigError> {
    let raw = env_or_default("EMBEDDING_PROVIDER", "openai");
    EmbeddingProviderType::from_str(&raw.to_lowercase()).map_err(|_| ConfigError::InvalidValue {
        key: "EMBEDDING_PROVIDER".to_string(),
        details: format!("unknown provider '{}', expected openai or vertexai", raw),
    })
}
