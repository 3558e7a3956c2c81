use crate::{env_parse, ConfigError, FromEnv};

/// Defaults applied to batch indexing runs and searches when the caller
/// does not override them.
///
/// Environment variables:
/// - `INDEXING_BATCH_SIZE` (default: 50)
/// - `INDEXING_RATE_LIMIT` requests per second against the embedding provider (default: 10)
/// - `SEARCH_DEFAULT_LIMIT` (default: 10)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexingConfig {
    pub batch_size: usize,
    pub rate_limit: u32,
    pub search_default_limit: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            rate_limit: 10,
            search_default_limit: 10,
        }
    }
}

impl FromEnv for IndexingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            batch_size: env_parse("INDEXING_BATCH_SIZE", defaults.batch_size)?,
            rate_limit: env_parse("INDEXING_RATE_LIMIT", defaults.rate_limit)?,
            search_default_limit: env_parse("SEARCH_DEFAULT_LIMIT", defaults.search_default_limit)?,
        };

        if config.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INDEXING_BATCH_SIZE".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }
        if config.rate_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INDEXING_RATE_LIMIT".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }

        Ok(config)
    }
}
