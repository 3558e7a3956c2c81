//! Search CLI
//!
//! Operator entry point for tenant-scoped semantic search: run and steer
//! batch indexing jobs, index single records and query the index.
//! Every command acts as the tenant of the bearer token it is given.

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use eyre::{Result, WrapErr, eyre};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

mod config;

use config::Config;
use domain_search::{
    BatchIndexOptions, CallerContext, EmbeddingProvider, EmbeddingProviderType,
    FindSimilarRequest, IndexEntityRequest, JwtIdentityProvider, MongoDocumentStore,
    OpenAIProvider, SearchAllRequest, SemanticSearchRequest, SemanticSearchService,
    VertexAIProvider, connect,
};

#[derive(Parser)]
#[command(name = "zerg-search")]
#[command(about = "Semantic search and embedding indexing for business records")]
struct Cli {
    /// Bearer token identifying the caller and its organization
    #[arg(long, env = "SEARCH_API_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every record of a collection owned by the caller's organization
    Index {
        collection: String,

        /// Documents per chunk. Defaults to INDEXING_BATCH_SIZE.
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Embedding requests per second. Defaults to INDEXING_RATE_LIMIT.
        #[arg(short, long)]
        rate_limit: Option<u32>,

        /// Count what would be indexed without calling the provider
        #[arg(long)]
        dry_run: bool,
    },

    /// Resume a paused or failed job from its checkpoint
    Resume { job_id: String },

    /// Pause a running job
    Pause { job_id: String },

    /// Show a job, or the latest job of a collection
    Status {
        job_id: Option<String>,

        #[arg(short, long, conflicts_with = "job_id")]
        collection: Option<String>,
    },

    /// Search one collection
    Search {
        collection: String,
        query: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Search several collections and merge the results
    SearchAll {
        query: String,

        /// Collections to search. Defaults to the business collections.
        #[arg(short, long, value_delimiter = ',')]
        collections: Option<Vec<String>>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Find records similar to an indexed one
    Similar {
        collection: String,
        doc_id: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Embed the given text onto one record
    IndexEntity {
        collection: String,
        doc_id: String,
        text: String,

        /// Extra fields to merge, as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Issue a bearer token signed with JWT_SECRET
    Token {
        user_id: String,

        #[arg(short, long)]
        organization_id: Option<String>,

        #[arg(long, default_value_t = 60)]
        ttl_minutes: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    let cli = Cli::parse();
    let jwt = JwtIdentityProvider::new(&config.jwt);

    if let Commands::Token {
        user_id,
        organization_id,
        ttl_minutes,
    } = &cli.command
    {
        let token = jwt.create_token(
            user_id,
            organization_id.as_deref(),
            None,
            chrono::Duration::minutes(*ttl_minutes),
        )?;
        println!("{}", token);
        return Ok(());
    }

    let caller = match cli.token.as_deref() {
        Some(token) => CallerContext::with_token(token),
        None => return Err(eyre!("a bearer token is required (--token or SEARCH_API_TOKEN)")),
    };

    info!("Connecting to MongoDB...");
    let db = connect(&config.mongo)
        .await
        .wrap_err("MongoDB connection failed")?;
    let store = Arc::new(MongoDocumentStore::new(db));
    let embedder = embedding_provider(config.provider)?;

    let service = SemanticSearchService::new(store, embedder, Arc::new(jwt))
        .with_config(&config.indexing);

    match cli.command {
        Commands::Index {
            collection,
            batch_size,
            rate_limit,
            dry_run,
        } => {
            let defaults = service.default_options();
            let options = BatchIndexOptions {
                batch_size: batch_size.unwrap_or(defaults.batch_size),
                rate_limit: rate_limit.unwrap_or(defaults.rate_limit),
                dry_run,
            };
            info!(%collection, "Starting batch indexing");

            let job = service
                .batch_index_collection(&caller, &collection, Some(options))
                .await?;

            info!(
                "Indexing finished: {} indexed, {} failed, {} skipped of {}",
                job.indexed_documents, job.failed_documents, job.skipped_documents, job.total_documents
            );
            print_json(&job)?;
        }

        Commands::Resume { job_id } => {
            print_json(&service.resume_indexing(&caller, &job_id).await?)?;
        }

        Commands::Pause { job_id } => {
            print_json(&service.pause_indexing(&caller, &job_id).await?)?;
        }

        Commands::Status { job_id, collection } => {
            match (job_id, collection) {
                (Some(job_id), _) => print_json(&service.get_job(&caller, &job_id).await?)?,
                (None, Some(collection)) => {
                    // Prints `null` when the collection was never indexed
                    let latest = service.get_indexing_status(&caller, &collection).await?;
                    if latest.is_none() {
                        info!(%collection, "No indexing job for this collection yet");
                    }
                    print_json(&latest)?;
                }
                (None, None) => return Err(eyre!("pass a job id or --collection")),
            }
        }

        Commands::Search {
            collection,
            query,
            limit,
        } => {
            let request = SemanticSearchRequest {
                query,
                collection,
                limit,
            };
            print_json(&service.semantic_search(&caller, request).await?)?;
        }

        Commands::SearchAll {
            query,
            collections,
            limit,
        } => {
            let request = SearchAllRequest {
                query,
                collections,
                limit,
            };
            print_json(&service.search_all(&caller, request).await?)?;
        }

        Commands::Similar {
            collection,
            doc_id,
            limit,
        } => {
            let request = FindSimilarRequest {
                collection,
                doc_id,
                limit,
            };
            print_json(&service.find_similar(&caller, request).await?)?;
        }

        Commands::IndexEntity {
            collection,
            doc_id,
            text,
            metadata,
        } => {
            let metadata = metadata
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .wrap_err("--metadata must be a JSON object")?;
            let request = IndexEntityRequest {
                collection,
                doc_id,
                text,
                metadata,
            };
            print_json(&service.index_entity(&caller, request).await?)?;
        }

        // Handled before connecting
        Commands::Token { .. } => {}
    }

    Ok(())
}

fn embedding_provider(provider: EmbeddingProviderType) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match provider {
        EmbeddingProviderType::OpenAI => Arc::new(OpenAIProvider::from_env()?),
        EmbeddingProviderType::VertexAI => Arc::new(VertexAIProvider::from_env()?),
    };
    info!(provider = %provider, model = embedder.model().model_name(), "Embedding provider ready");
    Ok(embedder)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_all_splits_collections() {
        let cli = Cli::try_parse_from([
            "zerg-search",
            "--token",
            "t",
            "search-all",
            "roof",
            "--collections",
            "projects,tasks",
        ])
        .unwrap();

        match cli.command {
            Commands::SearchAll { collections, .. } => {
                assert_eq!(
                    collections,
                    Some(vec!["projects".to_string(), "tasks".to_string()])
                );
            }
            _ => panic!("expected search-all"),
        }
        assert_eq!(cli.token.as_deref(), Some("t"));
    }

    #[test]
    fn test_status_rejects_both_selectors() {
        let result = Cli::try_parse_from(["zerg-search", "status", "job-1", "--collection", "projects"]);
        assert!(result.is_err());
    }
}
