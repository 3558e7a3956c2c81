//! MongoDB implementation of DocumentStore

use async_trait::async_trait;
use core_config::mongodb::MongoConfig;
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, Database,
    bson::{Bson, Document, doc, to_document},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions},
};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::instrument;

use super::{DocumentStore, Filter, filter::to_query};
use crate::error::{SemanticError, SemanticResult};
use crate::models::StoredDocument;

/// Server error code for a unique index violation
const DUPLICATE_KEY: i32 = 11000;

/// Connect using a MongoConfig and return the configured database.
///
/// The connection is verified with a `ping` before returning.
pub async fn connect(config: &MongoConfig) -> SemanticResult<Database> {
    tracing::info!(database = %config.database(), "Connecting to MongoDB");

    let mut options = ClientOptions::parse(config.url()).await?;
    options.max_pool_size = Some(config.max_pool_size);
    options.connect_timeout = Some(Duration::from_secs(config.connect_timeout_secs));
    if let Some(ref app_name) = config.app_name {
        options.app_name = Some(app_name.clone());
    }

    let client = Client::with_options(options)?;
    let database = client.database(config.database());
    database
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| SemanticError::Unavailable(format!("MongoDB ping failed: {}", e)))?;

    tracing::info!("Connected to MongoDB");
    Ok(database)
}

/// Documents live in their business collection with `_id` as the string id.
#[derive(Clone)]
pub struct MongoDocumentStore {
    db: Database,
}

impl MongoDocumentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    fn id_filter(id: &str) -> Document {
        doc! { "_id": id }
    }

    fn guarded_filter(id: &str, filters: &[Filter]) -> Document {
        let mut query = to_query(filters);
        query.insert("_id", id);
        query
    }

    fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
        matches!(
            error.kind.as_ref(),
            ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
        )
    }

    fn to_stored(mut raw: Document) -> SemanticResult<StoredDocument> {
        let id = match raw.remove("_id") {
            Some(Bson::String(id)) => id,
            Some(Bson::ObjectId(oid)) => oid.to_hex(),
            Some(other) => other.to_string(),
            None => {
                return Err(SemanticError::Internal(
                    "stored document has no _id".to_string(),
                ));
            }
        };
        Ok(StoredDocument::new(id, Bson::Document(raw).into_relaxed_extjson()))
    }

    fn to_bson_document(id: &str, data: &Value) -> SemanticResult<Document> {
        if !data.is_object() {
            return Err(SemanticError::InvalidArgument(format!(
                "document {} must be a JSON object",
                id
            )));
        }
        let mut document = to_document(data)?;
        document.insert("_id", id);
        Ok(document)
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    #[instrument(skip(self))]
    async fn get(&self, collection: &str, id: &str) -> SemanticResult<Option<StoredDocument>> {
        self.collection(collection)
            .find_one(Self::id_filter(id))
            .await?
            .map(Self::to_stored)
            .transpose()
    }

    #[instrument(skip(self, filters), fields(filter_count = filters.len()))]
    async fn find(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> SemanticResult<Vec<StoredDocument>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();

        let cursor = self
            .collection(collection)
            .find(to_query(filters))
            .with_options(options)
            .await?;
        let raw: Vec<Document> = cursor.try_collect().await?;

        raw.into_iter().map(Self::to_stored).collect()
    }

    #[instrument(skip(self, patch), fields(fields = patch.len()))]
    async fn merge(
        &self,
        collection: &str,
        id: &str,
        patch: Map<String, Value>,
    ) -> SemanticResult<()> {
        let set = to_document(&patch)?;
        let result = self
            .collection(collection)
            .update_one(Self::id_filter(id), doc! { "$set": set })
            .await?;

        if result.matched_count == 0 {
            return Err(SemanticError::not_found(collection, id));
        }
        Ok(())
    }

    #[instrument(skip(self, data))]
    async fn put(&self, collection: &str, id: &str, data: Value) -> SemanticResult<()> {
        let document = Self::to_bson_document(id, &data)?;
        self.collection(collection)
            .replace_one(Self::id_filter(id), document)
            .upsert(true)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, data))]
    async fn create(&self, collection: &str, id: &str, data: Value) -> SemanticResult<bool> {
        let document = Self::to_bson_document(id, &data)?;
        match self.collection(collection).insert_one(document).await {
            Ok(_) => Ok(true),
            Err(e) if Self::is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, filters, patch), fields(filter_count = filters.len()))]
    async fn merge_if(
        &self,
        collection: &str,
        id: &str,
        filters: &[Filter],
        patch: Map<String, Value>,
    ) -> SemanticResult<bool> {
        let set = to_document(&patch)?;
        let result = self
            .collection(collection)
            .update_one(Self::guarded_filter(id, filters), doc! { "$set": set })
            .await?;
        Ok(result.matched_count > 0)
    }

    #[instrument(skip(self, filters), fields(filter_count = filters.len()))]
    async fn remove(&self, collection: &str, id: &str, filters: &[Filter]) -> SemanticResult<bool> {
        let result = self
            .collection(collection)
            .delete_one(Self::guarded_filter(id, filters))
            .await?;
        Ok(result.deleted_count > 0)
    }
}
