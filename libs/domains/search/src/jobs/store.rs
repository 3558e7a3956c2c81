use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{SemanticError, SemanticResult};
use crate::models::{FIELD_ORGANIZATION_ID, IndexingJob, JOBS_COLLECTION, JobStatus};
use crate::store::{DocumentStore, Filter};

/// Persistence of job records on top of the document store
pub struct JobStore<S: DocumentStore> {
    store: Arc<S>,
}

impl<S: DocumentStore> Clone for JobStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DocumentStore> JobStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn save(&self, job: &IndexingJob) -> SemanticResult<()> {
        let data = serde_json::to_value(job)?;
        self.store.put(JOBS_COLLECTION, &job.job_id, data).await
    }

    /// Write the record only while the stored copy still reads running.
    /// `false` means someone else changed its status meanwhile.
    pub async fn save_running(&self, job: &IndexingJob) -> SemanticResult<bool> {
        let Value::Object(fields) = serde_json::to_value(job)? else {
            return Err(SemanticError::Internal(format!(
                "job {} did not serialize to an object",
                job.job_id
            )));
        };
        self.store
            .merge_if(JOBS_COLLECTION, &job.job_id, &[Self::still_running()], fields)
            .await
    }

    /// Flip a running record to paused, leaving its counters as stored
    pub async fn mark_paused(&self, job_id: &str) -> SemanticResult<bool> {
        let mut patch = Map::new();
        patch.insert("status".to_string(), serde_json::to_value(JobStatus::Paused)?);
        self.store
            .merge_if(JOBS_COLLECTION, job_id, &[Self::still_running()], patch)
            .await
    }

    fn still_running() -> Filter {
        Filter::eq("status", JobStatus::Running.to_string())
    }

    pub async fn get(&self, job_id: &str) -> SemanticResult<Option<IndexingJob>> {
        self.store
            .get(JOBS_COLLECTION, job_id)
            .await?
            .map(|doc| {
                serde_json::from_value(doc.data).map_err(|e| {
                    SemanticError::Internal(format!("corrupt job record {}: {}", job_id, e))
                })
            })
            .transpose()
    }

    /// Most recently started job for a collection within one organization
    pub async fn latest_for(
        &self,
        collection: &str,
        organization_id: &str,
    ) -> SemanticResult<Option<IndexingJob>> {
        let filters = [
            Filter::eq("collection", collection),
            Filter::eq(FIELD_ORGANIZATION_ID, organization_id),
        ];
        let docs = self.store.find(JOBS_COLLECTION, &filters).await?;

        Ok(docs
            .into_iter()
            .filter_map(|doc| serde_json::from_value::<IndexingJob>(doc.data).ok())
            .max_by(|a, b| {
                a.started_at
                    .cmp(&b.started_at)
                    .then_with(|| a.job_id.cmp(&b.job_id))
            }))
    }
}
