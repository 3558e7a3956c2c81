use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::instrument;
use validator::Validate;

use super::JobStore;
use super::lock::{Lease, RunLocks, lease_ttl};
use crate::error::{SemanticError, SemanticResult};
use crate::indexer::EntityIndexer;
use crate::metrics::{DocumentOutcome, IndexingMetrics};
use crate::models::{
    BatchIndexOptions, FIELD_ORGANIZATION_ID, IndexOutcome, IndexingJob, JobStatus,
    TenantContext,
};
use crate::store::{DocumentStore, Filter};
use crate::text::TextExtractor;

/// Documents processed between two job record writes
const PERSIST_EVERY: u64 = 10;

type RunKey = (String, String);

struct ActiveRun {
    job_id: String,
    pause: Arc<AtomicBool>,
}

type ActiveRuns = Arc<Mutex<HashMap<RunKey, ActiveRun>>>;

/// Frees the in-process slot when a run ends, however it ends
struct LocalSlot {
    active: ActiveRuns,
    key: RunKey,
    pause: Arc<AtomicBool>,
}

impl Drop for LocalSlot {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.remove(&self.key);
    }
}

/// Exclusive right to run: the local slot carries the pause flag, the lease
/// is what other processes sharing the store see
struct RunClaim {
    slot: LocalSlot,
    lease: Lease,
}

enum RunEnd {
    Completed,
    Paused,
    /// The lease expired and another run took it over
    Superseded,
}

/// Drives batch indexing jobs: launch, resume, pause and status.
///
/// At most one run per `(collection, organization)` is active across every
/// manager sharing the document store; the rule is held by a lease record in
/// the store. Runs are synchronous from the caller's point of view and return
/// the final job snapshot.
pub struct IndexingJobManager<S: DocumentStore> {
    store: Arc<S>,
    jobs: JobStore<S>,
    locks: RunLocks<S>,
    indexer: EntityIndexer<S>,
    extractor: Arc<TextExtractor>,
    active: ActiveRuns,
}

impl<S: DocumentStore> Clone for IndexingJobManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            jobs: self.jobs.clone(),
            locks: self.locks.clone(),
            indexer: self.indexer.clone(),
            extractor: Arc::clone(&self.extractor),
            active: Arc::clone(&self.active),
        }
    }
}

impl<S: DocumentStore> IndexingJobManager<S> {
    pub fn new(store: Arc<S>, indexer: EntityIndexer<S>, extractor: Arc<TextExtractor>) -> Self {
        Self {
            jobs: JobStore::new(Arc::clone(&store)),
            locks: RunLocks::new(Arc::clone(&store)),
            store,
            indexer,
            extractor,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn job_store(&self) -> &JobStore<S> {
        &self.jobs
    }

    /// Index every document of `collection` owned by the tenant
    #[instrument(skip(self, tenant, options), fields(organization_id = %tenant.organization_id))]
    pub async fn batch_index_collection(
        &self,
        collection: &str,
        tenant: &TenantContext,
        options: BatchIndexOptions,
    ) -> SemanticResult<IndexingJob> {
        options.validate()?;

        let job = IndexingJob::new(collection, tenant, options);
        let claim = self.claim(&job).await?;

        tracing::info!(
            job_id = %job.job_id,
            batch_size = job.options.batch_size,
            rate_limit = job.options.rate_limit,
            dry_run = job.options.dry_run,
            "Indexing job started"
        );
        let result = match self.jobs.save(&job).await {
            Ok(()) => self.run(job, &claim, false).await,
            Err(e) => Err(e),
        };
        self.release(claim).await;
        result
    }

    /// Continue a paused or failed job from its checkpoint
    #[instrument(skip(self, tenant), fields(organization_id = %tenant.organization_id))]
    pub async fn resume_indexing(
        &self,
        job_id: &str,
        tenant: &TenantContext,
    ) -> SemanticResult<IndexingJob> {
        let job = self.owned_job(job_id, tenant).await?;
        Self::ensure_resumable(&job)?;

        let claim = self.claim(&job).await?;
        let result = self.reopen(job_id, tenant, &claim).await;
        self.release(claim).await;
        result
    }

    /// Ask a running job to stop at the next document boundary.
    ///
    /// When the run lives in this manager only its pause flag is raised; the
    /// run records its own paused state and the stored snapshot is returned
    /// as is. Otherwise the stored status is switched to paused provided it
    /// still reads running: a run in another process notices at its next
    /// checkpoint write, and a job whose process died becomes resumable.
    #[instrument(skip(self, tenant), fields(organization_id = %tenant.organization_id))]
    pub async fn pause_indexing(
        &self,
        job_id: &str,
        tenant: &TenantContext,
    ) -> SemanticResult<IndexingJob> {
        let job = self.owned_job(job_id, tenant).await?;
        Self::ensure_running(&job)?;

        if self.signal_pause(&job) {
            tracing::info!(job_id = %job.job_id, live = true, "Indexing job pause requested");
            return Ok(job);
        }

        if !self.jobs.mark_paused(job_id).await? {
            // The run finished or failed after the read above
            let current = self.owned_job(job_id, tenant).await?;
            return Err(SemanticError::FailedPrecondition(format!(
                "job {} is {}, only running jobs can be paused",
                job_id, current.status
            )));
        }

        tracing::info!(job_id = %job.job_id, live = false, "Indexing job pause requested");
        self.owned_job(job_id, tenant).await
    }

    /// One job by id, scoped to the tenant
    pub async fn get_job(&self, job_id: &str, tenant: &TenantContext) -> SemanticResult<IndexingJob> {
        self.owned_job(job_id, tenant).await
    }

    /// Latest job for `collection` within the tenant, if any
    pub async fn latest_job(
        &self,
        collection: &str,
        tenant: &TenantContext,
    ) -> SemanticResult<Option<IndexingJob>> {
        self.jobs.latest_for(collection, &tenant.organization_id).await
    }

    async fn owned_job(&self, job_id: &str, tenant: &TenantContext) -> SemanticResult<IndexingJob> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| SemanticError::NotFound(format!("indexing job {} does not exist", job_id)))?;
        if job.organization_id != tenant.organization_id {
            return Err(SemanticError::PermissionDenied(format!(
                "indexing job {} belongs to another organization",
                job_id
            )));
        }
        Ok(job)
    }

    fn ensure_resumable(job: &IndexingJob) -> SemanticResult<()> {
        if job.status.is_resumable() {
            return Ok(());
        }
        Err(SemanticError::FailedPrecondition(format!(
            "job {} is {} and cannot be resumed",
            job.job_id, job.status
        )))
    }

    fn ensure_running(job: &IndexingJob) -> SemanticResult<()> {
        if job.status == JobStatus::Running {
            return Ok(());
        }
        Err(SemanticError::FailedPrecondition(format!(
            "job {} is {}, only running jobs can be paused",
            job.job_id, job.status
        )))
    }

    /// Raise the pause flag of a run of this manager; `false` if none is live here
    fn signal_pause(&self, job: &IndexingJob) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.get(&(job.collection.clone(), job.organization_id.clone())) {
            Some(run) if run.job_id == job.job_id => {
                run.pause.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    async fn reopen(
        &self,
        job_id: &str,
        tenant: &TenantContext,
        claim: &RunClaim,
    ) -> SemanticResult<IndexingJob> {
        // Re-read under the lease: another process may have resumed it meanwhile
        let mut job = self.owned_job(job_id, tenant).await?;
        Self::ensure_resumable(&job)?;
        job.transition(JobStatus::Running)?;
        self.jobs.save(&job).await?;

        tracing::info!(
            job_id = %job.job_id,
            checkpoint = job.checkpoint.as_ref().map(|c| c.last_doc_id.as_str()),
            "Indexing job resumed"
        );
        self.run(job, claim, true).await
    }

    async fn claim(&self, job: &IndexingJob) -> SemanticResult<RunClaim> {
        let slot = self.reserve(&job.collection, &job.organization_id, &job.job_id)?;
        let lease = self
            .locks
            .acquire(
                &job.collection,
                &job.organization_id,
                &job.job_id,
                lease_ttl(&job.options),
            )
            .await?;
        Ok(RunClaim { slot, lease })
    }

    fn reserve(&self, collection: &str, organization_id: &str, job_id: &str) -> SemanticResult<LocalSlot> {
        let key = (collection.to_string(), organization_id.to_string());
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = active.get(&key) {
            return Err(SemanticError::FailedPrecondition(format!(
                "job {} is already indexing {} for this organization",
                run.job_id, collection
            )));
        }

        let pause = Arc::new(AtomicBool::new(false));
        active.insert(
            key.clone(),
            ActiveRun {
                job_id: job_id.to_string(),
                pause: Arc::clone(&pause),
            },
        );
        Ok(LocalSlot {
            active: Arc::clone(&self.active),
            key,
            pause,
        })
    }

    /// Give the lease back; a lease that cannot be removed simply expires
    async fn release(&self, claim: RunClaim) {
        match self.locks.release(&claim.lease).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(owner = %claim.lease.owner(), "Run lease was already taken over");
            }
            Err(e) => {
                tracing::warn!(owner = %claim.lease.owner(), error = %e, "Failed to release run lease");
            }
        }
    }

    async fn run(
        &self,
        mut job: IndexingJob,
        claim: &RunClaim,
        resume: bool,
    ) -> SemanticResult<IndexingJob> {
        let started = Instant::now();
        let metrics = IndexingMetrics::new(&job.collection);

        let outcome = match self.process(&mut job, claim, resume, &metrics).await {
            Ok(RunEnd::Completed) => job.transition(JobStatus::Completed),
            Ok(RunEnd::Paused) => job.transition(JobStatus::Paused),
            Ok(RunEnd::Superseded) => {
                // The record now belongs to the run holding the lease
                tracing::warn!(job_id = %job.job_id, "Run lease lost, stopping without writing");
                return Err(SemanticError::FailedPrecondition(format!(
                    "job {} lost its run lease to another run",
                    job.job_id
                )));
            }
            Err(e) => Err(e),
        };
        let outcome = match outcome {
            Ok(()) => self.jobs.save(&job).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            job.mark_failed(e.to_string());
            if let Err(save_err) = self.jobs.save(&job).await {
                tracing::error!(job_id = %job.job_id, error = %save_err, "Failed to persist failed job");
            }
            tracing::error!(job_id = %job.job_id, error = %e, "Indexing job failed");
            metrics.run_finished(JobStatus::Failed, started.elapsed());
            return Err(e);
        }

        tracing::info!(
            job_id = %job.job_id,
            status = %job.status,
            total = job.total_documents,
            indexed = job.indexed_documents,
            failed = job.failed_documents,
            skipped = job.skipped_documents,
            "Indexing run finished"
        );
        metrics.run_finished(job.status, started.elapsed());
        Ok(job)
    }

    async fn process(
        &self,
        job: &mut IndexingJob,
        claim: &RunClaim,
        resume: bool,
        metrics: &IndexingMetrics,
    ) -> SemanticResult<RunEnd> {
        let filters = [Filter::eq(FIELD_ORGANIZATION_ID, job.organization_id.as_str())];
        let mut documents = self.store.find(&job.collection, &filters).await?;
        documents.retain(|doc| doc.organization_id() == Some(job.organization_id.as_str()));
        // Checkpoints compare ids as strings, so walk in that order whatever the store's sort
        documents.sort_by(|a, b| a.id.cmp(&b.id));

        if resume {
            if let Some(checkpoint) = &job.checkpoint {
                let last = checkpoint.last_doc_id.clone();
                documents.retain(|doc| doc.id > last);
            }
        }
        job.total_documents = job.processed_documents() + documents.len() as u64;
        if !self.jobs.save_running(job).await? {
            return Ok(RunEnd::Paused);
        }

        let options = job.options.clone();
        let delay = options.chunk_delay();
        let mut since_persist = 0u64;

        for (chunk_index, chunk) in documents.chunks(options.batch_size).enumerate() {
            if chunk_index > 0 {
                if !options.dry_run && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if !self.locks.renew(&claim.lease).await? {
                    return Ok(RunEnd::Superseded);
                }
            }

            for doc in chunk {
                if claim.slot.pause.load(Ordering::SeqCst) {
                    return Ok(RunEnd::Paused);
                }

                let text = self.extractor.extract(&job.collection, &doc.data);
                let outcome = if text.is_empty() {
                    DocumentOutcome::Skipped
                } else if options.dry_run {
                    DocumentOutcome::Indexed
                } else {
                    match self.indexer.index_entity(&job.collection, &doc.id, &text, None).await {
                        Ok(ack) if ack.outcome == IndexOutcome::Skipped => DocumentOutcome::Skipped,
                        Ok(_) => DocumentOutcome::Indexed,
                        Err(e) => {
                            tracing::warn!(job_id = %job.job_id, doc_id = %doc.id, error = %e, "Document failed to index");
                            job.record_error(doc.id.clone(), e.to_string());
                            DocumentOutcome::Failed
                        }
                    }
                };

                match outcome {
                    DocumentOutcome::Indexed => job.indexed_documents += 1,
                    DocumentOutcome::Skipped => job.skipped_documents += 1,
                    DocumentOutcome::Failed => job.failed_documents += 1,
                }
                metrics.document(outcome);
                job.advance_checkpoint(&doc.id);

                since_persist += 1;
                if since_persist >= PERSIST_EVERY {
                    since_persist = 0;
                    if !self.locks.renew(&claim.lease).await? {
                        return Ok(RunEnd::Superseded);
                    }
                    // A pause from another process flips the stored status
                    if !self.jobs.save_running(job).await? {
                        return Ok(RunEnd::Paused);
                    }
                }
            }
        }

        Ok(RunEnd::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, MockEmbeddingProvider};
    use crate::models::{EmbeddingResult, LOCKS_COLLECTION, StoredDocument};
    use crate::store::{InMemoryDocumentStore, MockDocumentStore};
    use serde_json::{Map, Value, json};
    use std::sync::atomic::AtomicUsize;

    fn manager_with(
        store: Arc<InMemoryDocumentStore>,
        provider: MockEmbeddingProvider,
    ) -> IndexingJobManager<InMemoryDocumentStore> {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(provider);
        let indexer = EntityIndexer::new(Arc::clone(&store), provider);
        IndexingJobManager::new(store, indexer, Arc::new(TextExtractor::with_defaults()))
    }

    fn ok_provider() -> MockEmbeddingProvider {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .returning(|_| Ok(EmbeddingResult::new(vec![0.1, 0.2])));
        provider
    }

    async fn seed(store: &InMemoryDocumentStore, count: usize, org: &str) {
        for i in 0..count {
            store
                .insert(
                    "projects",
                    &format!("p-{:03}", i),
                    json!({ "name": format!("Project {}", i), "organizationId": org }),
                )
                .await;
        }
    }

    fn fast() -> BatchIndexOptions {
        BatchIndexOptions {
            batch_size: 5,
            rate_limit: 10_000,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn test_batch_completes_and_counts() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 12, "org-1").await;
        seed_blank(&store).await;
        let manager = manager_with(Arc::clone(&store), ok_provider());
        let tenant = TenantContext::new("org-1", "user-1");

        let job = manager
            .batch_index_collection("projects", &tenant, fast())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_documents, 13);
        assert_eq!(job.indexed_documents, 12);
        assert_eq!(job.skipped_documents, 1);
        assert!(job.completed_at.is_some());

        let stored = manager.job_store().get(&job.job_id).await.unwrap().unwrap();
        assert_eq!(stored, job);
    }

    async fn seed_blank(store: &InMemoryDocumentStore) {
        store
            .insert("projects", "p-blank", json!({ "name": "", "organizationId": "org-1" }))
            .await;
    }

    #[tokio::test]
    async fn test_per_document_failure_is_isolated() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 4, "org-1").await;

        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().returning(|text| {
            if text == "Project 2" {
                Err(SemanticError::Unavailable("rate limited".to_string()))
            } else {
                Ok(EmbeddingResult::new(vec![1.0, 0.0]))
            }
        });
        let manager = manager_with(store, provider);

        let job = manager
            .batch_index_collection("projects", &TenantContext::new("org-1", "u"), fast())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.indexed_documents, 3);
        assert_eq!(job.failed_documents, 1);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].doc_id, "p-002");
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_provider() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 3, "org-1").await;
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().never();
        let manager = manager_with(Arc::clone(&store), provider);

        let job = manager
            .batch_index_collection(
                "projects",
                &TenantContext::new("org-1", "u"),
                BatchIndexOptions::default().with_dry_run(true),
            )
            .await
            .unwrap();

        assert_eq!(job.indexed_documents, 3);
        let doc = store.get("projects", "p-000").await.unwrap().unwrap();
        assert!(!doc.has_embedding());
        assert!(manager.job_store().get(&job.job_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let manager = manager_with(Arc::new(InMemoryDocumentStore::new()), ok_provider());
        let options = BatchIndexOptions {
            batch_size: 0,
            ..Default::default()
        };
        let err = manager
            .batch_index_collection("projects", &TenantContext::new("org-1", "u"), options)
            .await
            .unwrap_err();
        assert!(matches!(err, SemanticError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_only_tenant_documents_are_touched() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 2, "org-1").await;
        store
            .insert("projects", "z-foreign", json!({ "name": "Other", "organizationId": "org-2" }))
            .await;
        let manager = manager_with(Arc::clone(&store), ok_provider());

        let job = manager
            .batch_index_collection("projects", &TenantContext::new("org-1", "u"), fast())
            .await
            .unwrap();
        assert_eq!(job.total_documents, 2);

        let foreign = store.get("projects", "z-foreign").await.unwrap().unwrap();
        assert!(!foreign.has_embedding());
    }

    #[tokio::test]
    async fn test_resume_rules() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 2, "org-1").await;
        let manager = manager_with(store, ok_provider());
        let tenant = TenantContext::new("org-1", "u");

        let done = manager
            .batch_index_collection("projects", &tenant, fast())
            .await
            .unwrap();

        let err = manager.resume_indexing(&done.job_id, &tenant).await.unwrap_err();
        assert!(matches!(err, SemanticError::FailedPrecondition(_)));

        let err = manager
            .resume_indexing(&done.job_id, &TenantContext::new("org-2", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SemanticError::PermissionDenied(_)));

        let err = manager.resume_indexing("index_nope", &tenant).await.unwrap_err();
        assert!(matches!(err, SemanticError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_orphaned_running_job_can_be_paused_and_resumed() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 6, "org-1").await;
        let manager = manager_with(Arc::clone(&store), ok_provider());
        let tenant = TenantContext::new("org-1", "u");

        // A run that died after three documents
        let mut orphan = IndexingJob::new("projects", &tenant, fast());
        orphan.total_documents = 6;
        orphan.indexed_documents = 3;
        orphan.advance_checkpoint("p-002");
        manager.job_store().save(&orphan).await.unwrap();

        let paused = manager.pause_indexing(&orphan.job_id, &tenant).await.unwrap();
        assert_eq!(paused.status, JobStatus::Paused);

        let resumed = manager.resume_indexing(&orphan.job_id, &tenant).await.unwrap();
        assert_eq!(resumed.status, JobStatus::Completed);
        assert_eq!(resumed.indexed_documents, 6);
        assert_eq!(resumed.total_documents, 6);

        // Documents before the checkpoint were not re-embedded
        let early = store.get("projects", "p-000").await.unwrap().unwrap();
        assert!(!early.has_embedding());
        let late = store.get("projects", "p-005").await.unwrap().unwrap();
        assert!(late.has_embedding());
    }

    #[tokio::test]
    async fn test_store_failure_marks_job_failed() {
        let mut store = MockDocumentStore::new();
        store.expect_create().returning(|_, _, _| Ok(true));
        store.expect_remove().times(1).returning(|_, _, _| Ok(true));
        store.expect_put().returning(|_, _, _| Ok(()));
        store
            .expect_find()
            .returning(|_, _| Err(SemanticError::Internal("connection reset".to_string())));
        let store = Arc::new(store);

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new());
        let indexer = EntityIndexer::new(Arc::clone(&store), provider);
        let manager =
            IndexingJobManager::new(store, indexer, Arc::new(TextExtractor::with_defaults()));

        let err = manager
            .batch_index_collection("projects", &TenantContext::new("org-1", "u"), fast())
            .await
            .unwrap_err();
        assert!(matches!(err, SemanticError::Internal(_)));
    }

    #[tokio::test]
    async fn test_claim_is_released_after_run() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let manager = manager_with(Arc::clone(&store), ok_provider());
        let tenant = TenantContext::new("org-1", "u");

        let holder = IndexingJob::new("projects", &tenant, fast());
        let claim = manager.claim(&holder).await.unwrap();
        let err = manager
            .batch_index_collection("projects", &tenant, fast())
            .await
            .unwrap_err();
        assert!(matches!(err, SemanticError::FailedPrecondition(_)));

        // Other collections are independent
        let other = IndexingJob::new("tasks", &tenant, fast());
        assert!(manager.claim(&other).await.is_ok());

        manager.release(claim).await;
        let job = manager
            .batch_index_collection("projects", &tenant, fast())
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(store.len(LOCKS_COLLECTION).await, 1);
    }

    #[tokio::test]
    async fn test_run_exclusivity_spans_managers_sharing_a_store() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 3, "org-1").await;
        let first = manager_with(Arc::clone(&store), ok_provider());
        let second = manager_with(Arc::clone(&store), ok_provider());
        let tenant = TenantContext::new("org-1", "u");

        let holder = IndexingJob::new("projects", &tenant, fast());
        let claim = first.claim(&holder).await.unwrap();

        let err = second
            .batch_index_collection("projects", &tenant, fast())
            .await
            .unwrap_err();
        assert!(matches!(err, SemanticError::FailedPrecondition(ref m) if m.contains(&holder.job_id)));
        let untouched = store.get("projects", "p-000").await.unwrap().unwrap();
        assert!(!untouched.has_embedding());

        first.release(claim).await;
        let job = second
            .batch_index_collection("projects", &tenant, fast())
            .await
            .unwrap();
        assert_eq!(job.indexed_documents, 3);
        assert_eq!(store.len(LOCKS_COLLECTION).await, 0);
    }

    #[tokio::test]
    async fn test_pause_of_live_run_only_raises_the_flag() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let manager = manager_with(Arc::clone(&store), ok_provider());
        let tenant = TenantContext::new("org-1", "u");

        let job = IndexingJob::new("projects", &tenant, fast());
        manager.job_store().save(&job).await.unwrap();
        let slot = manager.reserve("projects", "org-1", &job.job_id).unwrap();

        let snapshot = manager.pause_indexing(&job.job_id, &tenant).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Running);
        assert!(slot.pause.load(Ordering::SeqCst));

        // The run loop writes its own paused state
        let stored = manager.job_store().get(&job.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_pause_never_overwrites_a_run_that_just_finished() {
        let tenant = TenantContext::new("org-1", "u");
        let running = IndexingJob::new("projects", &tenant, fast());
        let mut finished = running.clone();
        finished.indexed_documents = 20;
        finished.transition(JobStatus::Completed).unwrap();

        let before = serde_json::to_value(&running).unwrap();
        let after = serde_json::to_value(&finished).unwrap();
        let reads = Arc::new(AtomicUsize::new(0));

        let mut store = MockDocumentStore::new();
        store.expect_get().returning(move |_, id| {
            // First read still sees the run in progress, later reads see it completed
            let data = if reads.fetch_add(1, Ordering::SeqCst) == 0 {
                before.clone()
            } else {
                after.clone()
            };
            Ok(Some(StoredDocument::new(id, data)))
        });
        store.expect_merge_if().times(1).returning(|_, _, _, _| Ok(false));
        store.expect_put().never();
        let store = Arc::new(store);

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new());
        let indexer = EntityIndexer::new(Arc::clone(&store), provider);
        let manager =
            IndexingJobManager::new(store, indexer, Arc::new(TextExtractor::with_defaults()));

        let err = manager.pause_indexing(&running.job_id, &tenant).await.unwrap_err();
        assert!(matches!(err, SemanticError::FailedPrecondition(ref m) if m.contains("completed")));
    }

    /// Hands back `find` results in reverse id order, like a store whose
    /// native sort disagrees with string order
    struct ReversedFind(InMemoryDocumentStore);

    #[async_trait::async_trait]
    impl DocumentStore for ReversedFind {
        async fn get(&self, collection: &str, id: &str) -> SemanticResult<Option<StoredDocument>> {
            self.0.get(collection, id).await
        }

        async fn find(&self, collection: &str, filters: &[Filter]) -> SemanticResult<Vec<StoredDocument>> {
            let mut docs = self.0.find(collection, filters).await?;
            docs.reverse();
            Ok(docs)
        }

        async fn merge(&self, collection: &str, id: &str, patch: Map<String, Value>) -> SemanticResult<()> {
            self.0.merge(collection, id, patch).await
        }

        async fn put(&self, collection: &str, id: &str, data: Value) -> SemanticResult<()> {
            self.0.put(collection, id, data).await
        }

        async fn create(&self, collection: &str, id: &str, data: Value) -> SemanticResult<bool> {
            self.0.create(collection, id, data).await
        }

        async fn merge_if(
            &self,
            collection: &str,
            id: &str,
            filters: &[Filter],
            patch: Map<String, Value>,
        ) -> SemanticResult<bool> {
            self.0.merge_if(collection, id, filters, patch).await
        }

        async fn remove(&self, collection: &str, id: &str, filters: &[Filter]) -> SemanticResult<bool> {
            self.0.remove(collection, id, filters).await
        }
    }

    #[tokio::test]
    async fn test_documents_are_walked_in_checkpoint_order() {
        let inner = InMemoryDocumentStore::new();
        seed(&inner, 4, "org-1").await;
        let store = Arc::new(ReversedFind(inner));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut provider = MockEmbeddingProvider::new();
        {
            let seen = Arc::clone(&seen);
            provider.expect_embed().returning(move |text| {
                seen.lock().unwrap().push(text.to_string());
                Ok(EmbeddingResult::new(vec![1.0, 0.0]))
            });
        }
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(provider);
        let indexer = EntityIndexer::new(Arc::clone(&store), provider);
        let manager =
            IndexingJobManager::new(Arc::clone(&store), indexer, Arc::new(TextExtractor::with_defaults()));
        let tenant = TenantContext::new("org-1", "u");

        // A paused job whose checkpoint says p-000 and p-001 are done
        let mut paused = IndexingJob::new("projects", &tenant, fast());
        paused.total_documents = 4;
        paused.indexed_documents = 2;
        paused.advance_checkpoint("p-001");
        paused.transition(JobStatus::Paused).unwrap();
        manager.job_store().save(&paused).await.unwrap();

        let resumed = manager.resume_indexing(&paused.job_id, &tenant).await.unwrap();
        assert_eq!(resumed.indexed_documents, 4);
        assert_eq!(*seen.lock().unwrap(), vec!["Project 2", "Project 3"]);
        assert_eq!(
            resumed.checkpoint.map(|c| c.last_doc_id),
            Some("p-003".to_string())
        );

        let fresh = manager
            .batch_index_collection("projects", &tenant, fast())
            .await
            .unwrap();
        assert_eq!(fresh.checkpoint.map(|c| c.last_doc_id), Some("p-003".to_string()));
        assert_eq!(
            seen.lock().unwrap()[2..],
            ["Project 0", "Project 1", "Project 2", "Project 3"]
        );
    }
}
