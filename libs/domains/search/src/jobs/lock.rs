//! Store-backed run lease, one per `(collection, organization)`.
//!
//! The lease record lives in [`LOCKS_COLLECTION`] under `{collection}_{organizationId}`
//! and is created with an insert-if-absent write, so every process sharing the
//! store sees the same holder. A holder that dies leaves a record that expires;
//! the next claimant removes it only if it is still exactly the expired record.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{SemanticError, SemanticResult};
use crate::models::{BatchIndexOptions, LOCKS_COLLECTION};
use crate::store::{DocumentStore, Filter};

/// Shortest lease a run holds between two renewals
pub const MIN_LEASE: Duration = Duration::from_secs(600);

static NEXT_OWNER: AtomicU64 = AtomicU64::new(0);

/// Lease length for a run: it must outlive the pause between two chunks
pub fn lease_ttl(options: &BatchIndexOptions) -> Duration {
    MIN_LEASE.max(options.chunk_delay() * 2)
}

fn expiry(ttl: Duration) -> DateTime<Utc> {
    Utc::now() + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::days(1))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaseRecord {
    owner: String,
    job_id: String,
    collection: String,
    organization_id: String,
    expires_at: DateTime<Utc>,
}

/// A held lease. Renew it before it expires and release it when the run stops.
#[derive(Debug, Clone)]
pub struct Lease {
    lock_id: String,
    owner: String,
    ttl: Duration,
}

impl Lease {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

pub struct RunLocks<S: DocumentStore> {
    store: Arc<S>,
}

impl<S: DocumentStore> Clone for RunLocks<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DocumentStore> RunLocks<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn lock_id(collection: &str, organization_id: &str) -> String {
        format!("{}_{}", collection, organization_id)
    }

    /// Take the lease for `(collection, organization_id)` on behalf of `job_id`.
    ///
    /// `FailedPrecondition` while another run holds an unexpired lease.
    pub async fn acquire(
        &self,
        collection: &str,
        organization_id: &str,
        job_id: &str,
        ttl: Duration,
    ) -> SemanticResult<Lease> {
        let lock_id = Self::lock_id(collection, organization_id);
        let owner = format!(
            "{}#{}-{}",
            job_id,
            Utc::now().timestamp_micros(),
            NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
        );
        let record = LeaseRecord {
            owner: owner.clone(),
            job_id: job_id.to_string(),
            collection: collection.to_string(),
            organization_id: organization_id.to_string(),
            expires_at: expiry(ttl),
        };
        let data = serde_json::to_value(&record)?;

        for _ in 0..2 {
            if self.store.create(LOCKS_COLLECTION, &lock_id, data.clone()).await? {
                tracing::debug!(lock_id = %lock_id, owner = %owner, "Run lease acquired");
                return Ok(Lease { lock_id, owner, ttl });
            }

            let Some(stored) = self.store.get(LOCKS_COLLECTION, &lock_id).await? else {
                continue;
            };
            let raw_expiry = stored.data["expiresAt"].as_str().unwrap_or_default().to_string();
            let holder: LeaseRecord = serde_json::from_value(stored.data).map_err(|e| {
                SemanticError::Internal(format!("corrupt lease record {}: {}", lock_id, e))
            })?;
            if holder.expires_at > Utc::now() {
                return Err(SemanticError::FailedPrecondition(format!(
                    "job {} is already indexing {} for this organization",
                    holder.job_id, collection
                )));
            }

            tracing::warn!(
                lock_id = %lock_id,
                stale_job_id = %holder.job_id,
                expired_at = %holder.expires_at,
                "Taking over expired run lease"
            );
            let exact = [
                Filter::eq("owner", holder.owner.as_str()),
                Filter::eq("expiresAt", raw_expiry.as_str()),
            ];
            self.store.remove(LOCKS_COLLECTION, &lock_id, &exact).await?;
        }

        Err(SemanticError::FailedPrecondition(format!(
            "another run claimed {} for this organization",
            collection
        )))
    }

    /// Push the expiry forward. `false` means the lease was taken over.
    pub async fn renew(&self, lease: &Lease) -> SemanticResult<bool> {
        let mut patch = Map::new();
        patch.insert("expiresAt".to_string(), serde_json::to_value(expiry(lease.ttl))?);
        self.store
            .merge_if(
                LOCKS_COLLECTION,
                &lease.lock_id,
                &[Filter::eq("owner", lease.owner.as_str())],
                patch,
            )
            .await
    }

    /// Drop the lease if this holder still owns it
    pub async fn release(&self, lease: &Lease) -> SemanticResult<bool> {
        self.store
            .remove(
                LOCKS_COLLECTION,
                &lease.lock_id,
                &[Filter::eq("owner", lease.owner.as_str())],
            )
            .await
    }
}
