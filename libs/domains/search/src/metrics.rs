//! Metrics for indexing and search
//!
//! Recorded through the `metrics` facade; without an installed recorder every
//! call is a no-op.

use metrics::{counter, histogram};
use std::time::Duration;

use crate::models::JobStatus;

/// Per-document outcome inside a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOutcome {
    Indexed,
    Skipped,
    Failed,
}

impl DocumentOutcome {
    fn as_str(self) -> &'static str {
        match self {
            DocumentOutcome::Indexed => "indexed",
            DocumentOutcome::Skipped => "skipped",
            DocumentOutcome::Failed => "failed",
        }
    }
}

/// Indexing metrics helper, labelled by collection
#[derive(Clone)]
pub struct IndexingMetrics {
    collection: String,
}

impl IndexingMetrics {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }

    pub fn document(&self, outcome: DocumentOutcome) {
        counter!(
            "search_indexing_documents_total",
            "collection" => self.collection.clone(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }

    /// Record the end of one run (a resumed job counts as a new run)
    pub fn run_finished(&self, status: JobStatus, duration: Duration) {
        counter!(
            "search_indexing_runs_total",
            "collection" => self.collection.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            "search_indexing_run_duration_seconds",
            "collection" => self.collection.clone()
        )
        .record(duration.as_secs_f64());
    }
}

/// Record one collection scanned by a query
pub fn search_executed(collection: &str, kind: &'static str, hits: usize) {
    counter!(
        "search_queries_total",
        "collection" => collection.to_string(),
        "kind" => kind
    )
    .increment(1);

    histogram!("search_hits", "collection" => collection.to_string()).record(hits as f64);
}

/// Record a collection dropped from a multi-collection search
pub fn search_collection_failed(collection: &str) {
    counter!(
        "search_collection_failures_total",
        "collection" => collection.to_string()
    )
    .increment(1);
}
