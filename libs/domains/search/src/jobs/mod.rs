mod lock;
mod manager;
mod store;

pub use lock::{Lease, RunLocks, lease_ttl};
pub use manager::IndexingJobManager;
pub use store::JobStore;
