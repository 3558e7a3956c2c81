mod filter;
mod memory;
mod mongo;
mod repository;

pub use filter::{Filter, FilterValue};
pub use memory::InMemoryDocumentStore;
pub use mongo::{MongoDocumentStore, connect};
pub use repository::DocumentStore;

#[cfg(test)]
pub use repository::MockDocumentStore;
