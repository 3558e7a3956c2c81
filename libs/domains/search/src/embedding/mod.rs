mod openai;
mod provider;
mod vertexai;

pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::{EmbeddingProvider, classify_status, ensure_non_empty};
pub use vertexai::{VertexAIConfig, VertexAIProvider};

#[cfg(test)]
pub use provider::MockEmbeddingProvider;
