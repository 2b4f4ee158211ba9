mod local;
mod openai;
mod provider;

pub use local::LocalHashProvider;
pub use openai::{OpenAIConfig, OpenAIProvider};
pub use provider::{EmbeddingProvider, validate_vector};

#[cfg(test)]
pub use provider::MockEmbeddingProvider;
