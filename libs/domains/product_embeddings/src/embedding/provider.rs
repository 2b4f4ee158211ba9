use async_trait::async_trait;

use crate::error::{SyncError, SyncResult};

/// Text used by [`EmbeddingProvider::health_check`]
pub const HEALTH_CHECK_TEXT: &str = "connection test";

/// Trait for embedding generation providers
///
/// Implementations enforce their own request timeouts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded in embedding metadata
    fn model_name(&self) -> String;

    /// Generate the embedding for a single text
    async fn generate_embedding(&self, text: &str) -> SyncResult<Vec<f32>>;

    /// One round-trip to prove the provider is reachable.
    ///
    /// Returns the dimensionality of the test vector.
    async fn health_check(&self) -> SyncResult<usize> {
        let vector = self
            .generate_embedding(HEALTH_CHECK_TEXT)
            .await
            .map_err(|e| SyncError::Provider(format!("Embedding provider unreachable: {}", e)))?;
        validate_vector(&vector)?;
        Ok(vector.len())
    }
}

/// A usable vector is non-empty and every component is finite.
pub fn validate_vector(vector: &[f32]) -> SyncResult<()> {
    if vector.is_empty() {
        return Err(SyncError::InvalidEmbedding(
            "provider returned an empty vector".to_string(),
        ));
    }
    if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
        return Err(SyncError::InvalidEmbedding(format!(
            "non-finite value {} at index {}",
            vector[position], position
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_vector() {
        assert!(validate_vector(&[0.1, -0.2]).is_ok());
        assert!(matches!(
            validate_vector(&[]),
            Err(SyncError::InvalidEmbedding(_))
        ));
        assert!(matches!(
            validate_vector(&[0.1, f32::NAN]),
            Err(SyncError::InvalidEmbedding(msg)) if msg.contains("index 1")
        ));
        assert!(validate_vector(&[f32::INFINITY]).is_err());
    }
}
