//! Deterministic offline embeddings
//!
//! Feature hashing over lowercase words and word bigrams, L2-normalized.
//! Similar texts share features and land close together, which is enough for
//! demos, local development and tests that must not reach the network.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;
use crate::config::MIN_EMBEDDING_DIMENSIONS;
use crate::error::{SyncError, SyncResult};

pub struct LocalHashProvider {
    dimensions: usize,
}

impl LocalHashProvider {
    /// `dimensions` below [`MIN_EMBEDDING_DIMENSIONS`] are refused at embedding time
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0_f32; self.dimensions];

        for feature in features(text) {
            let digest = Sha256::digest(feature.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let hash = u64::from_le_bytes(bytes);

            let index = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            let weight = 1.0 + ((hash >> 48) & 0xFF) as f32 / 255.0;
            vector[index] += sign * weight;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn features(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    let mut features = Vec::with_capacity(words.len() * 2);
    for (i, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(i + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

#[async_trait]
impl EmbeddingProvider for LocalHashProvider {
    fn model_name(&self) -> String {
        format!("local-hash-{}", self.dimensions)
    }

    async fn generate_embedding(&self, text: &str) -> SyncResult<Vec<f32>> {
        if self.dimensions < MIN_EMBEDDING_DIMENSIONS {
            return Err(SyncError::Config(format!(
                "local embeddings need at least {} dimensions, got {}",
                MIN_EMBEDDING_DIMENSIONS, self.dimensions
            )));
        }
        if features(text).is_empty() {
            return Err(SyncError::Validation(
                "text has no embeddable words".to_string(),
            ));
        }
        Ok(self.embed(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cosine_similarity;

    #[tokio::test]
    async fn test_deterministic_and_normalized() {
        let provider = LocalHashProvider::new(64);
        let a = provider.generate_embedding("wireless noise cancelling headphones").await.unwrap();
        let b = provider.generate_embedding("wireless noise cancelling headphones").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_related_texts_score_higher() {
        let provider = LocalHashProvider::new(256);
        let query = provider.generate_embedding("wireless headphones").await.unwrap();
        let related = provider
            .generate_embedding("wireless headphones with long battery")
            .await
            .unwrap();
        let unrelated = provider.generate_embedding("cast iron skillet").await.unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_rejects_text_without_words() {
        let provider = LocalHashProvider::new(16);
        assert!(provider.generate_embedding("  !!  ").await.is_err());
        assert_eq!(provider.health_check().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_too_few_dimensions_is_a_config_error() {
        let provider = LocalHashProvider::new(2);
        assert_eq!(provider.dimensions(), 2);
        let result = provider.generate_embedding("red kettle").await;
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
