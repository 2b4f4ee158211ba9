use std::time::Duration;

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse, env_required};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EmbeddingProvider;
use crate::error::{SyncError, SyncResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// OpenAI embedding provider configuration
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Requested output size; `None` keeps the model's native dimensionality
    pub dimensions: Option<u32>,
    pub timeout_secs: u64,
}

impl OpenAIConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimensions: None,
            timeout_secs: 30,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_dimensions(mut self, dimensions: u32) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

impl FromEnv for OpenAIConfig {
    /// Requires OPENAI_API_KEY; OPENAI_BASE_URL, OPENAI_EMBEDDING_MODEL,
    /// OPENAI_EMBEDDING_DIMENSIONS and OPENAI_TIMEOUT_SECS are optional.
    fn from_env() -> Result<Self, ConfigError> {
        let dimensions = match std::env::var("OPENAI_EMBEDDING_DIMENSIONS") {
            Ok(_) => Some(env_parse("OPENAI_EMBEDDING_DIMENSIONS", 0u32)?),
            Err(_) => None,
        };

        Ok(Self {
            api_key: env_required("OPENAI_API_KEY")?,
            base_url: env_or_default("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            model: env_or_default("OPENAI_EMBEDDING_MODEL", DEFAULT_MODEL),
            dimensions,
            timeout_secs: env_parse("OPENAI_TIMEOUT_SECS", 30u64)?,
        })
    }
}

/// OpenAI embeddings provider
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> SyncResult<Self> {
        Self::new(OpenAIConfig::from_env()?)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn status_error(status: StatusCode, body: &str) -> SyncError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            SyncError::Provider(format!("OpenAI rate limit exceeded: {}", body))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SyncError::Provider(format!("OpenAI rejected credentials ({}): {}", status, body))
        }
        _ => SyncError::Provider(format!("OpenAI API error ({}): {}", status, body)),
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> String {
        self.config.model.clone()
    }

    async fn generate_embedding(&self, text: &str) -> SyncResult<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: text,
            dimensions: self.config.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_text));
        }

        let body: EmbeddingResponse = response.json().await?;
        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| SyncError::InvalidEmbedding("No embedding returned".to_string()))?;

        debug!(model = %self.config.model, dimensions = embedding.len(), "Generated embedding");
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [
                ("OPENAI_API_KEY", Some("sk-test")),
                ("OPENAI_BASE_URL", None),
                ("OPENAI_EMBEDDING_MODEL", Some("text-embedding-3-large")),
                ("OPENAI_EMBEDDING_DIMENSIONS", Some("256")),
                ("OPENAI_TIMEOUT_SECS", None),
            ],
            || {
                let config = OpenAIConfig::from_env().unwrap();
                assert_eq!(config.api_key, "sk-test");
                assert_eq!(config.base_url, DEFAULT_BASE_URL);
                assert_eq!(config.model, "text-embedding-3-large");
                assert_eq!(config.dimensions, Some(256));
                assert_eq!(config.timeout_secs, 30);
            },
        );
    }

    #[test]
    fn test_config_requires_api_key() {
        temp_env::with_var_unset("OPENAI_API_KEY", || {
            let err = OpenAIConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("OPENAI_API_KEY"));
        });
    }

    #[test]
    fn test_status_errors_are_retryable_provider_errors() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("rate limit"));

        let err = status_error(StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, SyncError::Provider(_)));
    }

    #[test]
    fn test_request_omits_unset_dimensions() {
        let request = EmbeddingRequest {
            model: DEFAULT_MODEL,
            input: "hello",
            dimensions: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("dimensions").is_none());
        assert_eq!(json["model"], DEFAULT_MODEL);
    }
}
