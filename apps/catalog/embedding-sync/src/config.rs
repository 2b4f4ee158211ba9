//! Configuration for the embedding sync CLI

use std::path::PathBuf;

use core_config::{ConfigError, Environment, FromEnv, env_or_default};
use domain_product_embeddings::SyncConfig;
use strum::{Display, EnumString};

/// Which embedding backend to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    OpenAI,
    /// Offline feature hashing, no API key needed
    Local,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    /// JSON array of products
    pub catalog_path: PathBuf,
    /// JSON snapshot of stored embeddings
    pub vector_store_path: PathBuf,
    pub provider: ProviderKind,
    pub sync: SyncConfig,
}

impl FromEnv for Config {
    /// Reads CATALOG_PATH (default `data/catalog.json`), VECTOR_STORE_PATH
    /// (default `data/embeddings.json`), EMBEDDING_PROVIDER (`openai` or
    /// `local`, default `openai`) and everything [`SyncConfig`] reads.
    /// OpenAI credentials are loaded only when that provider is used.
    fn from_env() -> Result<Self, ConfigError> {
        let provider_raw = env_or_default("EMBEDDING_PROVIDER", "openai");
        let provider = provider_raw
            .parse::<ProviderKind>()
            .map_err(|_| ConfigError::ParseError {
                key: "EMBEDDING_PROVIDER".to_string(),
                details: format!("'{}' is not one of openai, local", provider_raw),
            })?;

        Ok(Self {
            environment: Environment::from_env(),
            catalog_path: env_or_default("CATALOG_PATH", "data/catalog.json").into(),
            vector_store_path: env_or_default("VECTOR_STORE_PATH", "data/embeddings.json").into(),
            provider,
            sync: SyncConfig::from_env()?,
        })
    }
}
