//! Builds the sync service from configuration

use std::sync::Arc;

use core_config::FromEnv;
use domain_product_embeddings::{
    EmbeddingProvider, EmbeddingSyncService, JsonFileCatalog, JsonFileVectorStore,
    LocalHashProvider, OpenAIConfig, OpenAIProvider, SyncDependencies, VectorStore,
};
use eyre::{Result, WrapErr};
use tracing::info;

use crate::config::{Config, ProviderKind};

pub async fn build_service(config: &Config) -> Result<EmbeddingSyncService> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::OpenAI => {
            let openai = OpenAIConfig::from_env()?;
            Arc::new(OpenAIProvider::new(openai)?)
        }
        ProviderKind::Local => Arc::new(LocalHashProvider::new(config.sync.expected_dimensions)),
    };

    let store = Arc::new(JsonFileVectorStore::new(&config.vector_store_path));
    store
        .initialize()
        .await
        .wrap_err_with(|| format!("Failed to load {}", config.vector_store_path.display()))?;

    info!(
        provider = %config.provider,
        model = %provider.model_name(),
        catalog = %config.catalog_path.display(),
        store = %config.vector_store_path.display(),
        "Embedding sync ready"
    );

    let deps = SyncDependencies {
        catalog: Arc::new(JsonFileCatalog::new(&config.catalog_path)),
        provider,
        store,
    };
    Ok(EmbeddingSyncService::new(deps, config.sync.clone()))
}
