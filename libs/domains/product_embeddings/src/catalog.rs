//! Product catalog adapters

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::Product;
use crate::repository::ProductCatalog;

/// Fixed list of products, kept in insertion order
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Vec<Product>,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn find_by_id(&self, id: Uuid) -> SyncResult<Option<Product>> {
        Ok(self.products.iter().find(|p| p.id == id).cloned())
    }

    async fn find_all(&self) -> SyncResult<Vec<Product>> {
        Ok(self.products.clone())
    }
}

/// Catalog read from a JSON array of products on every call
///
/// Re-reading keeps long-running processes in step with edits to the file.
#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> SyncResult<Vec<Product>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            SyncError::Catalog(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let products: Vec<Product> = serde_json::from_slice(&bytes).map_err(|e| {
            SyncError::Catalog(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), products = products.len(), "Loaded catalog");
        Ok(products)
    }
}

#[async_trait]
impl ProductCatalog for JsonFileCatalog {
    async fn find_by_id(&self, id: Uuid) -> SyncResult<Option<Product>> {
        Ok(self.load().await?.into_iter().find(|p| p.id == id))
    }

    async fn find_all(&self) -> SyncResult<Vec<Product>> {
        self.load().await
    }
}
