use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::{EmbeddingInfo, EmbeddingRecord, Product, ScoredProduct};

/// Read access to the source-of-truth product catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Get a product by ID
    async fn find_by_id(&self, id: Uuid) -> SyncResult<Option<Product>>;

    /// List every product in the catalog
    async fn find_all(&self) -> SyncResult<Vec<Product>>;
}

/// Persistence for product embeddings
///
/// `store` must be safe under concurrent calls for distinct product ids and
/// must answer a duplicate with [`SyncError::AlreadyExists`] when overwriting
/// is not allowed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Prepare the backend (create collections, load snapshots)
    async fn initialize(&self) -> SyncResult<()>;

    async fn has_embedding(&self, product_id: Uuid) -> SyncResult<bool>;

    /// IDs of every product that currently has an embedding
    async fn existing_ids(&self) -> SyncResult<Vec<Uuid>>;

    async fn store(&self, record: EmbeddingRecord, allow_overwrite: bool) -> SyncResult<()>;

    /// Make writes since the last flush durable.
    ///
    /// Called after every batch that stored something. Backends that write
    /// through keep the default. A failed flush discards the unflushed writes.
    async fn flush(&self) -> SyncResult<()> {
        Ok(())
    }

    /// Introspect a stored embedding.
    ///
    /// Optional capability; backends that cannot answer keep the default.
    async fn info(&self, _product_id: Uuid) -> SyncResult<EmbeddingInfo> {
        Err(SyncError::Unsupported("embedding info"))
    }

    /// Remove the embedding of a product. Returns whether one existed.
    async fn delete(&self, product_id: Uuid) -> SyncResult<bool>;

    /// Nearest stored products to `vector`, best first
    async fn search(&self, vector: Vec<f32>, limit: usize) -> SyncResult<Vec<ScoredProduct>>;
}
