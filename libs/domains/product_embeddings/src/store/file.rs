use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::InMemoryVectorStore;
use crate::error::SyncResult;
use crate::models::{EmbeddingInfo, EmbeddingRecord, ScoredProduct};
use crate::repository::VectorStore;

/// In-memory store persisted as a JSON snapshot on [`VectorStore::flush`]
///
/// Writes land in memory and are remembered until the next flush. A flush
/// writes the snapshot to a sibling temp file and renames it into place; if
/// that fails, every write since the previous flush is rolled back so memory
/// never holds records the file does not.
pub struct JsonFileVectorStore {
    path: PathBuf,
    inner: InMemoryVectorStore,
    /// State of each product touched since the last flush, before the first touch
    unflushed: Mutex<HashMap<Uuid, Option<EmbeddingRecord>>>,
}

impl JsonFileVectorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: InMemoryVectorStore::new(),
            unflushed: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, product_id: Uuid) -> Option<EmbeddingRecord> {
        self.inner.get(product_id).await
    }

    async fn write_snapshot(&self) -> SyncResult<usize> {
        let records = self.inner.snapshot().await;
        let json = serde_json::to_vec(&records)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(records.len())
    }
}

#[async_trait]
impl VectorStore for JsonFileVectorStore {
    async fn initialize(&self) -> SyncResult<()> {
        let records: Vec<EmbeddingRecord> = match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %self.path.display(), records = records.len(), "Loaded vector store snapshot");
        let mut unflushed = self.unflushed.lock().await;
        unflushed.clear();
        self.inner.load(records).await;
        Ok(())
    }

    async fn has_embedding(&self, product_id: Uuid) -> SyncResult<bool> {
        self.inner.has_embedding(product_id).await
    }

    async fn existing_ids(&self) -> SyncResult<Vec<Uuid>> {
        self.inner.existing_ids().await
    }

    async fn store(&self, record: EmbeddingRecord, allow_overwrite: bool) -> SyncResult<()> {
        let product_id = record.product_id;
        let mut unflushed = self.unflushed.lock().await;
        let previous = self.inner.put(record, allow_overwrite).await?;
        unflushed.entry(product_id).or_insert(previous);
        Ok(())
    }

    async fn flush(&self) -> SyncResult<()> {
        let mut unflushed = self.unflushed.lock().await;
        if unflushed.is_empty() {
            return Ok(());
        }

        match self.write_snapshot().await {
            Ok(records) => {
                debug!(
                    path = %self.path.display(),
                    records,
                    changed = unflushed.len(),
                    "Persisted vector store snapshot"
                );
                unflushed.clear();
                Ok(())
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    discarded = unflushed.len(),
                    "Snapshot write failed, rolling back unflushed writes"
                );
                for (product_id, previous) in unflushed.drain() {
                    self.inner.restore(product_id, previous).await;
                }
                Err(e)
            }
        }
    }

    async fn info(&self, product_id: Uuid) -> SyncResult<EmbeddingInfo> {
        self.inner.info(product_id).await
    }

    async fn delete(&self, product_id: Uuid) -> SyncResult<bool> {
        let mut unflushed = self.unflushed.lock().await;
        match self.inner.remove(product_id).await {
            Some(previous) => {
                unflushed.entry(product_id).or_insert(Some(previous));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn search(&self, vector: Vec<f32>, limit: usize) -> SyncResult<Vec<ScoredProduct>> {
        self.inner.search(vector, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::models::Product;

    fn record_for(product: &Product, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord::new(product, vector, "test-model", "v1")
    }

    async fn reopen(path: &Path) -> JsonFileVectorStore {
        let store = JsonFileVectorStore::new(path);
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        let product = Product::new("Blender");

        let store = reopen(&path).await;
        store
            .store(record_for(&product, vec![0.25; 4]), false)
            .await
            .unwrap();
        store.flush().await.unwrap();

        let reopened = reopen(&path).await;
        assert!(reopened.has_embedding(product.id).await.unwrap());
        assert_eq!(reopened.get(product.id).await.unwrap().vector, vec![0.25; 4]);

        assert!(reopened.delete(product.id).await.unwrap());
        reopened.flush().await.unwrap();
        let again = reopen(&path).await;
        assert!(again.existing_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_writes_reach_disk_only_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        let store = reopen(&path).await;

        for name in ["Fan", "Heater", "Lamp"] {
            store
                .store(record_for(&Product::new(name), vec![0.5; 4]), false)
                .await
                .unwrap();
        }
        assert!(!path.exists());

        store.flush().await.unwrap();
        assert_eq!(reopen(&path).await.existing_ids().await.unwrap().len(), 3);

        // Compact output, one line
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains('\n'));
    }

    #[tokio::test]
    async fn test_failed_flush_rolls_back_writes() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the snapshot file should be makes the rename fail
        let path = dir.path().join("vectors.json");
        std::fs::create_dir(&path).unwrap();

        let store = JsonFileVectorStore::new(&path);
        let kept = Product::new("Kept");
        let fresh = Product::new("Fresh");
        store.inner.load(vec![record_for(&kept, vec![0.1; 4])]).await;

        store
            .store(record_for(&kept, vec![0.9; 4]), true)
            .await
            .unwrap();
        store
            .store(record_for(&fresh, vec![0.9; 4]), false)
            .await
            .unwrap();

        let result = store.flush().await;

        assert!(matches!(result, Err(SyncError::Store(_))));
        assert!(!store.has_embedding(fresh.id).await.unwrap());
        assert_eq!(store.get(kept.id).await.unwrap().vector, vec![0.1; 4]);

        // Nothing left to roll back a second time, and a retry may store again
        store
            .store(record_for(&fresh, vec![0.9; 4]), false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_flush_without_changes_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        let store = reopen(&path).await;

        store.flush().await.unwrap();
        assert!(!store.delete(Uuid::new_v4()).await.unwrap());
        store.flush().await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = reopen(&dir.path().join("absent.json")).await;
        assert!(store.existing_ids().await.unwrap().is_empty());
    }
}
