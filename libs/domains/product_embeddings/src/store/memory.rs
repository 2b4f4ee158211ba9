use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::{EmbeddingInfo, EmbeddingRecord, ScoredProduct};
use crate::repository::VectorStore;

/// Vector store backed by a map keyed on product id
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<Uuid, EmbeddingRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<EmbeddingRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.product_id, r)).collect();
        Self {
            records: RwLock::new(map),
        }
    }

    /// Current record of a product
    pub async fn get(&self, product_id: Uuid) -> Option<EmbeddingRecord> {
        self.records.read().await.get(&product_id).cloned()
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// All records ordered by product id
    pub async fn snapshot(&self) -> Vec<EmbeddingRecord> {
        let mut records: Vec<EmbeddingRecord> =
            self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.product_id);
        records
    }

    /// Replace the contents with `records`
    pub async fn load(&self, records: Vec<EmbeddingRecord>) {
        let mut map = self.records.write().await;
        map.clear();
        map.extend(records.into_iter().map(|r| (r.product_id, r)));
    }

    /// Insert `record` and hand back the one it replaced
    pub(crate) async fn put(
        &self,
        record: EmbeddingRecord,
        allow_overwrite: bool,
    ) -> SyncResult<Option<EmbeddingRecord>> {
        if record.vector.is_empty() {
            return Err(SyncError::InvalidEmbedding(
                "refusing to store an empty vector".to_string(),
            ));
        }

        // Check and insert under one write lock so concurrent writers for the
        // same product resolve deterministically.
        let mut records = self.records.write().await;
        if !allow_overwrite && records.contains_key(&record.product_id) {
            return Err(SyncError::AlreadyExists(record.product_id));
        }
        Ok(records.insert(record.product_id, record))
    }

    pub(crate) async fn remove(&self, product_id: Uuid) -> Option<EmbeddingRecord> {
        self.records.write().await.remove(&product_id)
    }

    /// Put a product back to an earlier state; `None` means no record
    pub(crate) async fn restore(&self, product_id: Uuid, previous: Option<EmbeddingRecord>) {
        let mut records = self.records.write().await;
        match previous {
            Some(record) => {
                records.insert(product_id, record);
            }
            None => {
                records.remove(&product_id);
            }
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn initialize(&self) -> SyncResult<()> {
        Ok(())
    }

    async fn has_embedding(&self, product_id: Uuid) -> SyncResult<bool> {
        Ok(self.records.read().await.contains_key(&product_id))
    }

    async fn existing_ids(&self) -> SyncResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.records.read().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn store(&self, record: EmbeddingRecord, allow_overwrite: bool) -> SyncResult<()> {
        self.put(record, allow_overwrite).await.map(|_| ())
    }

    async fn info(&self, product_id: Uuid) -> SyncResult<EmbeddingInfo> {
        Ok(match self.records.read().await.get(&product_id) {
            Some(record) => EmbeddingInfo {
                exists: true,
                dimensions: Some(record.vector.len()),
                created_at: Some(record.metadata.generated_at),
            },
            None => EmbeddingInfo::missing(),
        })
    }

    async fn delete(&self, product_id: Uuid) -> SyncResult<bool> {
        Ok(self.remove(product_id).await.is_some())
    }

    async fn search(&self, vector: Vec<f32>, limit: usize) -> SyncResult<Vec<ScoredProduct>> {
        let records = self.records.read().await;
        let mut hits: Vec<ScoredProduct> = records
            .values()
            .filter(|r| r.vector.len() == vector.len())
            .map(|r| ScoredProduct {
                product_id: r.product_id,
                score: cosine_similarity(&vector, &r.vector),
                metadata: r.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Cosine similarity, 0.0 for mismatched or zero-length vectors
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let (dot, left_norm, right_norm) = left.iter().zip(right.iter()).fold(
        (0.0_f64, 0.0_f64, 0.0_f64),
        |(dot, ln, rn), (l, r)| {
            let (l, r) = (f64::from(*l), f64::from(*r));
            (dot + l * r, ln + l * l, rn + r * r)
        },
    );

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }

    (dot / (left_norm.sqrt() * right_norm.sqrt())) as f32
}
