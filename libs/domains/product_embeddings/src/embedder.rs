//! Single-product embedding with retries

use std::sync::Arc;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::embedding::{EmbeddingProvider, validate_vector};
use crate::error::{SyncError, SyncResult};
use crate::models::{EmbeddingRecord, Product};
use crate::repository::VectorStore;
use crate::retry::{BackoffPolicy, retry_with_backoff};

/// What happened to one product
#[derive(Debug)]
pub enum EmbedStatus {
    Embedded { dimensions: usize },
    /// An embedding already existed and overwriting was not allowed
    Skipped,
    Failed(SyncError),
}

#[derive(Debug)]
pub struct EmbedResult {
    pub product_id: Uuid,
    pub product_name: String,
    pub status: EmbedStatus,
    /// Provider round-trips made; 0 when the product was skipped or rejected up front
    pub attempts: u32,
}

impl EmbedResult {
    fn new(product: &Product, status: EmbedStatus, attempts: u32) -> Self {
        Self {
            product_id: product.id,
            product_name: product.name.clone(),
            status,
            attempts,
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.status, EmbedStatus::Embedded { .. })
    }
}

/// Generates and stores the embedding of a single product
pub struct ProductEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    backoff: BackoffPolicy,
    version: String,
}

impl ProductEmbedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        backoff: BackoffPolicy,
        version: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            backoff,
            version: version.into(),
        }
    }

    /// Embed one product. Never returns an error: failures end up in
    /// [`EmbedStatus::Failed`] so a batch can carry on.
    ///
    /// `allow_overwrite` comes from the run's options and is the only thing
    /// that decides whether a stored record may be replaced.
    /// `max_attempts` counts the first attempt.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn embed(
        &self,
        product: &Product,
        allow_overwrite: bool,
        max_attempts: u32,
    ) -> EmbedResult {
        if !allow_overwrite {
            match self.store.has_embedding(product.id).await {
                Ok(true) => {
                    debug!("Embedding exists, skipping");
                    return EmbedResult::new(product, EmbedStatus::Skipped, 0);
                }
                Ok(false) => {}
                // The store still rejects duplicates on write
                Err(e) => warn!(error = %e, "Existence check failed, continuing"),
            }
        }

        let text = product.embeddable_text();
        if text.is_empty() {
            let error = SyncError::Validation(format!(
                "Product '{}' has no text to embed",
                product.name
            ));
            return EmbedResult::new(product, EmbedStatus::Failed(error), 0);
        }

        let policy = self.backoff.clone().with_max_attempts(max_attempts);
        let outcome = retry_with_backoff(
            |_| self.attempt(product, &text, allow_overwrite),
            &policy,
            SyncError::is_retryable,
        )
        .await;

        let status = match outcome.result {
            Ok(status) => status,
            Err(error) => {
                warn!(
                    attempts = outcome.attempts,
                    kind = error.kind(),
                    error = %error,
                    "Failed to embed product"
                );
                EmbedStatus::Failed(error)
            }
        };
        EmbedResult::new(product, status, outcome.attempts)
    }

    /// Persist what this embedder stored since the last flush
    pub async fn flush(&self) -> SyncResult<()> {
        self.store.flush().await
    }

    async fn attempt(
        &self,
        product: &Product,
        text: &str,
        allow_overwrite: bool,
    ) -> SyncResult<EmbedStatus> {
        let vector = self.provider.generate_embedding(text).await?;
        validate_vector(&vector)?;

        let dimensions = vector.len();
        let record =
            EmbeddingRecord::new(product, vector, &self.provider.model_name(), &self.version);

        match self.store.store(record, allow_overwrite).await {
            Ok(()) => {
                debug!(dimensions, "Stored embedding");
                Ok(EmbedStatus::Embedded { dimensions })
            }
            // Another writer got there first
            Err(SyncError::AlreadyExists(_)) if !allow_overwrite => Ok(EmbedStatus::Skipped),
            Err(e) => Err(e),
        }
    }
}
