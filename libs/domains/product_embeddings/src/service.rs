use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::batch::{BatchProcessor, RunControl};
use crate::config::SyncConfig;
use crate::embedder::{EmbedResult, EmbedStatus, ProductEmbedder};
use crate::embedding::{EmbeddingProvider, validate_vector};
use crate::error::{SyncError, SyncResult};
use crate::metrics::SyncMetrics;
use crate::models::{
    BatchReport, EmbeddingStats, ProcessingOptions, Product, ScoredProduct, ValidationReport,
};
use crate::planner::SyncPlanner;
use crate::recreation::RecreationController;
use crate::repository::{ProductCatalog, VectorStore};
use crate::validator::EmbeddingValidator;

/// Collaborators shared by every component of the engine
#[derive(Clone)]
pub struct SyncDependencies {
    pub catalog: Arc<dyn ProductCatalog>,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
}

/// Entry point for keeping the vector store in step with the catalog
pub struct EmbeddingSyncService {
    deps: SyncDependencies,
    embedder: Arc<ProductEmbedder>,
    processor: BatchProcessor,
    planner: SyncPlanner,
    validator: EmbeddingValidator,
    recreation: RecreationController,
    config: SyncConfig,
}

impl EmbeddingSyncService {
    pub fn new(deps: SyncDependencies, config: SyncConfig) -> Self {
        let embedder = Arc::new(ProductEmbedder::new(
            deps.provider.clone(),
            deps.store.clone(),
            config.backoff(),
            config.embedding_version.clone(),
        ));

        Self {
            processor: BatchProcessor::new(embedder.clone()),
            planner: SyncPlanner::new(deps.store.clone()),
            validator: EmbeddingValidator::new(deps.store.clone(), config.expected_dimensions),
            recreation: RecreationController::new(deps.clone(), config.clone()),
            embedder,
            deps,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn recreation(&self) -> &RecreationController {
        &self.recreation
    }

    /// Embed every targeted product that does not have an embedding yet.
    ///
    /// Products the planner excludes are counted as skipped, so a repeated
    /// run reports `successful = 0` and `skipped = N`.
    #[instrument(skip_all, fields(batch_size = options.batch_size))]
    pub async fn initialize(
        &self,
        options: &ProcessingOptions,
        control: &RunControl,
    ) -> SyncResult<BatchReport> {
        options.validate_all()?;
        self.deps.store.initialize().await?;

        let products = match &options.target_product_ids {
            Some(ids) => self.find_targets(ids).await?,
            None => self.deps.catalog.find_all().await?,
        };

        let plan = self
            .planner
            .plan(products, options.skip_existing, options.force_regenerate)
            .await;

        let mut report = self
            .processor
            .process(&plan.to_process, options, control, &SyncMetrics::new("initialize"))
            .await?;
        report.include_already_embedded(plan.already_embedded.len());

        info!(
            total = report.total,
            successful = report.successful,
            skipped = report.skipped,
            failed = report.failed,
            "Embedding initialization finished"
        );
        Ok(report)
    }

    async fn find_targets(&self, ids: &[Uuid]) -> SyncResult<Vec<Product>> {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let products: Vec<Product> = self
            .deps
            .catalog
            .find_all()
            .await?
            .into_iter()
            .filter(|p| wanted.contains(&p.id))
            .collect();

        if products.is_empty() {
            return Err(SyncError::NotFound(
                "None of the targeted products exist".to_string(),
            ));
        }
        if products.len() < ids.len() {
            warn!(
                requested = ids.len(),
                found = products.len(),
                "Some targeted products are not in the catalog"
            );
        }
        Ok(products)
    }

    /// Embed a single product by id
    #[instrument(skip(self))]
    pub async fn embed_product(
        &self,
        product_id: Uuid,
        allow_overwrite: bool,
    ) -> SyncResult<EmbedResult> {
        let product = self
            .deps
            .catalog
            .find_by_id(product_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Product {}", product_id)))?;

        let mut result = self
            .embedder
            .embed(&product, allow_overwrite, self.config.standard.max_retries)
            .await;
        if result.is_embedded() {
            if let Err(error) = self.embedder.flush().await {
                warn!(error = %error, "Failed to persist embedding");
                result.status = EmbedStatus::Failed(error);
            }
        }

        let metrics = SyncMetrics::new("embed_product");
        match &result.status {
            EmbedStatus::Embedded { .. } => metrics.item_embedded(result.attempts),
            EmbedStatus::Skipped => metrics.item_skipped(),
            EmbedStatus::Failed(e) => metrics.item_failed(e.kind()),
        }
        Ok(result)
    }

    /// Remove a product's embedding. Returns whether one existed.
    #[instrument(skip(self))]
    pub async fn delete_embedding(&self, product_id: Uuid) -> SyncResult<bool> {
        let deleted = self.deps.store.delete(product_id).await?;
        if deleted {
            self.deps.store.flush().await?;
        }
        info!(%product_id, deleted, "Embedding delete requested");
        Ok(deleted)
    }

    pub async fn validate(&self) -> ValidationReport {
        match self.deps.catalog.find_all().await {
            Ok(products) => self.validator.validate(&products).await,
            Err(e) => ValidationReport::failed(format!("Validation failed: {}", e)),
        }
    }

    pub async fn stats(&self) -> SyncResult<EmbeddingStats> {
        let products = self.deps.catalog.find_all().await?;
        let existing: HashSet<Uuid> = self.deps.store.existing_ids().await?.into_iter().collect();

        let total_products = products.len();
        let embedded = products.iter().filter(|p| existing.contains(&p.id)).count();
        let coverage_percent = if total_products == 0 {
            0.0
        } else {
            (embedded as f64 / total_products as f64 * 10_000.0).round() / 100.0
        };

        SyncMetrics::new("stats").coverage(coverage_percent);
        Ok(EmbeddingStats {
            total_products,
            embedded,
            missing: total_products - embedded,
            coverage_percent,
        })
    }

    /// Products whose embeddings are closest to the embedding of `query`
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: usize) -> SyncResult<Vec<ScoredProduct>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SyncError::Validation("Search query is empty".to_string()));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let vector = self.deps.provider.generate_embedding(query).await?;
        validate_vector(&vector)?;
        self.deps.store.search(vector, limit).await
    }
}
