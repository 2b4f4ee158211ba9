//! Forced regeneration of embeddings with before/after validation
//!
//! A run moves through [`RecreationPhase`]s:
//!
//! ```text
//! Idle -> ConnectivityCheck -> Planning -> (ValidatingBefore)? -> Processing
//!      -> (ValidatingAfter)? -> Reported
//! ```
//!
//! Any precondition failure before `Processing` ends the run in `Aborted`
//! without touching the store. Once processing starts the run always reports;
//! individual products may still fail inside the report.

use std::collections::HashSet;
use std::sync::Arc;

use strum::Display;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::{BatchProcessor, RunControl};
use crate::config::SyncConfig;
use crate::embedder::ProductEmbedder;
use crate::embedding::EmbeddingProvider;
use crate::error::{SyncError, SyncResult};
use crate::metrics::SyncMetrics;
use crate::models::{
    MIN_FULL_RECREATION_REASON_LEN, Pacing, ProcessingOptions, Product, RecreateOptions,
    RecreationInfo, RecreationResult, ValidationReport,
};
use crate::planner::SyncPlanner;
use crate::repository::{ProductCatalog, VectorStore};
use crate::service::SyncDependencies;
use crate::validator::EmbeddingValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RecreationPhase {
    Idle,
    ConnectivityCheck,
    Planning,
    ValidatingBefore,
    Processing,
    ValidatingAfter,
    Reported,
    Aborted,
}

struct PhaseTracker {
    run_id: Uuid,
    phase: RecreationPhase,
}

impl PhaseTracker {
    fn start(reason: &str) -> Self {
        let run_id = Uuid::now_v7();
        info!(%run_id, reason, "Embedding recreation requested");
        Self {
            run_id,
            phase: RecreationPhase::Idle,
        }
    }

    fn advance(&mut self, next: RecreationPhase) {
        info!(run_id = %self.run_id, from = %self.phase, to = %next, "Recreation phase changed");
        self.phase = next;
    }

    /// Pass `result` through, moving to `Aborted` if it is an error
    fn guard<T>(&mut self, result: SyncResult<T>) -> SyncResult<T> {
        if let Err(e) = &result {
            warn!(run_id = %self.run_id, phase = %self.phase, error = %e, "Recreation aborted");
            self.phase = RecreationPhase::Aborted;
        }
        result
    }
}

/// How the products of a run were chosen
enum Targets {
    /// The whole catalog, routed through the planner
    Catalog(Vec<Product>),
    /// Explicit products, processed directly
    Explicit(Vec<Product>),
}

impl Targets {
    fn products(&self) -> &[Product] {
        match self {
            Targets::Catalog(products) | Targets::Explicit(products) => products,
        }
    }
}

pub struct RecreationController {
    catalog: Arc<dyn ProductCatalog>,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    planner: SyncPlanner,
    processor: BatchProcessor,
    validator: EmbeddingValidator,
    config: SyncConfig,
}

impl RecreationController {
    pub fn new(deps: SyncDependencies, config: SyncConfig) -> Self {
        let embedder = ProductEmbedder::new(
            deps.provider.clone(),
            deps.store.clone(),
            config.backoff(),
            config.embedding_version.clone(),
        );

        Self {
            planner: SyncPlanner::new(deps.store.clone()),
            processor: BatchProcessor::new(Arc::new(embedder)),
            validator: EmbeddingValidator::new(deps.store.clone(), config.expected_dimensions),
            catalog: deps.catalog,
            provider: deps.provider,
            store: deps.store,
            config,
        }
    }

    /// Regenerate embeddings for explicit products or the whole catalog.
    ///
    /// Existing embeddings are always overwritten.
    pub async fn recreate(
        &self,
        options: RecreateOptions,
        control: &RunControl,
    ) -> SyncResult<RecreationResult> {
        let mut tracker = PhaseTracker::start(&options.reason);
        tracker.guard(options.validate_all())?;

        tracker.advance(RecreationPhase::ConnectivityCheck);
        tracker.guard(self.check_connectivity().await)?;

        tracker.advance(RecreationPhase::Planning);
        let targets = tracker.guard(self.resolve_targets(options.product_ids.as_deref()).await)?;

        self.execute(tracker, targets, &options, None, control).await
    }

    /// Regenerate the whole catalog. Requires a reason of at least ten
    /// characters.
    pub async fn recreate_all(
        &self,
        reason: &str,
        batch_size: Option<usize>,
        control: &RunControl,
    ) -> SyncResult<RecreationResult> {
        if reason.trim().chars().count() < MIN_FULL_RECREATION_REASON_LEN {
            return Err(SyncError::Validation(format!(
                "Full recreation requires a reason of at least {} characters",
                MIN_FULL_RECREATION_REASON_LEN
            )));
        }

        let mut options = RecreateOptions::new(reason);
        options.batch_size = batch_size;
        warn!(reason, "Recreating embeddings for the entire catalog");
        self.recreate(options, control).await
    }

    /// Regenerate only products that have no embedding or that the validator
    /// flags, with conservative pacing and validation on both sides.
    pub async fn recreate_problematic(
        &self,
        reason: &str,
        control: &RunControl,
    ) -> SyncResult<RecreationResult> {
        let options = RecreateOptions::new(reason)
            .with_pacing(Pacing::Conservative)
            .with_validation(true, true);

        let mut tracker = PhaseTracker::start(&options.reason);
        tracker.guard(options.validate_all())?;

        tracker.advance(RecreationPhase::ConnectivityCheck);
        tracker.guard(self.check_connectivity().await)?;

        tracker.advance(RecreationPhase::Planning);
        let catalog = tracker.guard(self.catalog.find_all().await)?;
        let existing: HashSet<Uuid> =
            tracker.guard(self.store.existing_ids().await)?.into_iter().collect();

        tracker.advance(RecreationPhase::ValidatingBefore);
        let before = self.validator.validate(&catalog).await;
        let flagged: HashSet<Uuid> = before.issues.iter().filter_map(|i| i.product_id).collect();

        let problematic: Vec<Product> = catalog
            .into_iter()
            .filter(|p| !existing.contains(&p.id) || flagged.contains(&p.id))
            .collect();

        info!(
            run_id = %tracker.run_id,
            problematic = problematic.len(),
            missing = before.missing,
            invalid = before.invalid,
            "Problematic products identified"
        );

        if problematic.is_empty() {
            tracker.advance(RecreationPhase::Reported);
            return Ok(RecreationResult {
                report: Default::default(),
                recreation_info: RecreationInfo {
                    reason: options.reason,
                    validation_before: Some(before),
                    ..Default::default()
                },
            });
        }

        self.execute(
            tracker,
            Targets::Explicit(problematic),
            &options,
            Some(before),
            control,
        )
        .await
    }

    async fn check_connectivity(&self) -> SyncResult<()> {
        let dimensions = self.provider.health_check().await?;
        info!(
            model = %self.provider.model_name(),
            dimensions,
            "Embedding provider reachable"
        );
        Ok(())
    }

    async fn resolve_targets(&self, ids: Option<&[Uuid]>) -> SyncResult<Targets> {
        let Some(ids) = ids else {
            let products = self.catalog.find_all().await?;
            if products.is_empty() {
                return Err(SyncError::NotFound("The catalog has no products".to_string()));
            }
            return Ok(Targets::Catalog(products));
        };

        let mut products = Vec::with_capacity(ids.len());
        let mut unknown = Vec::new();
        for id in ids {
            match self.catalog.find_by_id(*id).await? {
                Some(product) => products.push(product),
                None => unknown.push(id.to_string()),
            }
        }

        if !unknown.is_empty() {
            warn!(
                unknown = %unknown.join(", "),
                resolved = products.len(),
                "Some product ids were not found in the catalog"
            );
        }
        if products.is_empty() {
            return Err(SyncError::NotFound(
                "None of the requested products exist".to_string(),
            ));
        }
        Ok(Targets::Explicit(products))
    }

    fn processing_options(&self, options: &RecreateOptions) -> ProcessingOptions {
        let pacing = self.config.pacing(options.pacing);
        ProcessingOptions::default()
            .with_batch_size(options.batch_size.unwrap_or(pacing.batch_size))
            .with_delay_ms(pacing.delay_between_batches_ms)
            .with_max_retries(pacing.max_retries)
            .with_skip_existing(false)
            .with_force_regenerate(true)
            .with_allow_overwrite(true)
    }

    async fn execute(
        &self,
        mut tracker: PhaseTracker,
        targets: Targets,
        options: &RecreateOptions,
        before: Option<ValidationReport>,
        control: &RunControl,
    ) -> SyncResult<RecreationResult> {
        let processing = self.processing_options(options);
        tracker.guard(processing.validate_all())?;

        let products_targeted = targets.products().len();
        let pre_existing_embeddings = self.count_existing(targets.products()).await;

        let needs_catalog = (before.is_none() && options.validate_before) || options.validate_after;
        let catalog = match (&targets, needs_catalog) {
            (Targets::Catalog(products), _) => products.clone(),
            (Targets::Explicit(_), true) => tracker.guard(self.catalog.find_all().await)?,
            (Targets::Explicit(_), false) => Vec::new(),
        };

        let validation_before = match before {
            Some(report) => Some(report),
            None if options.validate_before => {
                tracker.advance(RecreationPhase::ValidatingBefore);
                Some(self.validator.validate(&catalog).await)
            }
            None => None,
        };

        tracker.advance(RecreationPhase::Processing);
        info!(
            run_id = %tracker.run_id,
            products_targeted,
            pre_existing_embeddings,
            pacing = %options.pacing,
            batch_size = processing.batch_size,
            "Recreating embeddings"
        );
        let metrics = SyncMetrics::new("recreate");
        let report = match targets {
            Targets::Catalog(products) => {
                let plan = self
                    .planner
                    .plan(products, processing.skip_existing, processing.force_regenerate)
                    .await;
                self.processor
                    .process(&plan.to_process, &processing, control, &metrics)
                    .await?
            }
            Targets::Explicit(products) => {
                self.processor
                    .process(&products, &processing, control, &metrics)
                    .await?
            }
        };

        let validation_after = if options.validate_after {
            tracker.advance(RecreationPhase::ValidatingAfter);
            Some(self.validator.validate(&catalog).await)
        } else {
            None
        };

        let valid_delta = match (&validation_before, &validation_after) {
            (Some(before), Some(after)) => Some(after.valid as i64 - before.valid as i64),
            _ => None,
        };

        tracker.advance(RecreationPhase::Reported);
        info!(
            run_id = %tracker.run_id,
            recreated = report.successful,
            failed = report.failed,
            valid_delta,
            duration_ms = report.duration_ms,
            "Embedding recreation completed"
        );

        Ok(RecreationResult {
            recreation_info: RecreationInfo {
                reason: options.reason.clone(),
                products_targeted,
                pre_existing_embeddings,
                recreated: report.successful,
                failed: report.failed,
                validation_before,
                validation_after,
                valid_delta,
            },
            report,
        })
    }

    async fn count_existing(&self, products: &[Product]) -> usize {
        match self.store.existing_ids().await {
            Ok(ids) => {
                let ids: HashSet<Uuid> = ids.into_iter().collect();
                products.iter().filter(|p| ids.contains(&p.id)).count()
            }
            Err(e) => {
                warn!(error = %e, "Could not count existing embeddings");
                0
            }
        }
    }
}
