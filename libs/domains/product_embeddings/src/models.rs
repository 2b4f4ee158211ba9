use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

use crate::error::{SyncError, SyncResult};

/// Maximum number of failed products listed in a [`BatchReport`].
pub const REPORTED_ERROR_LIMIT: usize = 50;
/// Maximum number of embedded products listed in a [`BatchReport`].
pub const REPORTED_SUCCESS_LIMIT: usize = 10;
/// Upper bound on explicitly targeted products per recreation run.
pub const MAX_TARGET_PRODUCTS: usize = 1000;
/// Minimum reason length required to regenerate the whole catalog.
pub const MIN_FULL_RECREATION_REASON_LEN: usize = 10;

/// Product as supplied by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(alias = "_id")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub brand: Option<String>,
    /// Price in cents
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
}

impl Product {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: String::new(),
            category: String::new(),
            brand: None,
            price: None,
            features: Vec::new(),
            tags: Vec::new(),
            specifications: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_specification(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.specifications.insert(key.into(), value.into());
        self
    }

    /// Text sent to the embedding provider.
    ///
    /// Name, description, category, features, tags and `key: value`
    /// specification pairs in that order. Blank parts are dropped.
    pub fn embeddable_text(&self) -> String {
        let mut parts: Vec<String> = vec![
            self.name.clone(),
            self.description.clone(),
            self.category.clone(),
        ];
        parts.extend(self.features.iter().cloned());
        parts.extend(self.tags.iter().cloned());
        parts.extend(
            self.specifications
                .iter()
                .filter(|(key, value)| !key.trim().is_empty() && !value.trim().is_empty())
                .map(|(key, value)| format!("{}: {}", key.trim(), value.trim())),
        );

        parts
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Snapshot of product attributes at generation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    pub name: String,
    pub category: String,
    pub brand: Option<String>,
    pub price: Option<i64>,
    pub tags: Vec<String>,
    pub dimensions: usize,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub version: String,
}

/// One stored embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: Uuid,
    pub product_id: Uuid,
    pub vector: Vec<f32>,
    pub metadata: EmbeddingMetadata,
}

impl EmbeddingRecord {
    pub fn new(product: &Product, vector: Vec<f32>, model: &str, version: &str) -> Self {
        let metadata = EmbeddingMetadata {
            name: product.name.clone(),
            category: product.category.clone(),
            brand: product.brand.clone(),
            price: product.price,
            tags: product.tags.clone(),
            dimensions: vector.len(),
            model: model.to_string(),
            generated_at: Utc::now(),
            version: version.to_string(),
        };

        Self {
            id: Uuid::now_v7(),
            product_id: product.id,
            vector,
            metadata,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// Introspection result from [`crate::VectorStore::info`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingInfo {
    pub exists: bool,
    pub dimensions: Option<usize>,
    pub created_at: Option<DateTime<Utc>>,
}

impl EmbeddingInfo {
    pub fn missing() -> Self {
        Self {
            exists: false,
            dimensions: None,
            created_at: None,
        }
    }
}

/// Similarity search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredProduct {
    pub product_id: Uuid,
    pub score: f32,
    pub metadata: EmbeddingMetadata,
}

/// Per-run processing options supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProcessingOptions {
    #[validate(range(min = 1, max = 50))]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub delay_between_batches_ms: u64,
    /// Total attempts per product, including the first one
    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub skip_existing: bool,
    #[serde(default)]
    pub force_regenerate: bool,
    #[serde(default)]
    pub allow_overwrite: bool,
    #[validate(length(min = 1, max = 1000))]
    #[serde(default)]
    pub target_product_ids: Option<Vec<Uuid>>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            delay_between_batches_ms: default_batch_delay_ms(),
            max_retries: default_max_retries(),
            skip_existing: true,
            force_regenerate: false,
            allow_overwrite: false,
            target_product_ids: None,
        }
    }
}

impl ProcessingOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_between_batches_ms = delay_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    pub fn with_force_regenerate(mut self, force: bool) -> Self {
        self.force_regenerate = force;
        self
    }

    pub fn with_allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    pub fn with_targets(mut self, ids: Vec<Uuid>) -> Self {
        self.target_product_ids = Some(ids);
        self
    }

    /// Whether stored records may be replaced during this run.
    ///
    /// Decided once from the caller's options and passed down to every
    /// product, so the planner and the embedder never disagree.
    pub fn overwrite_existing(&self) -> bool {
        self.allow_overwrite || self.force_regenerate
    }

    /// Derive-based range checks plus the rules the derive cannot express.
    pub fn validate_all(&self) -> SyncResult<()> {
        self.validate()?;
        if let Some(ids) = &self.target_product_ids {
            ensure_unique_ids(ids)?;
        }
        Ok(())
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

pub(crate) fn ensure_unique_ids(ids: &[Uuid]) -> SyncResult<()> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    let duplicates: Vec<String> = ids
        .iter()
        .filter(|id| !seen.insert(**id))
        .map(Uuid::to_string)
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Validation(format!(
            "Duplicate product ids: {}",
            duplicates.join(", ")
        )))
    }
}

/// A product that could not be embedded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub product_id: Uuid,
    pub name: String,
    pub kind: String,
    pub message: String,
}

/// A product embedded during the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSuccess {
    pub product_id: Uuid,
    pub name: String,
    pub dimensions: usize,
}

/// Outcome of one batch-processing run
///
/// Counts are exact; `errors` and `successes` are truncated samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<ItemError>,
    pub successes: Vec<ItemSuccess>,
    pub duration_ms: u64,
    #[serde(default)]
    pub cancelled: bool,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.successful + self.skipped + self.failed
    }

    pub(crate) fn record_success(&mut self, product_id: Uuid, name: &str, dimensions: usize) {
        self.successful += 1;
        if self.successes.len() < REPORTED_SUCCESS_LIMIT {
            self.successes.push(ItemSuccess {
                product_id,
                name: name.to_string(),
                dimensions,
            });
        }
    }

    pub(crate) fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub(crate) fn record_failure(&mut self, product_id: Uuid, name: &str, error: &SyncError) {
        self.failed += 1;
        if self.errors.len() < REPORTED_ERROR_LIMIT {
            self.errors.push(ItemError {
                product_id,
                name: name.to_string(),
                kind: error.kind().to_string(),
                message: error.to_string(),
            });
        }
    }

    /// Fold in products the planner excluded because they already had an
    /// embedding. They count as skipped so every product is tallied once.
    pub fn include_already_embedded(&mut self, count: usize) {
        self.total += count;
        self.skipped += count;
    }
}

/// Snapshot handed to the progress callback after each batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
    pub percentage: u8,
    pub current_batch: usize,
    pub total_batches: usize,
    pub current_item: Option<String>,
    pub estimated_remaining_ms: Option<u64>,
}

/// A single finding of the validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// `None` for run-level issues that are not tied to a product
    pub product_id: Option<Uuid>,
    pub issue: String,
}

/// Health of the stored embeddings relative to the catalog
///
/// `valid + invalid + missing == total_products` always holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_products: usize,
    pub valid: usize,
    pub invalid: usize,
    pub missing: usize,
    /// Stored embeddings whose product is no longer in the catalog
    pub orphaned: usize,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn existing(&self) -> usize {
        self.valid + self.invalid
    }

    pub(crate) fn failed(message: String) -> Self {
        Self {
            issues: vec![ValidationIssue {
                product_id: None,
                issue: message,
            }],
            ..Default::default()
        }
    }
}

/// Planner summary counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total: usize,
    pub existing: usize,
    pub to_process: usize,
}

/// Planner output
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub to_process: Vec<Product>,
    pub already_embedded: Vec<Product>,
    pub summary: PlanSummary,
}

/// Pacing profile for recreation runs
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Pacing {
    /// Smaller batches, longer pauses, more retries
    #[default]
    Conservative,
    Standard,
}

/// Caller input for [`crate::RecreationController::recreate`]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecreateOptions {
    /// Explicit targets. `None` regenerates the whole catalog.
    #[validate(length(min = 1, max = 1000))]
    #[serde(default)]
    pub product_ids: Option<Vec<Uuid>>,
    #[validate(length(min = 1))]
    pub reason: String,
    #[validate(range(min = 1, max = 50))]
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default = "default_true")]
    pub validate_before: bool,
    #[serde(default = "default_true")]
    pub validate_after: bool,
}

impl RecreateOptions {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            product_ids: None,
            reason: reason.into(),
            batch_size: None,
            pacing: Pacing::default(),
            validate_before: true,
            validate_after: true,
        }
    }

    pub fn for_products(mut self, ids: Vec<Uuid>) -> Self {
        self.product_ids = Some(ids);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_validation(mut self, before: bool, after: bool) -> Self {
        self.validate_before = before;
        self.validate_after = after;
        self
    }

    pub fn validate_all(&self) -> SyncResult<()> {
        self.validate()?;
        if self.reason.trim().is_empty() {
            return Err(SyncError::Validation(
                "A reason for the recreation is required".to_string(),
            ));
        }
        if let Some(ids) = &self.product_ids {
            ensure_unique_ids(ids)?;
        }
        Ok(())
    }
}

/// Recreation-specific part of [`RecreationResult`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecreationInfo {
    pub reason: String,
    pub products_targeted: usize,
    pub pre_existing_embeddings: usize,
    pub recreated: usize,
    pub failed: usize,
    pub validation_before: Option<ValidationReport>,
    pub validation_after: Option<ValidationReport>,
    /// Change in valid embeddings, after minus before
    pub valid_delta: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecreationResult {
    #[serde(flatten)]
    pub report: BatchReport,
    pub recreation_info: RecreationInfo,
}

/// Coverage of the catalog by stored embeddings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub total_products: usize,
    pub embedded: usize,
    pub missing: usize,
    pub coverage_percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embeddable_text_order_and_filtering() {
        let product = Product::new("  Trail Runner ")
            .with_description("Lightweight shoe")
            .with_category("footwear")
            .with_features(vec!["breathable".into(), "   ".into()])
            .with_tags(vec!["running".into(), String::new()])
            .with_specification("weight", "220g")
            .with_specification("color", " ")
            .with_specification("drop", "8mm");

        assert_eq!(
            product.embeddable_text(),
            "Trail Runner Lightweight shoe footwear breathable running drop: 8mm weight: 220g"
        );
    }

    #[test]
    fn test_embeddable_text_blank_product() {
        let product = Product::new("   ");
        assert!(product.embeddable_text().is_empty());
    }

    #[test]
    fn test_record_snapshots_product() {
        let product = Product::new("Desk Lamp").with_category("lighting");
        let record = EmbeddingRecord::new(&product, vec![0.5; 4], "test-model", "v1");

        assert_eq!(record.product_id, product.id);
        assert_eq!(record.dimensions(), 4);
        assert_eq!(record.metadata.dimensions, 4);
        assert_eq!(record.metadata.name, "Desk Lamp");
        assert_eq!(record.metadata.category, "lighting");
        assert_eq!(record.metadata.version, "v1");
    }

    #[test]
    fn test_processing_options_ranges() {
        assert!(ProcessingOptions::default().validate_all().is_ok());
        assert!(ProcessingOptions::default().with_batch_size(0).validate_all().is_err());
        assert!(ProcessingOptions::default().with_batch_size(51).validate_all().is_err());
        assert!(ProcessingOptions::default().with_max_retries(0).validate_all().is_err());
        assert!(ProcessingOptions::default().with_max_retries(11).validate_all().is_err());
        assert!(ProcessingOptions::default().with_targets(vec![]).validate_all().is_err());
    }

    #[test]
    fn test_processing_options_rejects_duplicate_targets() {
        let id = Uuid::new_v4();
        let result = ProcessingOptions::default()
            .with_targets(vec![id, Uuid::new_v4(), id])
            .validate_all();
        assert!(matches!(result, Err(SyncError::Validation(msg)) if msg.contains(&id.to_string())));
    }

    #[test]
    fn test_force_regenerate_grants_overwrite() {
        let options = ProcessingOptions::default();
        assert!(!options.overwrite_existing());
        assert!(options.clone().with_force_regenerate(true).overwrite_existing());
        assert!(options.with_allow_overwrite(true).overwrite_existing());
    }

    #[test]
    fn test_processing_options_serde_defaults() {
        let options: ProcessingOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.batch_size, 10);
        assert_eq!(options.delay_between_batches_ms, 1000);
        assert_eq!(options.max_retries, 3);
        assert!(options.skip_existing);
        assert!(!options.force_regenerate);
    }

    #[test]
    fn test_recreate_options_validation() {
        assert!(RecreateOptions::new("model upgrade").validate_all().is_ok());
        assert!(RecreateOptions::new("   ").validate_all().is_err());
        assert!(RecreateOptions::new("").validate_all().is_err());
        // Long incident write-ups are fine
        assert!(RecreateOptions::new("x".repeat(2000)).validate_all().is_ok());
        assert!(
            RecreateOptions::new("fix")
                .for_products(vec![])
                .validate_all()
                .is_err()
        );
        assert!(
            RecreateOptions::new("fix")
                .with_batch_size(60)
                .validate_all()
                .is_err()
        );

        let too_many: Vec<Uuid> = (0..=MAX_TARGET_PRODUCTS).map(|_| Uuid::new_v4()).collect();
        assert!(
            RecreateOptions::new("fix")
                .for_products(too_many)
                .validate_all()
                .is_err()
        );
    }

    #[test]
    fn test_report_bounds_samples_but_not_counts() {
        let mut report = BatchReport::default();
        let err = SyncError::Provider("quota".into());
        for i in 0..(REPORTED_ERROR_LIMIT + 5) {
            report.record_failure(Uuid::new_v4(), &format!("p{i}"), &err);
        }
        for i in 0..(REPORTED_SUCCESS_LIMIT + 5) {
            report.record_success(Uuid::new_v4(), &format!("s{i}"), 8);
        }

        assert_eq!(report.failed, REPORTED_ERROR_LIMIT + 5);
        assert_eq!(report.errors.len(), REPORTED_ERROR_LIMIT);
        assert_eq!(report.successful, REPORTED_SUCCESS_LIMIT + 5);
        assert_eq!(report.successes.len(), REPORTED_SUCCESS_LIMIT);
        assert_eq!(report.errors[0].kind, "provider");
    }

    #[test]
    fn test_pacing_parses() {
        assert_eq!("standard".parse::<Pacing>().unwrap(), Pacing::Standard);
        assert_eq!(Pacing::default().to_string(), "conservative");
    }

    #[test]
    fn test_recreation_result_flattens_report() {
        let result = RecreationResult::default();
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("successful").is_some());
        assert!(json.get("recreation_info").is_some());
    }
}
