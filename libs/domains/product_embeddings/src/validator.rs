use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{Product, ValidationIssue, ValidationReport};
use crate::repository::VectorStore;

/// Checks stored embeddings against the catalog and the expected dimensionality
pub struct EmbeddingValidator {
    store: Arc<dyn VectorStore>,
    expected_dimensions: usize,
}

enum Verdict {
    Valid,
    Invalid(String),
}

impl EmbeddingValidator {
    pub fn new(store: Arc<dyn VectorStore>, expected_dimensions: usize) -> Self {
        Self {
            store,
            expected_dimensions,
        }
    }

    /// Never fails: if the store cannot be queried the report is all zeros
    /// with one issue describing the failure.
    #[instrument(skip_all, fields(products = products.len()))]
    pub async fn validate(&self, products: &[Product]) -> ValidationReport {
        let existing: HashSet<Uuid> = match self.store.existing_ids().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "Embedding validation failed");
                return ValidationReport::failed(format!("Validation failed: {}", e));
            }
        };

        let catalog_ids: HashSet<Uuid> = products.iter().map(|p| p.id).collect();
        let mut report = ValidationReport {
            total_products: products.len(),
            orphaned: existing.difference(&catalog_ids).count(),
            ..Default::default()
        };

        // Catalog order keeps the issue list stable between runs
        for product in products.iter().filter(|p| existing.contains(&p.id)) {
            match self.check(product.id).await {
                Verdict::Valid => report.valid += 1,
                Verdict::Invalid(issue) => {
                    report.invalid += 1;
                    report.issues.push(ValidationIssue {
                        product_id: Some(product.id),
                        issue,
                    });
                }
            }
        }
        report.missing = report.total_products - report.existing();

        info!(
            total = report.total_products,
            valid = report.valid,
            invalid = report.invalid,
            missing = report.missing,
            orphaned = report.orphaned,
            "Embedding validation completed"
        );
        report
    }

    async fn check(&self, product_id: Uuid) -> Verdict {
        match self.store.info(product_id).await {
            Ok(info) if !info.exists => {
                Verdict::Invalid("Embedding listed but not found in the store".to_string())
            }
            Ok(info) => match info.dimensions {
                Some(dimensions) if dimensions == self.expected_dimensions => Verdict::Valid,
                Some(dimensions) => Verdict::Invalid(format!(
                    "Dimension mismatch: expected {}, got {}",
                    self.expected_dimensions, dimensions
                )),
                None => Verdict::Invalid("Embedding has no recorded dimensions".to_string()),
            },
            // Existence is all this backend can confirm
            Err(SyncError::Unsupported(_)) => Verdict::Valid,
            Err(e) => Verdict::Invalid(format!("Cannot retrieve embedding info: {}", e)),
        }
    }
}
