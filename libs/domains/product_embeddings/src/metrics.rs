//! Metrics for embedding runs
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metrics helper labelled with the operation that drives the run
/// (`initialize`, `recreate`, `embed_product`, ...)
#[derive(Debug, Clone)]
pub struct SyncMetrics {
    operation: String,
}

impl SyncMetrics {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn item_embedded(&self, attempts: u32) {
        counter!(
            "product_embeddings_items_total",
            "operation" => self.operation.clone(),
            "status" => "embedded"
        )
        .increment(1);

        if attempts > 1 {
            counter!(
                "product_embeddings_retries_total",
                "operation" => self.operation.clone()
            )
            .increment(u64::from(attempts - 1));
        }
    }

    pub fn item_skipped(&self) {
        counter!(
            "product_embeddings_items_total",
            "operation" => self.operation.clone(),
            "status" => "skipped"
        )
        .increment(1);
    }

    pub fn item_failed(&self, kind: &str) {
        counter!(
            "product_embeddings_items_total",
            "operation" => self.operation.clone(),
            "status" => "failed"
        )
        .increment(1);

        counter!(
            "product_embeddings_errors_total",
            "operation" => self.operation.clone(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    pub fn batch_completed(&self, duration: Duration) {
        histogram!(
            "product_embeddings_batch_duration_seconds",
            "operation" => self.operation.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Current coverage of the catalog, 0-100
    pub fn coverage(&self, percent: f64) {
        gauge!("product_embeddings_coverage_percent").set(percent);
    }
}
