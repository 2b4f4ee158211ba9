//! Batch orchestration
//!
//! Products are embedded in consecutive batches. Everything inside a batch
//! runs concurrently and settles before the next batch starts, which caps the
//! load on the provider at `batch_size` in-flight calls.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::embedder::{EmbedResult, EmbedStatus, ProductEmbedder};
use crate::error::{SyncError, SyncResult};
use crate::metrics::SyncMetrics;
use crate::models::{BatchReport, ProcessingOptions, Product, ProgressUpdate};

/// Called after every batch with a snapshot of the run
pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// Optional hooks for a single run
#[derive(Clone, Default)]
pub struct RunControl {
    progress: Option<ProgressCallback>,
    cancel: Option<watch::Receiver<bool>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Stop at the next batch boundary once the sender publishes `true`
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn report(&self, update: &ProgressUpdate) {
        if let Some(callback) = &self.progress {
            callback(update);
        }
    }

    /// Sleep between batches; returns early when cancellation is requested
    async fn pause(&self, delay: Duration) {
        match self.cancel.clone() {
            Some(mut rx) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    Ok(_) = rx.wait_for(|cancelled| *cancelled) => {
                        debug!("Cancellation requested during batch delay");
                    }
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}

impl fmt::Debug for RunControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunControl")
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

/// Runs the [`ProductEmbedder`] over many products
pub struct BatchProcessor {
    embedder: Arc<ProductEmbedder>,
}

impl BatchProcessor {
    pub fn new(embedder: Arc<ProductEmbedder>) -> Self {
        Self { embedder }
    }

    /// Embed `products` in batches and return exact tallies.
    ///
    /// Fails only when `options` are invalid, before any product is touched.
    pub async fn process(
        &self,
        products: &[Product],
        options: &ProcessingOptions,
        control: &RunControl,
        metrics: &SyncMetrics,
    ) -> SyncResult<BatchReport> {
        options.validate_all()?;

        let started = Instant::now();
        let allow_overwrite = options.overwrite_existing();
        let total = products.len();
        let total_batches = total.div_ceil(options.batch_size);
        let delay = Duration::from_millis(options.delay_between_batches_ms);

        let mut report = BatchReport {
            total,
            ..Default::default()
        };

        info!(
            total,
            batch_size = options.batch_size,
            total_batches,
            allow_overwrite,
            "Starting batch processing"
        );

        let mut processing_time = Duration::ZERO;

        for (index, batch) in products.chunks(options.batch_size).enumerate() {
            if control.is_cancelled() {
                let remaining = &products[index * options.batch_size..];
                warn!(
                    remaining = remaining.len(),
                    batch = index + 1,
                    "Run cancelled, remaining products not processed"
                );
                for product in remaining {
                    report.record_failure(product.id, &product.name, &SyncError::Cancelled);
                    metrics.item_failed(SyncError::Cancelled.kind());
                }
                report.cancelled = true;
                break;
            }

            let batch_started = Instant::now();
            let mut results = join_all(
                batch
                    .iter()
                    .map(|product| self.embedder.embed(product, allow_overwrite, options.max_retries)),
            )
            .await;

            if results.iter().any(EmbedResult::is_embedded) {
                if let Err(error) = self.embedder.flush().await {
                    warn!(
                        batch = index + 1,
                        error = %error,
                        "Failed to persist batch, its embeddings were discarded"
                    );
                    for result in results.iter_mut().filter(|r| r.is_embedded()) {
                        result.status = EmbedStatus::Failed(error.clone());
                    }
                }
            }

            for result in results {
                match result.status {
                    EmbedStatus::Embedded { dimensions } => {
                        report.record_success(result.product_id, &result.product_name, dimensions);
                        metrics.item_embedded(result.attempts);
                    }
                    EmbedStatus::Skipped => {
                        report.record_skip();
                        metrics.item_skipped();
                    }
                    EmbedStatus::Failed(error) => {
                        report.record_failure(result.product_id, &result.product_name, &error);
                        metrics.item_failed(error.kind());
                    }
                }
            }

            let batch_duration = batch_started.elapsed();
            processing_time += batch_duration;
            metrics.batch_completed(batch_duration);

            let processed = report.processed();
            let current_batch = index + 1;
            debug!(
                batch = current_batch,
                total_batches,
                size = batch.len(),
                duration_ms = batch_duration.as_millis() as u64,
                "Batch completed"
            );

            control.report(&ProgressUpdate {
                total,
                processed,
                successful: report.successful,
                skipped: report.skipped,
                failed: report.failed,
                percentage: percentage(processed, total),
                current_batch,
                total_batches,
                current_item: batch.last().map(|p| p.name.clone()),
                estimated_remaining_ms: Some(estimate_remaining_ms(
                    processing_time,
                    processed,
                    total,
                    total_batches - current_batch,
                    delay,
                )),
            });

            if current_batch < total_batches && !delay.is_zero() {
                control.pause(delay).await;
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            total = report.total,
            successful = report.successful,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "Batch processing completed"
        );

        Ok(report)
    }
}

fn percentage(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (processed as f64 * 100.0 / total as f64).round().min(100.0) as u8
}

/// Average per-product time of completed batches times the products left,
/// plus the pauses still ahead
fn estimate_remaining_ms(
    processing_time: Duration,
    processed: usize,
    total: usize,
    remaining_batches: usize,
    delay: Duration,
) -> u64 {
    if processed == 0 {
        return 0;
    }
    let per_item_ms = processing_time.as_millis() as f64 / processed as f64;
    let remaining_items = total.saturating_sub(processed) as f64;
    (per_item_ms * remaining_items) as u64 + delay.as_millis() as u64 * remaining_batches as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, MockEmbeddingProvider};
    use crate::repository::MockVectorStore;
    use crate::retry::BackoffPolicy;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    fn processor(provider: MockEmbeddingProvider, store: MockVectorStore) -> BatchProcessor {
        let embedder = ProductEmbedder::new(
            Arc::new(provider),
            Arc::new(store),
            BackoffPolicy::new().with_base_delay(1),
            "v1",
        );
        BatchProcessor::new(Arc::new(embedder))
    }

    fn working_provider() -> MockEmbeddingProvider {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_generate_embedding()
            .returning(|_| Ok(vec![0.5; 4]));
        provider
            .expect_model_name()
            .returning(|| "test-model".to_string());
        provider
    }

    fn empty_store() -> MockVectorStore {
        let mut store = MockVectorStore::new();
        store.expect_has_embedding().returning(|_| Ok(false));
        store.expect_store().returning(|_, _| Ok(()));
        store.expect_flush().returning(|| Ok(()));
        store
    }

    fn products(n: usize) -> Vec<Product> {
        (0..n)
            .map(|i| Product::new(format!("Product {i}")).with_category("test"))
            .collect()
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(5, 12), 42);
        assert_eq!(percentage(10, 12), 83);
        assert_eq!(percentage(12, 12), 100);
        assert_eq!(percentage(0, 0), 100);
    }

    #[test]
    fn test_estimate_remaining() {
        let estimate = estimate_remaining_ms(
            Duration::from_millis(500),
            5,
            12,
            2,
            Duration::from_millis(100),
        );
        // 100ms per item * 7 items + 2 pauses
        assert_eq!(estimate, 900);
        assert_eq!(
            estimate_remaining_ms(Duration::ZERO, 0, 10, 1, Duration::ZERO),
            0
        );
    }

    #[tokio::test]
    async fn test_rejects_invalid_options_before_work() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_generate_embedding().never();
        let mut store = MockVectorStore::new();
        store.expect_has_embedding().never();

        let result = processor(provider, store)
            .process(
                &products(3),
                &ProcessingOptions::default().with_batch_size(0),
                &RunControl::new(),
                &SyncMetrics::new("test"),
            )
            .await;

        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_after_each_batch() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = updates.clone();
        let control = RunControl::new().with_progress(move |update| {
            sink.lock().unwrap().push(update.clone());
        });

        let report = processor(working_provider(), empty_store())
            .process(
                &products(7),
                &ProcessingOptions::default().with_batch_size(3).with_delay_ms(50),
                &control,
                &SyncMetrics::new("test"),
            )
            .await
            .unwrap();

        assert_eq!(report.total, 7);
        assert_eq!(report.successful, 7);

        let updates = updates.lock().unwrap();
        let processed: Vec<usize> = updates.iter().map(|u| u.processed).collect();
        assert_eq!(processed, vec![3, 6, 7]);
        assert!(updates.iter().all(|u| u.total_batches == 3));
        assert_eq!(updates[2].current_item.as_deref(), Some("Product 6"));
        assert_eq!(updates[2].percentage, 100);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_siblings() {
        let items = products(5);
        let poisoned = items[2].name.clone();

        let mut provider = MockEmbeddingProvider::new();
        provider.expect_generate_embedding().returning(move |text| {
            if text.starts_with(&poisoned) {
                Err(SyncError::Provider("quota exceeded".into()))
            } else {
                Ok(vec![0.1; 4])
            }
        });
        provider
            .expect_model_name()
            .returning(|| "test-model".to_string());

        let report = processor(provider, empty_store())
            .process(
                &items,
                &ProcessingOptions::default().with_max_retries(2),
                &RunControl::new(),
                &SyncMetrics::new("test"),
            )
            .await
            .unwrap();

        assert_eq!(report.successful, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].product_id, items[2].id);
        assert_eq!(report.errors[0].kind, "provider");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_at_batch_boundary() {
        let (tx, rx) = watch::channel(false);
        let control = RunControl::new()
            .with_cancel(rx)
            .with_progress(move |update| {
                if update.current_batch == 1 {
                    let _ = tx.send(true);
                }
            });

        let report = processor(working_provider(), empty_store())
            .process(
                &products(6),
                &ProcessingOptions::default().with_batch_size(2).with_delay_ms(1000),
                &control,
                &SyncMetrics::new("test"),
            )
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 4);
        assert_eq!(report.processed(), report.total);
        assert!(report.errors.iter().all(|e| e.kind == "cancelled"));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let report = processor(MockEmbeddingProvider::new(), MockVectorStore::new())
            .process(
                &[],
                &ProcessingOptions::default(),
                &RunControl::new(),
                &SyncMetrics::new("test"),
            )
            .await
            .unwrap();

        assert_eq!(report.total, 0);
        assert_eq!(report.processed(), 0);
        assert!(!report.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_between_batches_but_not_after_the_last() {
        let started = Instant::now();

        let report = processor(working_provider(), empty_store())
            .process(
                &products(12),
                &ProcessingOptions::default().with_batch_size(5).with_delay_ms(1000),
                &RunControl::new(),
                &SyncMetrics::new("test"),
            )
            .await
            .unwrap();

        assert_eq!(report.successful, 12);
        // Three batches, two pauses
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
    }

    /// Holds every call until `gate` calls are in flight at once
    struct GatedProvider {
        gate: Barrier,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for GatedProvider {
        fn model_name(&self) -> String {
            "gated".to_string()
        }

        async fn generate_embedding(&self, _text: &str) -> SyncResult<Vec<f32>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.gate.wait().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![0.5; 4])
        }
    }

    #[tokio::test]
    async fn test_products_of_a_batch_run_concurrently() {
        let provider = Arc::new(GatedProvider {
            gate: Barrier::new(4),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let embedder = ProductEmbedder::new(
            provider.clone(),
            Arc::new(empty_store()),
            BackoffPolicy::new().with_base_delay(1),
            "v1",
        );

        let processor = BatchProcessor::new(Arc::new(embedder));
        let items = products(8);
        let options = ProcessingOptions::default().with_batch_size(4).with_delay_ms(0);
        let control = RunControl::new();
        let metrics = SyncMetrics::new("test");
        let run = processor.process(&items, &options, &control, &metrics);
        // Sequential embedding would never get four callers through the gate
        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("batch products were not embedded concurrently")
            .unwrap();

        assert_eq!(report.successful, 8);
        assert_eq!(provider.peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failed_flush_fails_the_batch_embeddings() {
        let mut store = MockVectorStore::new();
        store.expect_has_embedding().returning(|_| Ok(false));
        store.expect_store().returning(|_, _| Ok(()));
        let mut flushes = 0;
        store.expect_flush().times(2).returning(move || {
            flushes += 1;
            if flushes == 1 {
                Err(SyncError::Store("I/O error: read-only file system".into()))
            } else {
                Ok(())
            }
        });

        let report = processor(working_provider(), store)
            .process(
                &products(4),
                &ProcessingOptions::default().with_batch_size(2).with_delay_ms(0),
                &RunControl::new(),
                &SyncMetrics::new("test"),
            )
            .await
            .unwrap();

        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 2);
        assert!(report.errors.iter().all(|e| e.kind == "store"));
        assert_eq!(report.processed(), report.total);
    }
}
