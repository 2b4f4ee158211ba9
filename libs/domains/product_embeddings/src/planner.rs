use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::models::{PlanSummary, Product, SyncPlan};
use crate::repository::VectorStore;

/// Decides which products need an embedding
pub struct SyncPlanner {
    store: Arc<dyn VectorStore>,
}

impl SyncPlanner {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Split `products` into those to process and those already embedded.
    ///
    /// If the existing ids cannot be listed, every product is planned for
    /// processing; the embedder still skips or rejects stored ones.
    pub async fn plan(
        &self,
        products: Vec<Product>,
        skip_existing: bool,
        force_regenerate: bool,
    ) -> SyncPlan {
        if force_regenerate || !skip_existing {
            return Self::process_all(products);
        }

        let existing: HashSet<_> = match self.store.existing_ids().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "Could not list existing embeddings, planning to process all products");
                return Self::process_all(products);
            }
        };

        let total = products.len();
        let (already_embedded, to_process): (Vec<_>, Vec<_>) = products
            .into_iter()
            .partition(|product| existing.contains(&product.id));

        let summary = PlanSummary {
            total,
            existing: already_embedded.len(),
            to_process: to_process.len(),
        };
        info!(
            total = summary.total,
            existing = summary.existing,
            to_process = summary.to_process,
            "Sync plan ready"
        );

        SyncPlan {
            to_process,
            already_embedded,
            summary,
        }
    }

    fn process_all(products: Vec<Product>) -> SyncPlan {
        let summary = PlanSummary {
            total: products.len(),
            existing: 0,
            to_process: products.len(),
        };
        SyncPlan {
            to_process: products,
            already_embedded: Vec::new(),
            summary,
        }
    }
}
