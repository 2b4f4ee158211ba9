//! Product Embeddings Domain
//!
//! Keeps a vector store consistent with the product catalog: generates,
//! stores, validates and selectively regenerates one embedding per product.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ EmbeddingSyncService │  ← initialize, embed, delete, validate, stats, search
//! └──────────┬───────────┘
//!            │            ┌──────────────────────┐
//!            ├────────────│ RecreationController │  ← forced regeneration
//!            │            └──────────────────────┘
//! ┌──────────▼───────────┐
//! │ SyncPlanner          │  ← what still needs an embedding
//! │ BatchProcessor       │  ← batches, pacing, progress, cancellation
//! │ ProductEmbedder      │  ← one product, retries with backoff
//! │ EmbeddingValidator   │  ← dimensions and coverage
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │ ProductCatalog       │  ← source of truth (trait + in-memory / JSON file)
//! │ EmbeddingProvider    │  ← text to vector (trait + OpenAI / local hashing)
//! │ VectorStore          │  ← persistence (trait + in-memory / JSON file)
//! └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use domain_product_embeddings::{
//!     EmbeddingSyncService, InMemoryVectorStore, JsonFileCatalog, LocalHashProvider,
//!     ProcessingOptions, RunControl, SyncConfig, SyncDependencies,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let deps = SyncDependencies {
//!     catalog: Arc::new(JsonFileCatalog::new("catalog.json")),
//!     provider: Arc::new(LocalHashProvider::new(256)),
//!     store: Arc::new(InMemoryVectorStore::new()),
//! };
//! let service = EmbeddingSyncService::new(deps, SyncConfig::default().with_expected_dimensions(256));
//!
//! let report = service
//!     .initialize(&ProcessingOptions::default(), &RunControl::new())
//!     .await?;
//! println!("{} embedded, {} skipped", report.successful, report.skipped);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod catalog;
pub mod config;
pub mod embedder;
pub mod embedding;
pub mod error;
pub mod metrics;
pub mod models;
pub mod planner;
pub mod recreation;
pub mod repository;
pub mod retry;
pub mod service;
pub mod store;
pub mod validator;

// Re-export commonly used types
pub use batch::{BatchProcessor, ProgressCallback, RunControl};
pub use catalog::{InMemoryCatalog, JsonFileCatalog};
pub use config::{MIN_EMBEDDING_DIMENSIONS, PacingSettings, SyncConfig};
pub use embedder::{EmbedResult, EmbedStatus, ProductEmbedder};
pub use embedding::{EmbeddingProvider, LocalHashProvider, OpenAIConfig, OpenAIProvider};
pub use error::{SyncError, SyncResult};
pub use models::{
    BatchReport, EmbeddingInfo, EmbeddingRecord, EmbeddingStats, ItemError, ItemSuccess, Pacing,
    ProcessingOptions, Product, ProgressUpdate, RecreateOptions, RecreationInfo,
    RecreationResult, ScoredProduct, ValidationIssue, ValidationReport,
};
pub use planner::SyncPlanner;
pub use recreation::{RecreationController, RecreationPhase};
pub use repository::{ProductCatalog, VectorStore};
pub use retry::BackoffPolicy;
pub use service::{EmbeddingSyncService, SyncDependencies};
pub use store::{InMemoryVectorStore, JsonFileVectorStore};
pub use validator::EmbeddingValidator;
