//! Embedding Sync
//!
//! Keeps product embeddings in step with the catalog. Initializes missing
//! embeddings, validates what is stored and regenerates embeddings on demand.
//! Reports are printed to stdout as JSON; logs go to stderr.

use clap::{Parser, Subcommand};
use core_config::FromEnv;
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_product_embeddings::{
    EmbedStatus, Pacing, ProgressUpdate, RecreateOptions, RunControl,
};
use eyre::Result;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

mod config;
mod wiring;

use config::Config;

#[derive(Parser)]
#[command(name = "embedding-sync")]
#[command(about = "Generate, validate and recreate product embeddings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed catalog products that have no embedding yet
    Init {
        /// Products per batch (1-50). Defaults to SYNC_BATCH_SIZE.
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Pause between batches in milliseconds
        #[arg(short, long)]
        delay_ms: Option<u64>,

        /// Attempts per product, including the first (1-10)
        #[arg(short, long)]
        max_retries: Option<u32>,

        /// Regenerate embeddings that already exist
        #[arg(short, long)]
        force: bool,

        /// Only these product ids
        #[arg(short, long, value_delimiter = ',')]
        products: Option<Vec<Uuid>>,
    },

    /// Embed a single product
    Embed {
        product_id: Uuid,

        /// Replace an existing embedding
        #[arg(long)]
        overwrite: bool,
    },

    /// Check stored embeddings against the catalog
    Validate,

    /// Show embedding coverage of the catalog
    Stats,

    /// Regenerate embeddings for specific products or the whole catalog
    Recreate {
        /// Why the embeddings are being regenerated
        #[arg(short, long)]
        reason: String,

        /// Product ids to regenerate. Omit for the whole catalog.
        #[arg(short, long, value_delimiter = ',')]
        products: Option<Vec<Uuid>>,

        #[arg(short, long)]
        batch_size: Option<usize>,

        /// conservative (default) or standard
        #[arg(long, default_value_t = Pacing::Conservative)]
        pacing: Pacing,

        /// Skip validation before regenerating
        #[arg(long)]
        no_validate_before: bool,

        /// Skip validation after regenerating
        #[arg(long)]
        no_validate_after: bool,
    },

    /// Regenerate every embedding in the catalog
    RecreateAll {
        /// At least 10 characters
        #[arg(short, long)]
        reason: String,

        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Regenerate only missing and invalid embeddings
    RecreateProblematic {
        #[arg(short, long, default_value = "Repair missing and invalid embeddings")]
        reason: String,
    },

    /// Delete the embedding of a product
    Delete { product_id: Uuid },

    /// Find products similar to a text query
    Search {
        query: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    let cli = Cli::parse();
    let service = wiring::build_service(&config).await?;
    let control = run_control();

    match cli.command {
        Commands::Init {
            batch_size,
            delay_ms,
            max_retries,
            force,
            products,
        } => {
            let defaults = service.config().default_options();
            let mut options = defaults
                .clone()
                .with_batch_size(batch_size.unwrap_or(defaults.batch_size))
                .with_delay_ms(delay_ms.unwrap_or(defaults.delay_between_batches_ms))
                .with_max_retries(max_retries.unwrap_or(defaults.max_retries))
                .with_force_regenerate(force);
            if let Some(ids) = products {
                options = options.with_targets(ids);
            }

            info!("Starting embedding initialization");
            let report = service.initialize(&options, &control).await?;
            print_json(&report)?;
        }

        Commands::Embed {
            product_id,
            overwrite,
        } => {
            let result = service.embed_product(product_id, overwrite).await?;
            let (status, dimensions, error) = match &result.status {
                EmbedStatus::Embedded { dimensions } => ("embedded", Some(*dimensions), None),
                EmbedStatus::Skipped => ("skipped", None, None),
                EmbedStatus::Failed(e) => ("failed", None, Some(e.to_string())),
            };
            print_json(&serde_json::json!({
                "product_id": result.product_id,
                "name": result.product_name,
                "status": status,
                "dimensions": dimensions,
                "attempts": result.attempts,
                "error": error,
            }))?;
        }

        Commands::Validate => {
            let report = service.validate().await;
            print_json(&report)?;
        }

        Commands::Stats => {
            let stats = service.stats().await?;
            print_json(&stats)?;
        }

        Commands::Recreate {
            reason,
            products,
            batch_size,
            pacing,
            no_validate_before,
            no_validate_after,
        } => {
            let mut options = RecreateOptions::new(reason)
                .with_pacing(pacing)
                .with_validation(!no_validate_before, !no_validate_after);
            if let Some(ids) = products {
                options = options.for_products(ids);
            }
            if let Some(size) = batch_size {
                options = options.with_batch_size(size);
            }

            let result = service.recreation().recreate(options, &control).await?;
            print_json(&result)?;
        }

        Commands::RecreateAll { reason, batch_size } => {
            let result = service
                .recreation()
                .recreate_all(&reason, batch_size, &control)
                .await?;
            print_json(&result)?;
        }

        Commands::RecreateProblematic { reason } => {
            let result = service
                .recreation()
                .recreate_problematic(&reason, &control)
                .await?;
            print_json(&result)?;
        }

        Commands::Delete { product_id } => {
            let deleted = service.delete_embedding(product_id).await?;
            print_json(&serde_json::json!({ "product_id": product_id, "deleted": deleted }))?;
        }

        Commands::Search { query, limit } => {
            let results = service.search(&query, limit).await?;
            print_json(&results)?;
        }
    }

    Ok(())
}

/// Progress logging plus Ctrl-C handling that stops at the next batch boundary
fn run_control() -> RunControl {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            let _ = cancel_tx.send(true);
        }
    });

    RunControl::new()
        .with_cancel(cancel_rx)
        .with_progress(log_progress)
}

fn log_progress(update: &ProgressUpdate) {
    info!(
        batch = update.current_batch,
        total_batches = update.total_batches,
        processed = update.processed,
        total = update.total,
        successful = update.successful,
        skipped = update.skipped,
        failed = update.failed,
        eta_ms = update.estimated_remaining_ms,
        "Progress {}%",
        update.percentage
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_recreate() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "embedding-sync",
            "recreate",
            "--reason",
            "new model",
            "--products",
            &id.to_string(),
            "--pacing",
            "standard",
            "--no-validate-after",
        ])
        .unwrap();

        match cli.command {
            Commands::Recreate {
                reason,
                products,
                pacing,
                no_validate_before,
                no_validate_after,
                ..
            } => {
                assert_eq!(reason, "new model");
                assert_eq!(products, Some(vec![id]));
                assert_eq!(pacing, Pacing::Standard);
                assert!(!no_validate_before);
                assert!(no_validate_after);
            }
            _ => panic!("expected recreate"),
        }
    }

    #[test]
    fn test_parse_init_targets() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let cli = Cli::try_parse_from([
            "embedding-sync",
            "init",
            "--batch-size",
            "5",
            "--products",
            &format!("{a},{b}"),
        ])
        .unwrap();

        match cli.command {
            Commands::Init {
                batch_size,
                products,
                force,
                ..
            } => {
                assert_eq!(batch_size, Some(5));
                assert_eq!(products, Some(vec![a, b]));
                assert!(!force);
            }
            _ => panic!("expected init"),
        }
    }

    #[test]
    fn test_search_default_limit() {
        let cli = Cli::try_parse_from(["embedding-sync", "search", "red shoes"]).unwrap();
        assert!(matches!(cli.command, Commands::Search { limit: 10, .. }));
    }
}
