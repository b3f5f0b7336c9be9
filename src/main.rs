use pricewatch::config::load_config;
use pricewatch::recompute::Recomputer;
use pricewatch::storage::SqliteStorage;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration from file
    let config = match load_config("config.json") {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error: {}", e);
            return;
        }
    };

    let storage = match SqliteStorage::new(&config.db_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to initialize storage: {:?}", e);
            return;
        }
    };

    let recomputer = Recomputer::new(storage, config.max_parallel);

    // An optional CLI argument limits the run to a single region.
    if let Some(region) = std::env::args().nth(1) {
        match recomputer.recompute_region(&region).await {
            Ok(summary) => info!(
                "Region {} done: {} processed, {} skipped",
                summary.region, summary.processed_count, summary.skipped_count
            ),
            Err(e) => error!("Region {} failed: {}", region, e),
        }
        return;
    }

    // Every product write is an independent upsert, so cancelling here only
    // leaves some products un-refreshed.
    let report = tokio::select! {
        result = recomputer.recompute_all(&config.regions) => match result {
            Ok(report) => report,
            Err(e) => {
                error!("Recompute failed: {}", e);
                return;
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Cancelled; already-written records remain valid.");
            return;
        }
    };

    for outcome in &report.per_region {
        if outcome.success {
            info!(
                "Region {}: {} products processed",
                outcome.region, outcome.processed_count
            );
        } else {
            warn!(
                "Region {} failed: {}",
                outcome.region,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    info!("Total products processed: {}", report.total_processed);
}
