//! The ingest command: scan, persist, enrich.

use anyhow::Context;
use std::path::Path;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use super::Cli;
use crate::config::{self, Config};
use crate::db::{self, CatalogStats};
use crate::pipeline::{Pipeline, RunSummary, parse_worker_count};
use crate::store::ContentStore;

/// Run one ingest as described by the command line.
pub fn cmd_ingest(rt: &Runtime, cli: &Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };
    apply_overrides(&mut config, cli);
    let workers = parse_worker_count(&cli.num_workers);

    println!(
        "Cataloging {} into {} with {} worker(s)",
        cli.input_dir.display(),
        cli.output_dir.display(),
        workers
    );

    let report = rt.block_on(ingest(&config, &cli.input_dir, &cli.output_dir, workers, cli.backlog))?;
    println!("Done: {}", report.run);
    println!("Catalog: {}", report.catalog);
    Ok(())
}

/// Command-line flags win over the config file.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(db) = &cli.db {
        config.database.url = db.clone();
    }
    if cli.enrich {
        config.enrichment.enabled = true;
    }
    if let Some(mode) = cli.mode {
        config.pipeline.mode = mode;
    }
}

/// Outcome of one ingest.
#[derive(Debug, Clone, Copy)]
pub struct IngestReport {
    /// Counters for this run
    pub run: RunSummary,
    /// Catalog totals after the run
    pub catalog: CatalogStats,
}

/// Connect, run the pipeline and clean up scratch space.
///
/// Store and scratch-directory setup failures are fatal; so is a scan root
/// that cannot be opened. Per-file failures only show up in the summary.
pub async fn ingest(
    config: &Config,
    input_dir: &Path,
    output_dir: &Path,
    workers: usize,
    backlog_only: bool,
) -> anyhow::Result<IngestReport> {
    let pool = db::init_db(&config.database.url, &config.database)
        .await
        .with_context(|| format!("Failed to open catalog at {}", config.database.url))?;
    info!(target: "cli", url = %config.database.url, "Catalog connected");

    let store = ContentStore::open(output_dir)
        .with_context(|| format!("Failed to prepare output directory {}", output_dir.display()))?;
    info!(target: "cli", covers = %store.root().display(), "Cover store ready");

    let pipeline = Pipeline::from_config(pool.clone(), store.clone(), workers, config)?;
    let result = if backlog_only {
        pipeline.drain_backlog().await
    } else {
        pipeline.run(input_dir).await
    };

    if let Err(e) = store.remove_scratch() {
        warn!(target: "cli", dir = %store.temp_dir().display(), error = %e, "Failed to remove scratch directory");
    }

    let stats = db::catalog_stats(&pool).await;
    pool.close().await;

    let run = result.with_context(|| format!("Ingest of {} failed", input_dir.display()))?;
    let catalog = stats.context("Failed to read catalog totals")?;
    Ok(IngestReport { run, catalog })
}
