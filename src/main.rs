//! Music Catalog - concurrent audio library ingestion.
//!
//! Walks a directory of audio files, records every file in a SQLite catalog,
//! stores each distinct cover image once under a content-addressed path, and
//! links tracks to deduplicated artist and album entries.

pub mod cli;
pub mod config;
pub mod cover;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod hash;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod probe;
pub mod scanner;
pub mod store;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log targets enabled at info unless RUST_LOG says otherwise.
const DEFAULT_LOG_TARGETS: &[&str] = &[
    "music_catalog",
    "cli",
    "db",
    "catalog",
    "store",
    "scanner",
    "probe",
    "cover",
    "enrichment",
    "pipeline",
];

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(
            DEFAULT_LOG_TARGETS
                .iter()
                .map(|t| format!("{t}=info"))
                .collect::<Vec<_>>()
                .join(","),
        )?,
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    cli::run_command(&args)
}
