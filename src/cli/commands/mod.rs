//! CLI argument definitions and dispatch.
//!
//! The ingest itself lives in [`ingest`]; this module only parses the
//! arguments and sets up the runtime.

mod ingest;

use clap::Parser;
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::PipelineMode;

pub use ingest::cmd_ingest;

/// Scan a music directory, catalog every audio file and store its cover art
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to scan for audio files
    pub input_dir: PathBuf,

    /// Directory for stored cover art (scratch space lives in <output_dir>/temp)
    pub output_dir: PathBuf,

    /// Number of enrichment workers (clamped to 1..=64, invalid values mean 1)
    pub num_workers: String,

    /// Database URL (overrides the config file)
    #[arg(long, env = "MUSIC_CATALOG_DB")]
    pub db: Option<String>,

    /// Path to a config file (default: the OS config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Look artists up on MusicBrainz
    #[arg(long)]
    pub enrich: bool,

    /// Pipeline mode: streaming or two_phase
    #[arg(long)]
    pub mode: Option<PipelineMode>,

    /// Skip the scan and only enrich records left pending by earlier runs
    #[arg(long)]
    pub backlog: bool,
}

/// Run the command described by the parsed arguments.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    cmd_ingest(&rt, cli)
}
