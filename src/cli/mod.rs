//! Command-line interface for music-catalog.
//!
//! Parses the positional arguments and overrides, then runs one ingest over
//! the input directory.

mod commands;

pub use commands::{Cli, run_command};
