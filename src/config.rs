//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-catalog\config.toml
//! - macOS: ~/Library/Application Support/music-catalog/config.toml
//! - Linux: ~/.config/music-catalog/config.toml
//!
//! Every field has a default, so a partial (or missing) file is fine.
//! Command-line flags override what is loaded here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog store settings
    pub database: DatabaseConfig,

    /// Scan/enrich pipeline settings
    pub pipeline: PipelineConfig,

    /// External tool settings
    pub tools: ToolsConfig,

    /// Artist enrichment settings
    pub enrichment: EnrichmentConfig,
}

/// Catalog store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,

    /// Pool size shared by the persist consumer and all workers
    pub max_connections: u32,

    /// How long a writer waits on a locked database before failing
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:music_catalog.db".to_string(),
            max_connections: 8,
            busy_timeout_secs: 30,
        }
    }
}

/// How scanning and enrichment are sequenced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Persist each scanned file and hand it straight to the workers
    #[default]
    Streaming,
    /// Persist the whole scan, then enqueue pending records from the catalog
    TwoPhase,
}

impl std::str::FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "streaming" => Ok(PipelineMode::Streaming),
            "two_phase" | "two-phase" => Ok(PipelineMode::TwoPhase),
            other => Err(format!("unknown pipeline mode: {}", other)),
        }
    }
}

/// Scan/enrich pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: PipelineMode,

    /// Capacity of the scanner -> persist channel
    pub scan_buffer: usize,

    /// Capacity of the task queue (defaults to the worker count)
    pub queue_capacity: Option<usize>,

    /// Page size used by the enqueue pass
    pub enqueue_page_size: u32,

    /// Attempts per find-or-create before giving up on a task
    pub upsert_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Streaming,
            scan_buffer: 100,
            queue_capacity: None,
            enqueue_page_size: 256,
            upsert_attempts: 5,
        }
    }
}

/// Where cover art is taken from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverSource {
    /// metaflac for FLAC, ffmpeg for everything else
    #[default]
    Tools,
    /// Read the embedded picture directly from the tags
    Embedded,
}

/// External tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffprobe: String,
    pub ffmpeg: String,
    pub metaflac: String,

    /// Run the probe tool on every scanned file
    pub probe: bool,

    pub cover_source: CoverSource,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe: "ffprobe".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            metaflac: "metaflac".to_string(),
            probe: true,
            cover_source: CoverSource::Tools,
        }
    }
}

/// Artist enrichment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Look artists up on MusicBrainz while resolving them
    pub enabled: bool,

    /// MusicBrainz web service root
    pub base_url: String,

    /// Minimum delay between requests (MusicBrainz allows ~1 req/sec)
    pub min_interval_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            min_interval_ms: 1100,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-catalog"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from an explicit path
///
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
