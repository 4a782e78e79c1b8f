//! Command-line argument parsing for EOG Fetcher
//!
//! Defines the CLI with clap derive macros: synchronization, scan-only,
//! authentication management and cache operations.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;

/// EOG Fetcher - mirror the EOG VIIRS nighttime light archive
#[derive(Parser, Debug)]
#[command(
    name = "eog_fetcher",
    version,
    about = "Download the EOG VIIRS monthly nighttime light archive",
    long_about = "Crawls the Earth Observation Group monthly nighttime light archive and mirrors the
average radiance and cloud-free coverage rasters locally. Downloads run concurrently, resume
partial files, refresh the login when it expires and retry failures in further rounds."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl the archive and download every missing file
    Sync(SyncArgs),

    /// Crawl the archive without downloading
    Scan(ScanArgs),

    /// Manage authentication credentials
    Auth(AuthArgs),

    /// Inspect or clear the discovery cache
    Cache(CacheArgs),
}

/// Arguments for the sync command
#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Scan root URL (defaults to the monthly archive)
    #[arg(long, value_name = "URL")]
    pub root: Option<String>,

    /// Local directory mirroring the archive
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Number of concurrent download workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Maximum number of download rounds
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Attempts per file within one round
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Ignore the discovery cache and crawl again
    #[arg(long)]
    pub rescan: bool,

    /// Dry run - show what would be downloaded without downloading
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the scan command
#[derive(Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Scan root URL (defaults to the monthly archive)
    #[arg(long, value_name = "URL")]
    pub root: Option<String>,

    /// Ignore the discovery cache and crawl again
    #[arg(long)]
    pub rescan: bool,

    /// Print only the number of files found
    #[arg(long)]
    pub count: bool,
}

/// Arguments for authentication management
#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub action: AuthAction,
}

/// Authentication actions
#[derive(Subcommand, Debug)]
pub enum AuthAction {
    /// Set up EOG authentication credentials
    Setup,

    /// Verify current credentials
    Verify,

    /// Show authentication status
    Status,
}

/// Arguments for cache management
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cached scan roots
    Info,

    /// Forget cached scans
    Clear {
        /// Only forget this scan root
        #[arg(long, value_name = "URL")]
        root: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}

impl SyncArgs {
    /// Reject values clap cannot check on its own
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("Number of workers must be greater than 0".to_string());
        }
        if self.max_rounds == Some(0) {
            return Err("Max rounds must be greater than 0".to_string());
        }
        if self.max_attempts == Some(0) {
            return Err("Max attempts must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Overlay command-line values on the loaded configuration
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(root) = &self.root {
            config.crawl.root_url = root.clone();
        }
        if let Some(output) = &self.output {
            config.download.output_root = output.clone();
        }
        if let Some(workers) = self.workers {
            config.download.worker_count = workers;
        }
        if let Some(max_rounds) = self.max_rounds {
            config.sync.max_rounds = max_rounds;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.download.max_attempts = max_attempts;
        }
    }
}

impl ScanArgs {
    /// Overlay command-line values on the loaded configuration
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(root) = &self.root {
            config.crawl.root_url = root.clone();
        }
    }
}
