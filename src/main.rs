//! EOG Fetcher CLI application
//!
//! Command-line interface for mirroring the EOG VIIRS monthly nighttime light
//! archive. Exits with 0 on success, 2 when some files could not be
//! downloaded and 1 on fatal errors.

use std::process;

use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use eog_fetcher::cli::{handle_auth, handle_cache, handle_scan, handle_sync, Cli, Commands};
use eog_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Fatal {} error: {}", e.category(), e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Main application logic; returns the process exit code
async fn run() -> Result<i32> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(&cli);

    info!("EOG Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    let config = cli.global.config.clone();
    let quiet = cli.global.quiet;
    match cli.command {
        Commands::Sync(args) => {
            info!("Executing sync command");
            handle_sync(config, args, quiet).await
        }
        Commands::Scan(args) => {
            info!("Executing scan command");
            handle_scan(config, args, quiet).await.map(|()| 0)
        }
        Commands::Auth(args) => {
            info!("Executing auth command");
            handle_auth(config, args).await.map(|()| 0)
        }
        Commands::Cache(args) => {
            info!("Executing cache command");
            handle_cache(config, args).await.map(|()| 0)
        }
    }
}

/// Initialize logging based on CLI verbosity settings
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("eog_fetcher={}", log_level).parse() {
        filter = filter.add_directive(directive);
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose) // Show levels only in very verbose mode
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
