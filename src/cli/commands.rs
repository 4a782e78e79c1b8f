//! Command handlers for EOG Fetcher CLI
//!
//! Each handler loads the configuration, overlays command-line values and
//! wires the session, crawler, worker pool and coordinator together.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::coordinator::{format_bytes, format_download_rate};
use crate::app::crawler::normalize_root;
use crate::app::{
    CacheStore, Coordinator, Crawler, HtmlDirectoryLister, RemoteEntry, SessionManager,
    SignalHandler, SyncReport, WorkerPool,
};
use crate::auth::{resolve_credentials, setup_credentials, show_auth_status, verify_credentials};
use crate::cli::{
    AuthAction, AuthArgs, CacheAction, CacheArgs, ProgressConfig, ProgressDisplay, ScanArgs,
    SyncArgs,
};
use crate::config::{AppConfig, RuntimeConfig};
use crate::errors::{AppError, Result};

/// Handle the sync command
///
/// Returns the process exit code: 0 when every file is present locally, 2
/// when some files are still failing after the last round.
pub async fn handle_sync(config_path: Option<PathBuf>, args: SyncArgs, quiet: bool) -> Result<i32> {
    let start_time = Instant::now();
    args.validate().map_err(AppError::generic)?;

    let mut config = load_config(config_path).await?;
    args.apply_to(&mut config);
    let runtime = config.to_runtime_config()?;
    info!(
        "Syncing {} into {} with {} workers",
        runtime.root_url,
        runtime.coordinator.output_root.display(),
        runtime.worker.worker_count
    );

    let session = Arc::new(connect_session(&runtime)?);
    let entries = scan_with_spinner(&runtime, Arc::clone(&session), args.rescan, quiet).await?;
    let files = entries.iter().filter(|entry| entry.is_file()).count();
    info!("{} files listed under {}", files, runtime.root_url);

    if args.dry_run {
        print_dry_run(&entries, &runtime.coordinator.output_root);
        return Ok(0);
    }

    let (signals, shutdown_rx) = SignalHandler::new();
    let signal_task = signals.setup();

    let (progress_tx, progress_rx) = mpsc::channel(runtime.worker.progress_buffer_size);
    let display = ProgressDisplay::new(ProgressConfig {
        enable_progress_bars: !quiet,
        ..Default::default()
    })
    .spawn(files, runtime.worker.worker_count, progress_rx);

    let pool = WorkerPool::new(runtime.worker.clone(), session)?
        .with_progress(progress_tx)
        .with_shutdown(shutdown_rx);
    let coordinator = Coordinator::new(runtime.coordinator.clone(), pool)?;
    let result = coordinator.sync_all(entries).await;

    drop(coordinator);
    if let Err(e) = display.await {
        debug!("Progress display task failed: {}", e);
    }
    signal_task.abort();

    let report = result?;
    print_report(&report);
    info!("Sync command finished in {:?}", start_time.elapsed());
    Ok(report.exit_code())
}

/// Handle the scan command
pub async fn handle_scan(config_path: Option<PathBuf>, args: ScanArgs, quiet: bool) -> Result<()> {
    let mut config = load_config(config_path).await?;
    args.apply_to(&mut config);
    let runtime = config.to_runtime_config()?;

    let session = Arc::new(connect_session(&runtime)?);
    let entries = scan_with_spinner(&runtime, session, args.rescan, quiet).await?;
    let files: Vec<&RemoteEntry> = entries.iter().filter(|entry| entry.is_file()).collect();

    if args.count {
        println!("{}", files.len());
        return Ok(());
    }

    for entry in &files {
        println!("{}", entry.relative_path);
    }
    println!();
    println!("{} files under {}", files.len(), runtime.root_url);
    Ok(())
}

/// Handle authentication commands
pub async fn handle_auth(config_path: Option<PathBuf>, args: AuthArgs) -> Result<()> {
    let runtime = load_config(config_path).await?.to_runtime_config()?;

    match args.action {
        AuthAction::Setup => setup_credentials(runtime.session, runtime.client).await?,
        AuthAction::Status => show_auth_status(runtime.session, runtime.client).await?,
        AuthAction::Verify => {
            if !verify_credentials(runtime.session, runtime.client).await? {
                return Err(AppError::generic("EOG rejected the configured credentials"));
            }
        }
    }
    Ok(())
}

/// Handle cache commands
pub async fn handle_cache(config_path: Option<PathBuf>, args: CacheArgs) -> Result<()> {
    let runtime = load_config(config_path).await?.to_runtime_config()?;
    let cache = CacheStore::new(runtime.cache_file);

    match args.action {
        CacheAction::Info => {
            let info = cache.info().await?;
            println!("Cache file: {}", info.path.display());
            let Some(size) = info.size_bytes else {
                println!("No scans cached yet.");
                return Ok(());
            };
            println!("Size: {}", format_bytes(size));
            println!();
            for root in &info.roots {
                println!("{}", root.root);
                println!(
                    "  discovered {}, {} files ({} known)",
                    root.discovered_at.format("%Y-%m-%d %H:%M UTC"),
                    root.files,
                    format_bytes(root.known_bytes)
                );
            }
            println!();
            println!("Total: {} files in {} roots", info.total_files(), info.roots.len());
        }
        CacheAction::Clear { root: Some(root) } => {
            let root = parse_root(&root)?;
            if cache.remove(&root).await? {
                println!("Forgot cached scan of {}", root);
            } else {
                println!("No cached scan of {}", root);
            }
        }
        CacheAction::Clear { root: None } => {
            cache.clear().await?;
            println!("Cache cleared.");
        }
    }
    Ok(())
}

async fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig> {
    if config_path.is_none() {
        if let Some(created) = AppConfig::initialize_first_run().await? {
            println!("Created default configuration file:");
            println!("   {}", created.display());
            println!();
        }
    }
    Ok(AppConfig::load(config_path).await?)
}

/// Session manager that logs in on first use
fn connect_session(runtime: &RuntimeConfig) -> Result<SessionManager> {
    let credentials = resolve_credentials()?;
    Ok(SessionManager::new(
        runtime.session.clone(),
        credentials,
        runtime.client.clone(),
    )?)
}

async fn scan_with_spinner(
    runtime: &RuntimeConfig,
    session: Arc<SessionManager>,
    rescan: bool,
    quiet: bool,
) -> Result<Vec<RemoteEntry>> {
    let crawler = Crawler::new(
        Arc::new(HtmlDirectoryLister::new(session)),
        Arc::new(CacheStore::new(runtime.cache_file.clone())),
        runtime.filter.clone(),
        runtime.crawl.clone(),
    );

    let spinner = if quiet || !atty::is(atty::Stream::Stderr) {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style.tick_strings(&["◐", "◓", "◑", "◒", "●"]));
    }
    spinner.set_message(format!("Scanning {}", runtime.root_url));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = if rescan {
        crawler.rescan(&runtime.root_url).await
    } else {
        crawler.scan(&runtime.root_url).await
    };
    spinner.finish_and_clear();
    Ok(result?)
}

fn parse_root(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| AppError::generic(format!("Invalid root URL {}: {}", raw, e)))?;
    Ok(normalize_root(url))
}

/// Local state of a crawled file before a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalState {
    Missing,
    /// Present, but only a request can tell whether it is complete
    Unverified,
    Complete,
}

fn local_state(entry: &RemoteEntry, output_root: &Path) -> LocalState {
    match (std::fs::metadata(entry.local_path(output_root)), entry.size) {
        (Err(_), _) => LocalState::Missing,
        (Ok(metadata), Some(size)) if metadata.len() == size => LocalState::Complete,
        (Ok(_), Some(_)) => LocalState::Missing,
        (Ok(_), None) => LocalState::Unverified,
    }
}

fn print_dry_run(entries: &[RemoteEntry], output_root: &Path) {
    let mut missing = 0;
    let mut unverified = 0;
    for entry in entries.iter().filter(|entry| entry.is_file()) {
        let path = entry.local_path(output_root);
        match local_state(entry, output_root) {
            LocalState::Missing => {
                missing += 1;
                println!("would download {} -> {}", entry.url, path.display());
            }
            LocalState::Unverified => {
                unverified += 1;
                println!("would check {} -> {}", entry.url, path.display());
            }
            LocalState::Complete => {}
        }
    }
    println!();
    println!(
        "Dry run: {} files would be downloaded, {} local files would be checked against the server",
        missing, unverified
    );
}

fn print_report(report: &SyncReport) {
    println!();
    println!(
        "Synchronized {}/{} files in {} round(s): {} in {:.1?} ({})",
        report.files_succeeded,
        report.files_total,
        report.rounds_executed,
        format_bytes(report.bytes_transferred),
        report.duration,
        format_download_rate(report.download_rate_bps())
    );

    if report.cancelled {
        println!("Interrupted; run the command again to resume.");
    }

    if report.all_succeeded {
        return;
    }

    warn!("{} files still failing", report.permanently_failed.len());
    println!();
    println!("Files that could not be downloaded:");
    for failed in &report.permanently_failed {
        println!(
            "  {} [{}] {}",
            failed.entry.relative_path, failed.error_kind, failed.message
        );
    }
    if report.suggests_rescan() {
        println!();
        println!("Some remote files changed since the last scan; try again with --rescan.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, size: Option<u64>) -> RemoteEntry {
        let url = Url::parse("https://eogdata.mines.edu/nighttime_light/monthly_notile/")
            .unwrap()
            .join(name)
            .unwrap();
        RemoteEntry::file(url, name, size)
    }

    #[test]
    fn test_local_state() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("full.tif.gz"), b"0123").unwrap();
        std::fs::write(temp_dir.path().join("partial.tif.gz"), b"01").unwrap();

        let root = temp_dir.path();
        assert_eq!(local_state(&entry("absent.tif.gz", None), root), LocalState::Missing);
        assert_eq!(local_state(&entry("full.tif.gz", Some(4)), root), LocalState::Complete);
        assert_eq!(local_state(&entry("partial.tif.gz", Some(4)), root), LocalState::Missing);
        // Crawled entries carry no size
        assert_eq!(local_state(&entry("partial.tif.gz", None), root), LocalState::Unverified);
    }
}
