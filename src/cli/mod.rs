//! Command-line interface components
//!
//! This module contains CLI-specific code for the EOG Fetcher application,
//! including argument parsing, progress display, and command handlers.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{AuthAction, AuthArgs, CacheAction, CacheArgs, Cli, Commands, GlobalArgs, ScanArgs, SyncArgs};
pub use commands::{handle_auth, handle_cache, handle_scan, handle_sync};
pub use progress::{ProgressConfig, ProgressDisplay, ProgressState};
