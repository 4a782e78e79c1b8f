//! EOG Fetcher Library
//!
//! Mirrors the Earth Observation Group VIIRS monthly nighttime light archive:
//! an authenticated session that re-logs in on expiry, a cached crawler that
//! selects the average radiance and cloud-free coverage rasters, a resumable
//! concurrent download engine and a round-based retry controller.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
