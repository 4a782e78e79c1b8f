//! Error types for EOG Fetcher
//!
//! This module defines the error types for all components of the application.
//! Per-task failures are classified into an [`ErrorKind`] so that they can be
//! recorded on the task and reported after the final round, while only
//! authentication and incomplete crawls are allowed to abort a whole run.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a task failure, recorded on the task and in the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum ErrorKind {
    /// Credentials rejected or the login flow is broken
    Auth,
    /// Timeout, connection reset or a server-side 5xx
    TransientNetwork,
    /// 401/403/503 kept coming back after repeated re-authentication
    SessionExpired,
    /// Local file size disagrees with the remote size
    Integrity,
    /// Directory listing could not be fetched
    CrawlIncomplete,
    /// Any other non-success HTTP status
    HttpStatus(u16),
    /// Local filesystem failure
    Io,
    /// Configuration could not produce a request
    InvalidRequest,
    /// Task was never dispatched because the run was cancelled
    Cancelled,
    /// The worker holding the task ended without reporting it
    Aborted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Auth => write!(f, "auth"),
            ErrorKind::TransientNetwork => write!(f, "transient-network"),
            ErrorKind::SessionExpired => write!(f, "session-expired"),
            ErrorKind::Integrity => write!(f, "integrity"),
            ErrorKind::CrawlIncomplete => write!(f, "crawl-incomplete"),
            ErrorKind::HttpStatus(status) => write!(f, "http-{}", status),
            ErrorKind::Io => write!(f, "io"),
            ErrorKind::InvalidRequest => write!(f, "invalid-request"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Aborted => write!(f, "aborted"),
        }
    }
}

/// Authentication-related errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing environment variables for credentials
    #[error(
        "Missing EOG credentials. Set EOG_USERNAME and EOG_PASSWORD environment variables or run 'auth setup'"
    )]
    MissingCredentials,

    /// Environment variable error
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// HTTP request failed during authentication
    #[error("HTTP request failed during authentication: {0}")]
    Http(#[from] reqwest::Error),

    /// Login rejected by the identity provider
    #[error("EOG login failed: {reason}")]
    LoginFailed { reason: String },

    /// Token endpoint answered 200 without an access token
    #[error("Token response did not contain an access token")]
    TokenMissing,

    /// Login kept failing at the network level
    #[error("Login failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// A concurrent re-authentication this caller was waiting on failed
    #[error("Re-authentication failed: {reason}")]
    RefreshFailed { reason: String },

    /// Invalid username format
    #[error("Invalid username format: {reason}")]
    InvalidUsername { reason: String },

    /// Invalid client configuration (endpoints, rate limit)
    #[error("Invalid authentication configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// File I/O error during credential storage
    #[error("Failed to save credentials to file")]
    CredentialStorage(#[from] std::io::Error),
}

impl AuthError {
    /// Whether a new login attempt could succeed without user intervention
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Http(_))
    }
}

/// Download and HTTP request errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Timeout, connection reset or 5xx answer
    #[error("Transient network failure for {url}: {reason}")]
    Transient { url: String, reason: String },

    /// Session failure that survived the refresh budget
    #[error("Session expired for {url} (HTTP {status}) after {refreshes} re-authentications")]
    SessionExpired {
        url: String,
        status: u16,
        refreshes: u32,
    },

    /// Server answered 416 to a range request
    #[error("Range not satisfiable for {url} (complete length: {total:?})")]
    RangeNotSatisfiable { url: String, total: Option<u64> },

    /// Server returned a non-success status that is not worth retrying in-round
    #[error("Server returned HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// File size mismatch
    #[error("File size mismatch for {path}. Expected: {expected} bytes, got: {actual} bytes")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// I/O error during file operations
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fatal authentication failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Invalid worker configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Run cancelled before the task was dispatched
    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Build a transient error from a reqwest failure
    pub fn transient(url: impl Into<String>, error: impl fmt::Display) -> Self {
        Self::Transient {
            url: url.into(),
            reason: error.to_string(),
        }
    }

    /// Classify this error for task bookkeeping
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Transient { .. } => ErrorKind::TransientNetwork,
            DownloadError::SessionExpired { .. } => ErrorKind::SessionExpired,
            DownloadError::RangeNotSatisfiable { .. } => ErrorKind::HttpStatus(416),
            DownloadError::HttpStatus { status, .. } => ErrorKind::HttpStatus(*status),
            DownloadError::SizeMismatch { .. } => ErrorKind::Integrity,
            DownloadError::Io(_) => ErrorKind::Io,
            DownloadError::Auth(_) => ErrorKind::Auth,
            DownloadError::ConfigurationError(_) => ErrorKind::InvalidRequest,
            DownloadError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the same request may succeed if repeated after a delay
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadError::Transient { .. })
    }
}

/// Directory crawl errors
#[derive(Error, Debug)]
pub enum CrawlError {
    /// A listing could not be fetched within the retry budget
    #[error("Crawl incomplete: listing {url} failed after {attempts} attempts: {source}")]
    Incomplete {
        url: String,
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },

    /// Fatal authentication failure during the crawl
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Cache store failure
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Cache store errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// I/O failure reading or writing the cache document
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cache document could not be (de)serialized
    #[error("Cache document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Cache document written by an unknown schema
    #[error("Unsupported cache format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Atomic replacement failed
    #[error("Atomic write of {path} failed: {reason}")]
    AtomicWriteFailed { path: PathBuf, reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Config file could not be read or written
    #[error("Configuration I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Authentication error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Crawl error
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(e) => e.is_retryable(),
            AppError::Auth(e) => e.is_transient(),
            AppError::Crawl(CrawlError::Incomplete { .. }) => true,
            _ => false,
        }
    }

    /// Whether this error must abort the whole synchronization run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Auth(_)
                | AppError::Download(DownloadError::Auth(_))
                | AppError::Crawl(CrawlError::Incomplete { .. })
                | AppError::Crawl(CrawlError::Auth(_))
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "authentication",
            AppError::Download(_) => "download",
            AppError::Crawl(_) => "crawl",
            AppError::Cache(_) => "cache",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Authentication result type alias
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Crawl result type alias
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_kinds() {
        let transient = DownloadError::transient("https://x/a", "connection reset");
        assert_eq!(transient.kind(), ErrorKind::TransientNetwork);
        assert!(transient.is_retryable());

        let mismatch = DownloadError::SizeMismatch {
            path: PathBuf::from("a.tif.gz"),
            expected: 10,
            actual: 7,
        };
        assert_eq!(mismatch.kind(), ErrorKind::Integrity);
        assert!(!mismatch.is_retryable());

        let missing = DownloadError::HttpStatus {
            url: "https://x/a".to_string(),
            status: 404,
        };
        assert_eq!(missing.kind(), ErrorKind::HttpStatus(404));
    }

    #[test]
    fn test_fatal_classification() {
        let auth = AppError::Auth(AuthError::LoginFailed {
            reason: "invalid_grant".to_string(),
        });
        assert!(auth.is_fatal());
        assert_eq!(auth.category(), "authentication");
        assert!(!auth.is_recoverable());

        let crawl = AppError::Crawl(CrawlError::Incomplete {
            url: "https://x/2012/".to_string(),
            attempts: 5,
            source: Box::new(DownloadError::transient("https://x/2012/", "timeout")),
        });
        assert!(crawl.is_fatal());

        let download = AppError::Download(DownloadError::transient("https://x/a", "reset"));
        assert!(!download.is_fatal());
        assert!(download.is_recoverable());
    }

    #[test]
    fn test_error_kind_display_and_serde() {
        assert_eq!(ErrorKind::HttpStatus(404).to_string(), "http-404");
        assert_eq!(ErrorKind::TransientNetwork.to_string(), "transient-network");

        let json = serde_json::to_string(&ErrorKind::HttpStatus(410)).unwrap();
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorKind::HttpStatus(410));
    }
}
