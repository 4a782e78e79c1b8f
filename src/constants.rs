//! Application constants for EOG Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names for authentication
pub mod env {
    /// Environment variable name for the EOG username (e-mail address)
    pub const USERNAME: &str = "EOG_USERNAME";

    /// Environment variable name for the EOG password
    pub const PASSWORD: &str = "EOG_PASSWORD";

    /// Optional client secret for confidential OAuth clients
    pub const CLIENT_SECRET: &str = "EOG_CLIENT_SECRET";
}

/// Authentication and credential-related constants
pub mod auth {
    /// Minimum allowed username length
    pub const MIN_USERNAME_LENGTH: usize = 3;

    /// Maximum allowed username length
    pub const MAX_USERNAME_LENGTH: usize = 254;

    /// File permissions for .env file (Unix only) - owner read/write only
    #[cfg(unix)]
    pub const ENV_FILE_PERMISSIONS: u32 = 0o600;

    /// Keycloak realm endpoint base; responses landing here are login redirects
    pub const EOG_AUTH_BASE_URL: &str =
        "https://eogauth-new.mines.edu/realms/eog/protocol/openid-connect";

    /// OAuth2 token endpoint (password grant)
    pub const EOG_TOKEN_URL: &str =
        "https://eogauth-new.mines.edu/realms/eog/protocol/openid-connect/token";

    /// OAuth2 authorization endpoint (browser flow)
    pub const EOG_AUTHORIZE_URL: &str =
        "https://eogauth-new.mines.edu/realms/eog/protocol/openid-connect/auth";

    /// Public client id used by the EOG data portal
    pub const DEFAULT_CLIENT_ID: &str = "eogdata-new-apache";

    /// Redirect URI registered for the public client
    pub const REDIRECT_URI: &str = "https://eogdata.mines.edu/oauth2callback";

    /// Scope requested by the browser flow
    pub const BROWSER_FLOW_SCOPE: &str = "openid email";

    /// CSS selector for the Keycloak login form
    pub const LOGIN_FORM_SELECTOR: &str = "form#kc-form-login";

    /// CSS selector for the Keycloak error banner
    pub const LOGIN_ERROR_SELECTOR: &str = "span.pf-c-alert__title";

    /// Markers that only appear when Keycloak rejected the submitted credentials
    pub const LOGIN_ERROR_MARKERS: [&str; 2] = ["kc-feedback-text", "pf-c-alert__title"];
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "EOG-Fetcher/0.1.0 (Nighttime Lights Research Tool)";

    /// Timeout for page and login requests
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Maximum wait for a single body chunk while streaming a download
    pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;

    /// Maximum number of redirects to follow (Keycloak bounces a few times)
    pub const MAX_REDIRECTS: usize = 10;
}

/// Rate limiting and retry configuration
pub mod limits {
    use super::Duration;

    /// Default rate limit for EOG requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

    /// Maximum jitter added by the rate limiter
    pub const RATE_LIMIT_JITTER: Duration = Duration::from_millis(100);

    /// Login attempts before a network failure becomes fatal
    pub const MAX_LOGIN_ATTEMPTS: u32 = 5;

    /// Base delay between login attempts
    pub const LOGIN_BACKOFF_BASE: Duration = Duration::from_secs(1);

    /// Cap on the delay between login attempts
    pub const LOGIN_BACKOFF_CAP: Duration = Duration::from_secs(30);

    /// Re-authentications one request may trigger before giving up
    pub const MAX_SESSION_REFRESHES: u32 = 10;

    /// Base delay before re-authenticating after a session failure
    pub const REFRESH_DELAY_BASE: Duration = Duration::from_secs(5);

    /// Cap on the delay before re-authenticating
    pub const REFRESH_DELAY_CAP: Duration = Duration::from_secs(60);
}

/// EOG archive URLs and file naming
pub mod eog {
    /// Root of the monthly (untiled) VIIRS nighttime light archive
    pub const BASE_URL: &str = "https://eogdata.mines.edu/nighttime_light/monthly_notile/";

    /// Compressed GeoTIFF extension of the wanted products
    pub const FILE_EXTENSION: &str = ".tif.gz";

    /// Average radiance product token
    pub const AVERAGE_RADIANCE_TOKEN: &str = "avg_rade9h";

    /// Cloud-free coverage product token
    pub const CLOUD_FREE_COVERAGE_TOKEN: &str = "cf_cvg";

    /// Stray-light corrected configuration folder that is never wanted
    pub const MASKED_CONFIGURATION_DIR: &str = "vcmslcfg";
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Cache document written next to the working directory
    pub const CACHE_FILE_NAME: &str = "eog_files_cache.json";

    /// Default output directory for downloaded rasters
    pub const DEFAULT_OUTPUT_DIR: &str = "./eog_downloads";

    /// Cache document schema version
    pub const CACHE_FORMAT_VERSION: u32 = 1;
}

/// Crawl configuration
pub mod crawl {
    /// Listing fetch retries before a scan is declared incomplete
    pub const MAX_RETRIES: u32 = 5;
}

/// Worker and concurrency configuration
pub mod workers {
    use super::Duration;

    /// Default number of download workers
    pub const DEFAULT_WORKER_COUNT: usize = 4;

    /// Maximum recommended concurrent workers
    pub const MAX_WORKER_COUNT: usize = 32;

    /// Attempts per task within one round
    pub const MAX_ATTEMPTS: u32 = 5;

    /// Base delay for per-task exponential backoff
    pub const BACKOFF_BASE: Duration = Duration::from_secs(2);

    /// Cap on per-task backoff
    pub const BACKOFF_CAP: Duration = Duration::from_secs(60);

    /// Fraction of the delay added as random jitter
    pub const BACKOFF_JITTER: f64 = 0.25;

    /// Channel buffer size for worker progress events
    pub const CHANNEL_BUFFER_SIZE: usize = 256;
}

/// Retry controller configuration
pub mod sync {
    use super::Duration;

    /// Maximum number of download rounds
    pub const MAX_ROUNDS: u32 = 10;

    /// Pause between rounds
    pub const ROUND_DELAY: Duration = Duration::from_secs(5);
}

// Re-export commonly used constants for convenience
pub use auth::{DEFAULT_CLIENT_ID, EOG_AUTH_BASE_URL, EOG_TOKEN_URL};
pub use eog::BASE_URL as EOG_BASE_URL;
pub use env::{PASSWORD as ENV_PASSWORD, USERNAME as ENV_USERNAME};
pub use files::{CACHE_FILE_NAME, TEMP_FILE_SUFFIX};
pub use http::USER_AGENT;
pub use limits::DEFAULT_RATE_LIMIT_RPS;
pub use workers::DEFAULT_WORKER_COUNT;
