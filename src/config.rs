//! Configuration management for EOG Fetcher
//!
//! Settings come from a TOML file with one section per component. Every key
//! is optional; missing keys fall back to the built-in defaults. Durations are
//! written in humantime form (`"15s"`, `"1m"`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::app::{
    BackoffPolicy, ClientConfig, CoordinatorConfig, CrawlConfig, EntryFilter, SessionConfig,
    WorkerConfig,
};
use crate::constants::{auth, crawl, eog, files, http, limits, sync, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Name of the project-local configuration file
pub const LOCAL_CONFIG_FILE: &str = "eog-fetcher.toml";

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP client settings
    pub client: ClientSection,
    /// Login and re-authentication settings
    pub session: SessionSection,
    /// Archive crawl settings
    pub crawl: CrawlSection,
    /// Download engine settings
    pub download: DownloadSection,
    /// Retry controller settings
    pub sync: SyncSection,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// `[client]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout for listing pages and login requests
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum wait for one body chunk
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    pub rate_limit_rps: u32,
    pub pool_max_per_host: usize,
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Option<Duration>,
    pub max_redirects: usize,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            connect_timeout: http::CONNECT_TIMEOUT,
            request_timeout: http::DEFAULT_TIMEOUT,
            read_timeout: http::READ_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            tcp_keepalive: Some(Duration::from_secs(30)),
            max_redirects: http::MAX_REDIRECTS,
        }
    }
}

/// `[session]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// OpenID Connect prefix holding the `token` and `auth` endpoints
    pub auth_base: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub max_login_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub login_backoff_base: Duration,
    #[serde(with = "humantime_serde")]
    pub login_backoff_cap: Duration,
    /// Re-authentications a single request may trigger
    pub max_session_refreshes: u32,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            auth_base: auth::EOG_AUTH_BASE_URL.to_string(),
            client_id: auth::DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: auth::REDIRECT_URI.to_string(),
            max_login_attempts: limits::MAX_LOGIN_ATTEMPTS,
            login_backoff_base: limits::LOGIN_BACKOFF_BASE,
            login_backoff_cap: limits::LOGIN_BACKOFF_CAP,
            max_session_refreshes: limits::MAX_SESSION_REFRESHES,
        }
    }
}

/// `[crawl]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSection {
    /// Scan root
    pub root_url: String,
    /// Location of the discovery cache
    pub cache_file: PathBuf,
    /// Listing retries before the scan is abandoned
    pub max_retries: u32,
    pub excluded_directories: Vec<String>,
    pub file_extension: String,
    pub product_tokens: Vec<String>,
}

impl Default for CrawlSection {
    fn default() -> Self {
        let filter = EntryFilter::default();
        Self {
            root_url: eog::BASE_URL.to_string(),
            cache_file: PathBuf::from(files::CACHE_FILE_NAME),
            max_retries: crawl::MAX_RETRIES,
            excluded_directories: filter.excluded_directories,
            file_extension: filter.file_extension,
            product_tokens: filter.product_tokens,
        }
    }
}

/// `[download]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    pub worker_count: usize,
    /// Attempts per file within one round
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,
    #[serde(with = "humantime_serde")]
    pub backoff_cap: Duration,
    /// Random extra delay as a fraction of the backoff
    pub backoff_jitter: f64,
    pub output_root: PathBuf,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            max_attempts: workers::MAX_ATTEMPTS,
            backoff_base: workers::BACKOFF_BASE,
            backoff_cap: workers::BACKOFF_CAP,
            backoff_jitter: workers::BACKOFF_JITTER,
            output_root: PathBuf::from(files::DEFAULT_OUTPUT_DIR),
        }
    }
}

/// `[sync]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub max_rounds: u32,
    #[serde(with = "humantime_serde")]
    pub round_delay: Duration,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            max_rounds: sync::MAX_ROUNDS,
            round_delay: sync::ROUND_DELAY,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when no verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Everything the components need, built from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub root_url: Url,
    pub cache_file: PathBuf,
    pub client: ClientConfig,
    pub session: SessionConfig,
    pub crawl: CrawlConfig,
    pub filter: EntryFilter,
    pub worker: WorkerConfig,
    pub coordinator: CoordinatorConfig,
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> ConfigResult<RuntimeConfig> {
        let root_url = parse_url("crawl.root_url", &self.crawl.root_url)?;
        let auth_base = parse_url("session.auth_base", &self.session.auth_base)?;

        let client = self.client.to_runtime_config();
        client
            .validate()
            .map_err(|e| invalid("client", "", e.to_string()))?;

        let mut session = SessionConfig::new(root_url.clone(), auth_base)
            .map_err(|e| invalid("session.auth_base", &self.session.auth_base, e.to_string()))?;
        session.client_id = self.session.client_id.clone();
        session.redirect_uri = self.session.redirect_uri.clone();
        session.request_timeout = self.client.request_timeout;
        session.max_login_attempts = self.session.max_login_attempts.max(1);
        session.login_backoff_base = self.session.login_backoff_base;
        session.login_backoff_cap = self.session.login_backoff_cap;
        session.max_session_refreshes = self.session.max_session_refreshes;

        let backoff = BackoffPolicy::new(
            self.download.backoff_base,
            self.download.backoff_cap,
            self.download.backoff_jitter,
        );
        let worker = WorkerConfig {
            worker_count: self.download.worker_count,
            max_attempts: self.download.max_attempts,
            backoff: backoff.clone(),
            progress_buffer_size: workers::CHANNEL_BUFFER_SIZE,
        };
        worker.validate().map_err(|e| {
            invalid(
                "download",
                &self.download.worker_count.to_string(),
                e.to_string(),
            )
        })?;

        let coordinator = CoordinatorConfig {
            output_root: self.download.output_root.clone(),
            max_rounds: self.sync.max_rounds,
            round_delay: self.sync.round_delay,
            worker_count: self.download.worker_count,
        };
        coordinator
            .validate()
            .map_err(|e| invalid("sync.max_rounds", &self.sync.max_rounds.to_string(), e.to_string()))?;

        Ok(RuntimeConfig {
            root_url,
            cache_file: self.crawl.cache_file.clone(),
            client,
            session,
            crawl: CrawlConfig {
                max_retries: self.crawl.max_retries,
                backoff,
            },
            filter: EntryFilter {
                excluded_directories: self.crawl.excluded_directories.clone(),
                file_extension: self.crawl.file_extension.clone(),
                product_tokens: self.crawl.product_tokens.clone(),
            },
            worker,
            coordinator,
        })
    }

    /// Load configuration from `config_file_override` or the first file found
    /// in the standard locations, falling back to defaults
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Writes a commented default configuration if none exists yet
    ///
    /// Returns the path of the created file.
    pub async fn initialize_first_run() -> ConfigResult<Option<PathBuf>> {
        if Self::find_config_file().is_some() {
            return Ok(None);
        }
        let Some(config_path) = Self::default_config_path() else {
            return Ok(None);
        };

        info!("Creating default configuration file...");
        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&config_path, Self::generate_default_config_content())
            .await
            .map_err(|source| ConfigError::Io {
                path: config_path.clone(),
                source,
            })?;

        Ok(Some(config_path))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(".").join(LOCAL_CONFIG_FILE)];
        search_paths.extend(Self::default_config_path());

        let found = search_paths.into_iter().find(|path| path.exists());
        if let Some(path) = &found {
            debug!("Found config file: {}", path.display());
        }
        found
    }

    /// Get the default config file path for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("eog-fetcher").join("config.toml"))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Generate default configuration content with comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# EOG Fetcher Configuration
# Every key is optional; remove a line to use the built-in default.
# Durations use humantime syntax, e.g. "500ms", "15s", "2m".

[client]
connect_timeout = "15s"
# Timeout for listing pages and login requests
request_timeout = "1m"
# Maximum wait for one chunk of a file body
read_timeout = "1m"
rate_limit_rps = {rps}
pool_max_per_host = {pool}
tcp_keepalive = "30s"
max_redirects = {redirects}

[session]
auth_base = "{auth_base}"
client_id = "{client_id}"
redirect_uri = "{redirect_uri}"
max_login_attempts = {login_attempts}
login_backoff_base = "1s"
login_backoff_cap = "30s"
# Re-authentications a single request may trigger
max_session_refreshes = {refreshes}

[crawl]
root_url = "{root_url}"
cache_file = "{cache_file}"
max_retries = {crawl_retries}
excluded_directories = ["{excluded}"]
file_extension = "{extension}"
product_tokens = ["{avg}", "{cvg}"]

[download]
worker_count = {worker_count}
# Attempts per file within one round
max_attempts = {max_attempts}
backoff_base = "2s"
backoff_cap = "1m"
backoff_jitter = {jitter}
output_root = "{output_root}"

[sync]
max_rounds = {max_rounds}
round_delay = "5s"

[logging]
level = "info"  # error, warn, info, debug, trace
"#,
            rps = limits::DEFAULT_RATE_LIMIT_RPS,
            pool = http::POOL_MAX_PER_HOST,
            redirects = http::MAX_REDIRECTS,
            auth_base = auth::EOG_AUTH_BASE_URL,
            client_id = auth::DEFAULT_CLIENT_ID,
            redirect_uri = auth::REDIRECT_URI,
            login_attempts = limits::MAX_LOGIN_ATTEMPTS,
            refreshes = limits::MAX_SESSION_REFRESHES,
            root_url = eog::BASE_URL,
            cache_file = files::CACHE_FILE_NAME,
            crawl_retries = crawl::MAX_RETRIES,
            excluded = eog::MASKED_CONFIGURATION_DIR,
            extension = eog::FILE_EXTENSION,
            avg = eog::AVERAGE_RADIANCE_TOKEN,
            cvg = eog::CLOUD_FREE_COVERAGE_TOKEN,
            worker_count = workers::DEFAULT_WORKER_COUNT,
            max_attempts = workers::MAX_ATTEMPTS,
            jitter = workers::BACKOFF_JITTER,
            output_root = files::DEFAULT_OUTPUT_DIR,
            max_rounds = sync::MAX_ROUNDS,
        )
    }
}

impl ClientSection {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            tcp_keepalive: self.tcp_keepalive,
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            rate_limit_rps: self.rate_limit_rps,
            max_redirects: self.max_redirects,
            ..ClientConfig::default()
        }
    }
}

fn parse_url(field: &str, raw: &str) -> ConfigResult<Url> {
    Url::parse(raw).map_err(|e| invalid(field, raw, e.to_string()))
}

fn invalid(field: &str, value: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason,
    }
}
