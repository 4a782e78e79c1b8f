//! Authenticated session lifecycle
//!
//! [`SessionManager`] owns the one authenticated identity of the process. Every
//! other component reaches the network through [`SessionManager::get`] and
//! [`SessionManager::get_page`], which detect expired sessions and refresh
//! them transparently.
//!
//! A session is never patched: re-authentication builds a new HTTP client
//! (fresh cookie jar and connection pool), logs in, and publishes it under a
//! higher generation number. Callers that saw the old generation fail at the
//! same time all wait on the refresh mutex and then share the outcome of the
//! single login: the new session, or the error it ended with.

use std::env;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::RANGE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use super::auth::AuthHandler;
use super::config::ClientConfig;
use super::http::{content_range_total, HttpHandler};
use crate::app::backoff::BackoffPolicy;
use crate::constants::{auth, env as env_constants, eog, http, limits};
use crate::errors::{AuthError, AuthResult, DownloadError, DownloadResult};

/// Login credentials
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Only set for confidential OAuth clients
    pub client_secret: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            client_secret: None,
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Reads `EOG_USERNAME`, `EOG_PASSWORD` and the optional `EOG_CLIENT_SECRET`
    pub fn from_env() -> AuthResult<Self> {
        let username = env::var(env_constants::USERNAME)?;
        let password = env::var(env_constants::PASSWORD)?;
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let client_secret = env::var(env_constants::CLIENT_SECRET)
            .ok()
            .filter(|secret| !secret.is_empty());
        Ok(Self {
            username,
            password,
            client_secret,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Endpoints and retry budgets of the session manager
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Protected archive root, fetched to verify a browser login
    pub base_url: Url,
    /// Identity provider prefix; responses landing here are login redirects
    pub auth_base: Url,
    pub token_url: Url,
    pub authorize_url: Url,
    pub redirect_uri: String,
    pub client_id: String,
    /// Timeout for login requests
    pub request_timeout: Duration,
    /// Login attempts before an unreachable identity provider becomes fatal
    pub max_login_attempts: u32,
    pub login_backoff_base: Duration,
    pub login_backoff_cap: Duration,
    /// Re-authentications a single request may trigger
    pub max_session_refreshes: u32,
    /// Pause before each re-authentication
    pub refresh_backoff: BackoffPolicy,
}

impl SessionConfig {
    /// Builds a configuration whose token and authorization endpoints live under `auth_base`
    pub fn new(base_url: Url, auth_base: Url) -> AuthResult<Self> {
        let mut auth_base = auth_base;
        if !auth_base.path().ends_with('/') {
            let path = format!("{}/", auth_base.path());
            auth_base.set_path(&path);
        }

        let join = |segment: &str| {
            auth_base
                .join(segment)
                .map_err(|e| AuthError::InvalidConfiguration {
                    reason: format!("invalid auth endpoint {}: {}", segment, e),
                })
        };
        let token_url = join("token")?;
        let authorize_url = join("auth")?;

        Ok(Self {
            base_url,
            token_url,
            authorize_url,
            auth_base,
            redirect_uri: auth::REDIRECT_URI.to_string(),
            client_id: auth::DEFAULT_CLIENT_ID.to_string(),
            request_timeout: http::DEFAULT_TIMEOUT,
            max_login_attempts: limits::MAX_LOGIN_ATTEMPTS,
            login_backoff_base: limits::LOGIN_BACKOFF_BASE,
            login_backoff_cap: limits::LOGIN_BACKOFF_CAP,
            max_session_refreshes: limits::MAX_SESSION_REFRESHES,
            refresh_backoff: BackoffPolicy::new(
                limits::REFRESH_DELAY_BASE,
                limits::REFRESH_DELAY_CAP,
                0.2,
            ),
        })
    }

    /// Configuration for the public EOG portal
    pub fn eog() -> AuthResult<Self> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| AuthError::InvalidConfiguration {
                reason: format!("invalid URL {}: {}", raw, e),
            })
        };
        Self::new(parse(eog::BASE_URL)?, parse(auth::EOG_AUTH_BASE_URL)?)
    }

    /// Whether `url` points into the identity provider
    pub fn is_auth_url(&self, url: &Url) -> bool {
        let prefix = self.auth_base.as_str().trim_end_matches('/');
        url.as_str().starts_with(prefix)
    }
}

/// One authenticated identity
#[derive(Debug)]
pub struct Session {
    client: Client,
    bearer: Option<String>,
    generation: u64,
    /// Login attempts concluded when this session was published
    epoch: u64,
}

impl Session {
    /// Monotonically increasing identifier of this login
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the login produced a bearer token (as opposed to cookies only)
    pub fn has_bearer(&self) -> bool {
        self.bearer.is_some()
    }

    fn get(&self, url: &Url) -> RequestBuilder {
        let request = self.client.get(url.clone());
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Outcome of the latest login attempt, guarded by the refresh mutex
#[derive(Debug, Default)]
struct RefreshState {
    /// Concluded login attempts, successful or not
    epoch: u64,
    /// Message of the latest attempt if it failed
    failure: Option<String>,
}

impl RefreshState {
    /// Error for a caller that queued behind a login that failed
    fn shared_failure(&self, seen_epoch: u64) -> Option<AuthError> {
        if self.epoch <= seen_epoch {
            return None;
        }
        self.failure
            .as_ref()
            .map(|reason| AuthError::RefreshFailed {
                reason: reason.clone(),
            })
    }
}

/// Owner of the authenticated session
#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    credentials: Credentials,
    client_config: ClientConfig,
    http: HttpHandler,
    current: RwLock<Option<Arc<Session>>>,
    refresh: Mutex<RefreshState>,
    /// Mirror of `RefreshState::epoch` readable without the mutex
    epoch: AtomicU64,
    next_generation: AtomicU64,
    logins: AtomicU64,
}

impl SessionManager {
    /// Creates a manager that logs in lazily on first use
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidConfiguration` if the client configuration is invalid
    pub fn new(
        config: SessionConfig,
        credentials: Credentials,
        client_config: ClientConfig,
    ) -> AuthResult<Self> {
        client_config.validate()?;
        let http = HttpHandler::new(client_config.rate_limit_rps)?;
        Ok(Self {
            config,
            credentials,
            client_config,
            http,
            current: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
            epoch: AtomicU64::new(0),
            next_generation: AtomicU64::new(1),
            logins: AtomicU64::new(0),
        })
    }

    /// Creates a manager and logs in immediately
    pub async fn connect(
        config: SessionConfig,
        credentials: Credentials,
        client_config: ClientConfig,
    ) -> AuthResult<Self> {
        let manager = Self::new(config, credentials, client_config)?;
        manager.acquire().await?;
        Ok(manager)
    }

    /// Current session, logging in first if there is none yet
    ///
    /// Callers that queued behind a first login which failed receive
    /// `AuthError::RefreshFailed` instead of trying again.
    pub async fn acquire(&self) -> AuthResult<Arc<Session>> {
        if let Some(session) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(session));
        }

        let seen_epoch = self.epoch.load(Ordering::SeqCst);
        let mut state = self.refresh.lock().await;
        if let Some(session) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(session));
        }
        if let Some(error) = state.shared_failure(seen_epoch) {
            return Err(error);
        }
        self.login(&mut state).await
    }

    /// Replaces `stale` with a freshly authenticated session
    ///
    /// If another caller already logged in after `stale` was published, the
    /// outcome of that login is returned: its session, or
    /// `AuthError::RefreshFailed` when it failed.
    pub async fn reauthenticate(&self, stale: &Session) -> AuthResult<Arc<Session>> {
        let mut state = self.refresh.lock().await;
        if let Some(session) = self.current.read().await.as_ref() {
            if session.generation > stale.generation {
                tracing::debug!(
                    "Session already refreshed to generation {}",
                    session.generation
                );
                return Ok(Arc::clone(session));
            }
        }
        if let Some(error) = state.shared_failure(stale.epoch) {
            tracing::debug!("Concurrent re-authentication failed, not retrying");
            return Err(error);
        }

        tracing::info!(
            "Re-authenticating (replacing session generation {})",
            stale.generation
        );
        self.login(&mut state).await
    }

    /// Whether `response` shows that the session is no longer accepted
    pub fn is_auth_failure(&self, response: &Response) -> bool {
        matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::SERVICE_UNAVAILABLE
        ) || self.config.is_auth_url(response.url())
    }

    /// Authenticated GET for file downloads, optionally resuming at `range_start`
    ///
    /// Session failures are refreshed transparently up to
    /// `max_session_refreshes` times. No overall timeout is applied; the
    /// caller bounds body reads.
    ///
    /// # Errors
    ///
    /// - `DownloadError::Transient` for transport failures and 5xx answers
    /// - `DownloadError::RangeNotSatisfiable` for 416
    /// - `DownloadError::HttpStatus` for any other non-success status
    /// - `DownloadError::SessionExpired` when the refresh budget ran out
    /// - `DownloadError::Auth` when re-authentication itself failed
    pub async fn get(&self, url: &Url, range_start: Option<u64>) -> DownloadResult<Response> {
        self.send(url, range_start.filter(|start| *start > 0), None)
            .await
    }

    /// Authenticated GET of an HTML page, bounded by the request timeout
    pub async fn get_page(&self, url: &Url) -> DownloadResult<String> {
        let response = self
            .send(url, None, Some(self.client_config.request_timeout))
            .await?;
        let text = response
            .text()
            .await
            .map_err(|e| DownloadError::transient(url.as_str(), e))?;
        tracing::debug!("Fetched page {} ({} bytes)", url, text.len());
        Ok(text)
    }

    /// Number of logins performed so far
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::SeqCst)
    }

    /// Per-chunk read timeout for streamed downloads
    pub fn read_timeout(&self) -> Duration {
        self.client_config.read_timeout
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn send(
        &self,
        url: &Url,
        range_start: Option<u64>,
        timeout: Option<Duration>,
    ) -> DownloadResult<Response> {
        let mut session = self.acquire().await?;
        let mut refreshes = 0u32;
        let mut rng = fastrand::Rng::new();

        loop {
            self.http.throttle().await;

            let mut request = session.get(url);
            if let Some(start) = range_start {
                request = request.header(RANGE, format!("bytes={}-", start));
            }
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            let response = request
                .send()
                .await
                .map_err(|e| DownloadError::transient(url.as_str(), e))?;

            if self.is_auth_failure(&response) {
                let status = response.status().as_u16();
                if refreshes >= self.config.max_session_refreshes {
                    tracing::error!(
                        "Session still rejected for {} after {} re-authentications",
                        url,
                        refreshes
                    );
                    return Err(DownloadError::SessionExpired {
                        url: url.to_string(),
                        status,
                        refreshes,
                    });
                }

                refreshes += 1;
                let delay = self.config.refresh_backoff.delay(refreshes, &mut rng);
                tracing::warn!(
                    "Session failure (HTTP {}) for {}. Re-authenticating in {:?} ({}/{})",
                    status,
                    url,
                    delay,
                    refreshes,
                    self.config.max_session_refreshes
                );
                tokio::time::sleep(delay).await;
                session = self.reauthenticate(&session).await?;
                continue;
            }

            let status = response.status();
            if status == StatusCode::RANGE_NOT_SATISFIABLE {
                return Err(DownloadError::RangeNotSatisfiable {
                    url: url.to_string(),
                    total: content_range_total(&response),
                });
            }
            if status.is_server_error() {
                return Err(DownloadError::Transient {
                    url: url.to_string(),
                    reason: format!("server returned {}", status),
                });
            }
            if !status.is_success() {
                return Err(DownloadError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            tracing::debug!("GET {} -> {}", url, status);
            return Ok(response);
        }
    }

    /// Logs in on a brand-new client and publishes the outcome in `state`
    async fn login(&self, state: &mut RefreshState) -> AuthResult<Arc<Session>> {
        let outcome = self.authenticate().await;
        state.epoch += 1;
        self.epoch.store(state.epoch, Ordering::SeqCst);

        let (client, bearer) = match outcome {
            Ok(login) => login,
            Err(e) => {
                tracing::error!("Login failed: {}", e);
                state.failure = Some(e.to_string());
                return Err(e);
            }
        };
        state.failure = None;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.logins.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session {
            client,
            bearer,
            generation,
            epoch: state.epoch,
        });

        *self.current.write().await = Some(Arc::clone(&session));
        tracing::info!("Authenticated session generation {}", generation);
        Ok(session)
    }

    async fn authenticate(&self) -> AuthResult<(Client, Option<String>)> {
        let client = self.client_config.build_http_client()?;
        self.http.throttle().await;
        let bearer = AuthHandler::authenticate(&client, &self.config, &self.credentials).await?;
        Ok((client, bearer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_endpoints() {
        let config = SessionConfig::eog().unwrap();
        assert_eq!(config.token_url.as_str(), auth::EOG_TOKEN_URL);
        assert_eq!(config.authorize_url.as_str(), auth::EOG_AUTHORIZE_URL);
        assert_eq!(config.max_session_refreshes, 10);
    }

    #[test]
    fn test_auth_url_detection() {
        let config = SessionConfig::eog().unwrap();
        let login = Url::parse(
            "https://eogauth-new.mines.edu/realms/eog/protocol/openid-connect/auth?client_id=x",
        )
        .unwrap();
        let data = Url::parse("https://eogdata.mines.edu/nighttime_light/monthly_notile/").unwrap();
        assert!(config.is_auth_url(&login));
        assert!(!config.is_auth_url(&data));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let credentials = Credentials::new("user@example.org", "hunter2").with_client_secret("s3");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("user@example.org"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3\""));
    }

    #[test]
    fn test_refresh_failure_shared_only_with_earlier_waiters() {
        let mut state = RefreshState::default();
        assert!(state.shared_failure(0).is_none());

        state.epoch = 2;
        state.failure = Some("EOG login failed: bad password".to_string());
        assert!(state.shared_failure(2).is_none());
        match state.shared_failure(1) {
            Some(AuthError::RefreshFailed { reason }) => assert!(reason.contains("bad password")),
            other => panic!("expected shared failure, got {:?}", other),
        }

        state.failure = None;
        assert!(state.shared_failure(1).is_none());
    }

    #[tokio::test]
    async fn test_manager_is_lazy() {
        let manager = SessionManager::new(
            SessionConfig::eog().unwrap(),
            Credentials::new("user@example.org", "pw"),
            ClientConfig::default(),
        )
        .unwrap();
        assert_eq!(manager.login_count(), 0);
    }
}
