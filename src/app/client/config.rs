//! HTTP client configuration and building logic
//!
//! This module handles the configuration and construction of the HTTP client
//! shared by the login flow, the crawler and the download workers.

use std::time::Duration;

use reqwest::Client;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};

use crate::constants::{http, limits};
use crate::errors::{AuthError, AuthResult};

/// Configuration for the HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// TCP keep-alive settings
    #[serde(with = "humantime_serde")]
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    #[serde(with = "humantime_serde")]
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
    /// Timeout for listing pages and login requests
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Maximum wait for one body chunk of a file download
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Redirects followed before giving up
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            read_timeout: http::READ_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_redirects: http::MAX_REDIRECTS,
        }
    }
}

impl ClientConfig {
    /// Builds a fresh HTTP client with its own cookie jar
    ///
    /// No overall timeout is set; pages use `request_timeout` per request and
    /// downloads bound each chunk read with `read_timeout`.
    pub fn build_http_client(&self) -> AuthResult<Client> {
        let mut client_builder = Client::builder()
            .cookie_store(true)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .redirect(Policy::limited(self.max_redirects))
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(AuthError::Http)
    }

    /// Validate the configuration
    pub fn validate(&self) -> AuthResult<()> {
        if self.rate_limit_rps == 0 {
            return Err(AuthError::InvalidConfiguration {
                reason: "rate_limit_rps must be greater than 0".to_string(),
            });
        }
        if self.read_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(AuthError::InvalidConfiguration {
                reason: "timeouts must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
