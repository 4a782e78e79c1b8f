//! Shared fixtures for the integration tests
//!
//! Every test runs against a wiremock server laid out like the EOG portal:
//! the archive under `/archive/` and the identity provider under
//! `/realms/eog/protocol/openid-connect/`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eog_fetcher::app::{
    BackoffPolicy, ClientConfig, Credentials, RemoteEntry, SessionConfig, SessionManager,
    WorkerConfig,
};
use eog_fetcher::app::worker::WorkerConfigBuilder;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const AUTH_PREFIX: &str = "/realms/eog/protocol/openid-connect";
pub const TOKEN_PATH: &str = "/realms/eog/protocol/openid-connect/token";
pub const AUTHORIZE_PATH: &str = "/realms/eog/protocol/openid-connect/auth";

pub fn archive_root(server: &MockServer) -> Url {
    Url::parse(&format!("{}/archive/", server.uri())).unwrap()
}

pub fn archive_url(server: &MockServer, relative: &str) -> Url {
    archive_root(server).join(relative).unwrap()
}

/// Session configuration pointing at the mock server with fast retries
pub fn session_config(server: &MockServer) -> SessionConfig {
    let auth_base = Url::parse(&format!("{}{}", server.uri(), AUTH_PREFIX)).unwrap();
    let mut config = SessionConfig::new(archive_root(server), auth_base).unwrap();
    config.request_timeout = Duration::from_secs(5);
    config.max_login_attempts = 2;
    config.login_backoff_base = Duration::from_millis(10);
    config.login_backoff_cap = Duration::from_millis(20);
    config.refresh_backoff = BackoffPolicy::new(
        Duration::from_millis(20),
        Duration::from_millis(50),
        0.0,
    );
    config
}

pub fn client_config() -> ClientConfig {
    ClientConfig {
        rate_limit_rps: 1000,
        read_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("researcher@example.org", "correct-horse")
}

pub fn session_manager(server: &MockServer) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(session_config(server), credentials(), client_config()).unwrap())
}

pub fn worker_config(worker_count: usize, max_attempts: u32) -> WorkerConfig {
    WorkerConfigBuilder::new()
        .worker_count(worker_count)
        .max_attempts(max_attempts)
        .backoff(Duration::from_millis(5), Duration::from_millis(20))
        .backoff_jitter(0.0)
        .build()
        .unwrap()
}

/// File entry with the given body length as its known size
pub fn file_entry(server: &MockServer, relative: &str, size: Option<u64>) -> RemoteEntry {
    RemoteEntry::file(archive_url(server, relative), relative, size)
}

/// Token endpoint that hands out `tok1`, `tok2`, ... and counts logins
pub struct TokenResponder {
    pub issued: Arc<AtomicUsize>,
}

impl Respond for TokenResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": format!("tok{}", n),
            "token_type": "Bearer",
            "expires_in": 300,
        }))
    }
}

/// Mounts a password-grant token endpoint and returns its login counter
pub async fn mount_token_endpoint(server: &MockServer) -> Arc<AtomicUsize> {
    let issued = Arc::new(AtomicUsize::new(0));
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(TokenResponder {
            issued: Arc::clone(&issued),
        })
        .mount(server)
        .await;
    issued
}

/// Apache-style index page linking `children`
pub fn index_page(children: &[&str]) -> String {
    let mut html = String::from(
        "<html><head><title>Index</title></head><body><h1>Index</h1><table>\
         <tr><th><a href=\"?C=N;O=D\">Name</a></th><th><a href=\"?C=M;O=A\">Last modified</a></th></tr>\
         <tr><td><a href=\"../\">Parent Directory</a></td></tr>",
    );
    for child in children {
        html.push_str(&format!("<tr><td><a href=\"{0}\">{0}</a></td></tr>", child));
    }
    html.push_str("</table></body></html>");
    html
}
