//! Login flows and session refresh against a mock identity provider

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use eog_fetcher::app::SessionManager;
use eog_fetcher::errors::{AuthError, DownloadError};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use common::*;

/// Issues one token, then behaves like an identity provider that went down
struct SingleTokenResponder {
    hits: Arc<AtomicUsize>,
}

impl Respond for SingleTokenResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.hits.fetch_add(1, Ordering::SeqCst) == 0 {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "tok1"}))
        } else {
            ResponseTemplate::new(502)
        }
    }
}

#[tokio::test]
async fn test_password_grant_sends_bearer_token() {
    let server = MockServer::start().await;
    let logins = mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/archive/2012/a.avg_rade9h.tif.gz"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"raster".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_manager(&server);
    let response = session
        .get(&archive_url(&server, "2012/a.avg_rade9h.tif.gz"), None)
        .await
        .unwrap();

    assert_eq!(response.bytes().await.unwrap().as_ref(), b"raster");
    assert_eq!(logins.load(Ordering::SeqCst), 1);
    assert_eq!(session.login_count(), 1);
    assert!(session.acquire().await.unwrap().has_bearer());
}

#[tokio::test]
async fn test_password_grant_posts_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=researcher%40example.org"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "abc"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = SessionManager::connect(session_config(&server), credentials(), client_config())
        .await
        .unwrap();
    assert_eq!(session.login_count(), 1);
}

#[tokio::test]
async fn test_browser_flow_fallback() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"error":"unauthorized_client","error_description":"Client not allowed for direct access grants"}"#,
        ))
        .mount(&server)
        .await;

    let login_page = r#"<html><body>
        <form id="kc-form-login" action="/realms/eog/login-actions/authenticate?session_code=abc" method="post">
            <input type="text" name="username">
            <input type="password" name="password">
            <input type="hidden" name="tab_id" value="t-42">
        </form>
    </body></html>"#;
    Mock::given(method("GET"))
        .and(path(AUTHORIZE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(login_page))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/realms/eog/login-actions/authenticate"))
        .and(body_string_contains("tab_id=t-42"))
        .and(body_string_contains("password=correct-horse"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "KEYCLOAK_SESSION=s1; Path=/")
                .set_body_string("<html><body>Welcome</body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/archive/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_page(&[])))
        .mount(&server)
        .await;

    let session = SessionManager::connect(session_config(&server), credentials(), client_config())
        .await
        .unwrap();

    let current = session.acquire().await.unwrap();
    assert!(!current.has_bearer());
    assert_eq!(session.login_count(), 1);
}

#[tokio::test]
async fn test_rejected_password_grant_with_client_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(AUTHORIZE_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let credentials = credentials().with_client_secret("confidential");
    let result = SessionManager::connect(session_config(&server), credentials, client_config()).await;

    assert!(matches!(result, Err(AuthError::LoginFailed { .. })));
}

#[tokio::test]
async fn test_browser_flow_reports_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(AUTHORIZE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form id="kc-form-login" action="/realms/eog/login-actions/authenticate"></form>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/realms/eog/login-actions/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<div class="pf-c-alert"><span class="pf-c-alert__title kc-feedback-text">Invalid username or password.</span></div>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let result = SessionManager::connect(session_config(&server), credentials(), client_config()).await;

    match result {
        Err(AuthError::LoginFailed { reason }) => {
            assert!(reason.contains("Invalid username or password"));
        }
        other => panic!("expected rejected login, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_unreachable_identity_provider_exhausts_login_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let result = SessionManager::connect(session_config(&server), credentials(), client_config()).await;

    match result {
        Err(AuthError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected exhausted retries, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_concurrent_expiry_triggers_single_refresh() {
    let server = MockServer::start().await;
    let logins = mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/archive/shared.tif.gz"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/archive/shared.tif.gz"))
        .and(header("authorization", "Bearer tok2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&server)
        .await;

    let session = session_manager(&server);
    let url = archive_url(&server, "shared.tif.gz");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = Arc::clone(&session);
            let url = url.clone();
            tokio::spawn(async move { session.get(&url, None).await.map(|r| r.status().as_u16()) })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 200);
    }

    // One initial login plus exactly one refresh
    assert_eq!(logins.load(Ordering::SeqCst), 2);
    assert_eq!(session.login_count(), 2);
    assert_eq!(session.acquire().await.unwrap().generation(), 2);
}

#[tokio::test]
async fn test_concurrent_expiry_shares_failed_refresh() {
    let server = MockServer::start().await;
    let token_hits = Arc::new(AtomicUsize::new(0));
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(SingleTokenResponder {
            hits: Arc::clone(&token_hits),
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/archive/locked.tif.gz"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let session = session_manager(&server);
    let url = archive_url(&server, "locked.tif.gz");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let session = Arc::clone(&session);
            let url = url.clone();
            tokio::spawn(async move { session.get(&url, None).await.map(|_| ()) })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(DownloadError::Auth(_))));
    }

    // Initial login plus one refresh using both of its attempts
    assert_eq!(token_hits.load(Ordering::SeqCst), 3);
    assert_eq!(session.login_count(), 1);
}

#[tokio::test]
async fn test_redirect_to_login_page_counts_as_expiry() {
    let server = MockServer::start().await;
    let logins = mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/archive/2013/"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}{}", server.uri(), AUTHORIZE_PATH).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(AUTHORIZE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/archive/2013/"))
        .and(header("authorization", "Bearer tok2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_page(&["01/"])))
        .mount(&server)
        .await;

    let session = session_manager(&server);
    let page = session.get_page(&archive_url(&server, "2013/")).await.unwrap();

    assert!(page.contains("01/"));
    assert_eq!(logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_refresh_budget_exhausted() {
    let server = MockServer::start().await;
    let logins = Arc::new(AtomicUsize::new(0));
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(TokenResponder {
            issued: Arc::clone(&logins),
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/archive/forbidden.tif.gz"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let mut config = session_config(&server);
    config.max_session_refreshes = 2;
    let session = SessionManager::new(config, credentials(), client_config()).unwrap();

    let result = session
        .get(&archive_url(&server, "forbidden.tif.gz"), None)
        .await;

    match result {
        Err(DownloadError::SessionExpired {
            status, refreshes, ..
        }) => {
            assert_eq!(status, 403);
            assert_eq!(refreshes, 2);
        }
        other => panic!("expected expired session, got {:?}", other.map(|_| ())),
    }
    assert_eq!(logins.load(Ordering::SeqCst), 3);
}
