//! EOG authentication logic
//!
//! This module handles the two Keycloak login flows the EOG portal accepts:
//! an OAuth2 password grant that yields a bearer token, and a simulated
//! browser login that leaves the session cookies in the client's jar. Login is
//! retried with exponential backoff when the identity provider cannot be
//! reached; rejected credentials fail immediately.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use super::session::{Credentials, SessionConfig};
use crate::constants::auth;
use crate::errors::{AuthError, AuthResult};

/// Token endpoint answer of a successful password grant
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Login form scraped from the Keycloak authorization page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    /// Where the credentials are posted
    pub action: Url,
    /// Hidden inputs that must be echoed back
    pub hidden_fields: Vec<(String, String)>,
}

/// Handles EOG authentication operations
pub struct AuthHandler;

impl AuthHandler {
    /// Logs in on `client`, retrying transport failures with backoff
    ///
    /// Returns the bearer token when the password grant succeeded, or `None`
    /// when the browser flow authenticated the client through cookies.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::LoginFailed` as soon as the credentials are
    /// rejected, and `AuthError::RetriesExhausted` when the identity provider
    /// stayed unreachable for `max_login_attempts` attempts.
    pub async fn authenticate(
        client: &Client,
        config: &SessionConfig,
        credentials: &Credentials,
    ) -> AuthResult<Option<String>> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(config.login_backoff_base)
            .with_max_interval(config.login_backoff_cap)
            .with_max_elapsed_time(None)
            .build();

        let max_attempts = config.max_login_attempts.max(1);
        let mut attempt = 0u32;

        backoff::future::retry_notify(
            policy,
            || {
                attempt += 1;
                let current = attempt;
                async move {
                    match Self::login_once(client, config, credentials).await {
                        Ok(token) => Ok(token),
                        Err(e) if e.is_transient() && current < max_attempts => {
                            Err(backoff::Error::transient(e))
                        }
                        Err(e) if e.is_transient() => {
                            Err(backoff::Error::permanent(AuthError::RetriesExhausted {
                                attempts: current,
                                last_error: e.to_string(),
                            }))
                        }
                        Err(e) => Err(backoff::Error::permanent(e)),
                    }
                }
            },
            |e: AuthError, delay: Duration| {
                tracing::warn!("Login attempt failed: {}. Retrying in {:?}", e, delay);
            },
        )
        .await
    }

    /// Single login attempt: password grant, then browser flow for public clients
    async fn login_once(
        client: &Client,
        config: &SessionConfig,
        credentials: &Credentials,
    ) -> AuthResult<Option<String>> {
        tracing::info!("Starting EOG authentication for user: {}", credentials.username);

        match Self::password_grant(client, config, credentials).await {
            Ok(token) => {
                tracing::info!("Password grant succeeded");
                Ok(Some(token))
            }
            Err(AuthError::LoginFailed { reason }) if credentials.client_secret.is_none() => {
                tracing::info!(
                    "Password grant rejected ({}), falling back to browser login",
                    reason
                );
                Self::browser_flow(client, config, credentials).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Requests a token with `grant_type=password`
    async fn password_grant(
        client: &Client,
        config: &SessionConfig,
        credentials: &Credentials,
    ) -> AuthResult<String> {
        tracing::debug!("Requesting token from {}", config.token_url);

        let mut form = vec![
            ("client_id", config.client_id.as_str()),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("grant_type", "password"),
        ];
        if let Some(secret) = credentials.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = client
            .post(config.token_url.clone())
            .timeout(config.request_timeout)
            .form(&form)
            .send()
            .await
            .map_err(AuthError::Http)?;

        let status = response.status();
        if status.is_server_error() {
            if let Err(e) = response.error_for_status_ref() {
                return Err(AuthError::Http(e));
            }
        }

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::LoginFailed {
                reason: format!("token endpoint returned {}: {}", status, body.trim()),
            });
        }

        let token: TokenResponse = response.json().await.map_err(AuthError::Http)?;
        token
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::TokenMissing)
    }

    /// Simulates the interactive Keycloak login
    async fn browser_flow(
        client: &Client,
        config: &SessionConfig,
        credentials: &Credentials,
    ) -> AuthResult<()> {
        let state = fastrand::u64(..).to_string();
        tracing::info!("Fetching login page: {}", config.authorize_url);

        let response = client
            .get(config.authorize_url.clone())
            .timeout(config.request_timeout)
            .query(&[
                ("response_type", "code"),
                ("client_id", config.client_id.as_str()),
                ("redirect_uri", config.redirect_uri.as_str()),
                ("scope", auth::BROWSER_FLOW_SCOPE),
                ("state", state.as_str()),
            ])
            .send()
            .await
            .map_err(AuthError::Http)?;

        let response = Self::reject_unsuccessful(response, "authorization endpoint")?;
        let page_url = response.url().clone();
        let page = response.text().await.map_err(AuthError::Http)?;

        let Some(form) = parse_login_form(&page, &page_url) else {
            tracing::info!("Could not find login form. Checking if already authenticated...");
            return Self::verify_authentication(client, config).await;
        };
        tracing::debug!("Form action URL: {}", form.action);

        let mut fields = vec![
            ("username".to_string(), credentials.username.clone()),
            ("password".to_string(), credentials.password.clone()),
            ("credentialId".to_string(), String::new()),
        ];
        fields.extend(form.hidden_fields);

        let login_response = client
            .post(form.action)
            .timeout(config.request_timeout)
            .form(&fields)
            .send()
            .await
            .map_err(AuthError::Http)?;

        let login_response = Self::reject_unsuccessful(login_response, "login form")?;
        let body = login_response.text().await.map_err(AuthError::Http)?;
        if let Some(reason) = detect_login_error(&body) {
            tracing::warn!(
                "EOG login failed for user {}: {}",
                credentials.username,
                reason
            );
            return Err(AuthError::LoginFailed { reason });
        }

        Self::verify_authentication(client, config).await
    }

    /// Verifies authentication by fetching the protected archive root
    async fn verify_authentication(client: &Client, config: &SessionConfig) -> AuthResult<()> {
        tracing::info!("Testing authentication against {}", config.base_url);
        let response = client
            .get(config.base_url.clone())
            .timeout(config.request_timeout)
            .send()
            .await
            .map_err(AuthError::Http)?;

        let status = response.status();
        if status == StatusCode::OK && !config.is_auth_url(response.url()) {
            tracing::info!("Authentication verified");
            return Ok(());
        }

        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            if let Err(e) = response.error_for_status() {
                return Err(AuthError::Http(e));
            }
        }

        Err(AuthError::LoginFailed {
            reason: format!("authentication verification failed with status {}", status),
        })
    }

    /// Turns 5xx into a transient error and other failures into a rejection
    fn reject_unsuccessful(
        response: reqwest::Response,
        stage: &str,
    ) -> AuthResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.is_server_error() {
            if let Err(e) = response.error_for_status_ref() {
                return Err(AuthError::Http(e));
            }
        }
        Err(AuthError::LoginFailed {
            reason: format!("{} returned {}", stage, status),
        })
    }
}

/// Extracts the Keycloak login form from an authorization page
pub fn parse_login_form(html: &str, page_url: &Url) -> Option<LoginForm> {
    let document = Html::parse_document(html);
    let form_selector = Selector::parse(auth::LOGIN_FORM_SELECTOR).ok()?;
    let hidden_selector = Selector::parse("input[type=hidden]").ok()?;

    let form = document.select(&form_selector).next()?;
    let action = form
        .value()
        .attr("action")
        .filter(|action| !action.trim().is_empty())
        .and_then(|action| page_url.join(action.trim()).ok())
        .unwrap_or_else(|| page_url.clone());

    let hidden_fields = form
        .select(&hidden_selector)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or("");
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    Some(LoginForm {
        action,
        hidden_fields,
    })
}

/// Returns the Keycloak error message when the page reports a rejected login
pub fn detect_login_error(html: &str) -> Option<String> {
    if !auth::LOGIN_ERROR_MARKERS
        .iter()
        .any(|marker| html.contains(marker))
    {
        return None;
    }

    let document = Html::parse_document(html);
    let message = Selector::parse(auth::LOGIN_ERROR_SELECTOR)
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|element| element.text().collect::<String>().trim().to_string())
        })
        .filter(|text| !text.is_empty());

    Some(message.unwrap_or_else(|| "credentials rejected by identity provider".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://eogauth-new.mines.edu/realms/eog/protocol/openid-connect/auth?client_id=x")
            .unwrap()
    }

    #[test]
    fn test_login_form_extraction() {
        let html = r#"
            <html>
                <form id="kc-form-login" action="/realms/eog/login-actions/authenticate?session_code=abc" method="post">
                    <input type="text" name="username">
                    <input type="password" name="password">
                    <input type="hidden" name="rememberMe" value="on">
                    <input type="hidden" name="tab_id" value="t-1">
                </form>
            </html>
        "#;

        let form = parse_login_form(html, &page_url()).unwrap();
        assert_eq!(
            form.action.as_str(),
            "https://eogauth-new.mines.edu/realms/eog/login-actions/authenticate?session_code=abc"
        );
        assert_eq!(
            form.hidden_fields,
            vec![
                ("rememberMe".to_string(), "on".to_string()),
                ("tab_id".to_string(), "t-1".to_string()),
            ]
        );
    }

    #[test]
    fn test_login_form_without_action_posts_to_page() {
        let html = r#"<form id="kc-form-login"><input name="username"></form>"#;
        let form = parse_login_form(html, &page_url()).unwrap();
        assert_eq!(form.action, page_url());
        assert!(form.hidden_fields.is_empty());
    }

    #[test]
    fn test_missing_login_form() {
        // Other forms on the page are not the login form
        let html = r#"<form id="search"><input type="hidden" name="q" value="1"></form>"#;
        assert!(parse_login_form(html, &page_url()).is_none());
    }

    #[test]
    fn test_login_error_detection() {
        let html = r#"
            <div class="pf-c-alert">
                <span class="pf-c-alert__title kc-feedback-text">Invalid username or password.</span>
            </div>
        "#;
        assert_eq!(
            detect_login_error(html).as_deref(),
            Some("Invalid username or password.")
        );

        let marker_only = r#"<div id="kc-feedback-text"></div>"#;
        assert!(detect_login_error(marker_only).is_some());

        assert!(detect_login_error("<html><body>Index of /</body></html>").is_none());
    }
}
