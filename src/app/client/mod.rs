//! HTTP client implementation for EOG archive interaction
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `auth`: Keycloak login flows (password grant, browser fallback)
//! - `http`: process-wide rate limiting and response header helpers
//! - `session`: session ownership, failure detection and re-authentication

pub mod auth;
pub mod config;
pub mod http;
pub mod session;

pub use auth::{AuthHandler, LoginForm};
pub use config::ClientConfig;
pub use http::{parse_complete_length, reported_size};
pub use session::{Credentials, Session, SessionConfig, SessionManager};
