//! Authentication management for EOG credentials
//!
//! Interactive setup, verification and storage of the account used to log in
//! to the EOG identity provider.
//!
//! # Examples
//!
//! ```rust,no_run
//! use eog_fetcher::app::{ClientConfig, SessionConfig};
//! use eog_fetcher::auth::{check_credentials, setup_credentials};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! if !check_credentials() {
//!     setup_credentials(SessionConfig::eog()?, ClientConfig::default()).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod credentials;

// Re-export main public API
pub use credentials::{
    check_credentials, get_auth_status, prompt_credentials, resolve_credentials,
    save_credentials, save_credentials_to, setup_credentials, show_auth_status,
    verify_credentials, AuthStatus,
};
