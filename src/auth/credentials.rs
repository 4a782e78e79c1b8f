//! Credential management for EOG authentication
//!
//! Credentials live in `EOG_USERNAME` / `EOG_PASSWORD`, usually loaded from a
//! `.env` file in the working directory. The file is written with owner-only
//! permissions.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use tracing::debug;

use crate::app::{ClientConfig, Credentials, SessionConfig, SessionManager};
use crate::constants::{auth, env as env_constants};
use crate::errors::{AuthError, AuthResult};

const DOTENV_FILE: &str = ".env";

/// Authentication status information
#[derive(Debug, Clone)]
pub struct AuthStatus {
    /// Whether username environment variable is set
    pub username_set: bool,
    /// Whether password environment variable is set
    pub password_set: bool,
    /// Whether a client secret is configured
    pub client_secret_set: bool,
    /// Whether .env file exists in current directory
    pub dotenv_file_exists: bool,
    /// Whether credentials have been verified (None = not tested)
    pub credentials_valid: Option<bool>,
}

impl AuthStatus {
    /// Check if both credentials are available in environment
    pub fn has_credentials(&self) -> bool {
        self.username_set && self.password_set
    }

    /// Get descriptive status message for display
    pub fn status_message(&self) -> String {
        match (self.has_credentials(), self.credentials_valid) {
            (false, _) => "Missing credentials - run 'auth setup' to configure".to_string(),
            (true, None) => "Credentials configured but not verified".to_string(),
            (true, Some(true)) => "Credentials configured and verified".to_string(),
            (true, Some(false)) => "Credentials configured but rejected".to_string(),
        }
    }
}

/// Check current authentication status
pub fn get_auth_status() -> AuthStatus {
    AuthStatus {
        username_set: env_is_set(env_constants::USERNAME),
        password_set: env_is_set(env_constants::PASSWORD),
        client_secret_set: env_is_set(env_constants::CLIENT_SECRET),
        dotenv_file_exists: Path::new(DOTENV_FILE).exists(),
        credentials_valid: None,
    }
}

fn env_is_set(name: &str) -> bool {
    env::var(name).map(|value| !value.is_empty()).unwrap_or(false)
}

/// Check if credentials exist in environment variables
pub fn check_credentials() -> bool {
    env_is_set(env_constants::USERNAME) && env_is_set(env_constants::PASSWORD)
}

/// Credentials from the environment, or from an interactive prompt
pub fn resolve_credentials() -> AuthResult<Credentials> {
    match Credentials::from_env() {
        Ok(credentials) => Ok(credentials),
        Err(AuthError::EnvVar(_)) | Err(AuthError::MissingCredentials) => {
            if !atty::is(atty::Stream::Stdin) {
                return Err(AuthError::MissingCredentials);
            }
            debug!("No credentials in environment, prompting");
            let (username, password) = prompt_credentials()?;
            Ok(Credentials::new(username, password))
        }
        Err(e) => Err(e),
    }
}

/// Prompt user for credentials interactively
pub fn prompt_credentials() -> AuthResult<(String, String)> {
    print!("EOG username (email): ");
    io::stdout().flush().map_err(AuthError::CredentialStorage)?;

    let mut username = String::new();
    io::stdin()
        .read_line(&mut username)
        .map_err(AuthError::CredentialStorage)?;
    let username = username.trim().to_string();

    if username.is_empty() {
        return Err(AuthError::InvalidUsername {
            reason: "Username cannot be empty".to_string(),
        });
    }

    if !is_valid_username(&username) {
        return Err(AuthError::InvalidUsername {
            reason: "Username should be the email address registered with EOG".to_string(),
        });
    }

    let password = rpassword::prompt_password("EOG password: ")
        .map_err(AuthError::CredentialStorage)?;

    if password.is_empty() {
        return Err(AuthError::InvalidUsername {
            reason: "Password cannot be empty".to_string(),
        });
    }

    Ok((username, password))
}

/// EOG accounts are email addresses
fn is_valid_username(username: &str) -> bool {
    if username.len() < auth::MIN_USERNAME_LENGTH || username.len() > auth::MAX_USERNAME_LENGTH {
        return false;
    }

    let Some((local, domain)) = username.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !username.chars().any(char::is_whitespace)
}

/// Save credentials to `.env` in the working directory
pub fn save_credentials(username: &str, password: &str) -> AuthResult<()> {
    save_credentials_to(Path::new(DOTENV_FILE), username, password)?;
    env::set_var(env_constants::USERNAME, username);
    env::set_var(env_constants::PASSWORD, password);

    println!("Credentials saved to {}", DOTENV_FILE);
    #[cfg(unix)]
    println!("File permissions set to owner-only (600)");
    #[cfg(not(unix))]
    println!("Warning: please make sure {} is not readable by others", DOTENV_FILE);

    Ok(())
}

/// Writes credentials into `env_path`, keeping unrelated lines
pub fn save_credentials_to(env_path: &Path, username: &str, password: &str) -> AuthResult<()> {
    let mut lines = Vec::new();
    let mut username_found = false;
    let mut password_found = false;
    let username_prefix = format!("{}=", env_constants::USERNAME);
    let password_prefix = format!("{}=", env_constants::PASSWORD);

    if env_path.exists() {
        let reader = BufReader::new(File::open(env_path)?);
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.starts_with(&username_prefix) {
                lines.push(format!("{}{}", username_prefix, username));
                username_found = true;
            } else if trimmed.starts_with(&password_prefix) {
                lines.push(format!("{}{}", password_prefix, password));
                password_found = true;
            } else {
                lines.push(line);
            }
        }
    }

    if !username_found {
        lines.push(format!("{}{}", username_prefix, username));
    }
    if !password_found {
        lines.push(format!("{}{}", password_prefix, password));
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(env_path)?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata()?.permissions();
        perms.set_mode(auth::ENV_FILE_PERMISSIONS);
        file.set_permissions(perms)?;
    }

    Ok(())
}

/// Verify credentials by logging in
///
/// Returns `Ok(false)` when the identity provider rejects them and an error
/// when it could not be reached.
pub async fn verify_credentials(
    session_config: SessionConfig,
    client_config: ClientConfig,
) -> AuthResult<bool> {
    let credentials = Credentials::from_env().map_err(|_| AuthError::MissingCredentials)?;

    println!("Verifying credentials with EOG...");
    match SessionManager::connect(session_config, credentials, client_config).await {
        Ok(manager) => {
            debug!("Verified after {} login(s)", manager.login_count());
            println!("Credentials verified successfully!");
            Ok(true)
        }
        Err(e @ AuthError::LoginFailed { .. }) | Err(e @ AuthError::TokenMissing) => {
            println!("Credential verification failed: {}", e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Interactive credential setup workflow
pub async fn setup_credentials(
    session_config: SessionConfig,
    client_config: ClientConfig,
) -> AuthResult<()> {
    println!("EOG Authentication Setup");
    println!("========================");
    println!();
    println!("This stores your EOG account in a .env file in the current directory.");
    println!();

    if get_auth_status().has_credentials() {
        println!("Warning: Credentials are already configured.");
        print!("Do you want to update them? [y/N]: ");
        io::stdout().flush().map_err(AuthError::CredentialStorage)?;

        let mut response = String::new();
        io::stdin()
            .read_line(&mut response)
            .map_err(AuthError::CredentialStorage)?;

        if !response.trim().to_lowercase().starts_with('y') {
            println!("Setup cancelled.");
            return Ok(());
        }
        println!();
    }

    let (username, password) = prompt_credentials()?;
    println!();
    save_credentials(&username, &password)?;

    println!();
    if verify_credentials(session_config, client_config).await? {
        println!();
        println!("Setup complete! You can now run 'eog_fetcher sync'.");
    } else {
        println!();
        println!("Setup failed. Please check your credentials and run 'auth setup' again.");
    }

    Ok(())
}

/// Show current authentication status, testing the credentials if present
pub async fn show_auth_status(
    session_config: SessionConfig,
    client_config: ClientConfig,
) -> AuthResult<()> {
    let mut status = get_auth_status();

    println!("EOG Authentication Status");
    println!("=========================");
    println!();

    match env::var(env_constants::USERNAME) {
        Ok(username) if !username.is_empty() => println!("Username: {} (set)", username),
        _ => println!("Username: Not set"),
    }
    println!(
        "Password: {}",
        if status.password_set { "Set" } else { "Not set" }
    );
    println!(
        "Client secret: {}",
        if status.client_secret_set {
            "Set"
        } else {
            "Not set (public client)"
        }
    );
    println!(
        ".env file: {}",
        if status.dotenv_file_exists {
            "Exists"
        } else {
            "Not found"
        }
    );
    println!();

    if status.has_credentials() {
        status.credentials_valid = Some(verify_credentials(session_config, client_config).await?);
        println!();
    }

    println!("Status: {}", status.status_message());
    if !status.has_credentials() || status.credentials_valid == Some(false) {
        println!();
        println!("To configure credentials, run: eog_fetcher auth setup");
    }

    Ok(())
}
