//! Driver configuration
//!
//! Loaded once from environment variables (and an optional `.env` file).

use keycloak_secrets::config::DEFAULT_ADMIN_CLIENT_ID;
use keycloak_secrets::KeycloakConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Highest permission set a credential file may carry (`r--r--r--`).
pub const MAX_FILE_MODE: u32 = 0o444;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// What was wrong with its value
        reason: String,
    },

    /// File mode that would allow writes or exceeds read-only bits
    #[error("Invalid file mode for {name}: {mode:o} must be read-only (subset of 444)")]
    InvalidFileMode {
        /// Variable name
        name: String,
        /// Rejected mode
        mode: u32,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable lines
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "plain" => Ok(Self::Text),
            other => Err(format!("unknown log format '{other}', expected json or text")),
        }
    }
}

/// Service configuration with validation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unix socket the CSI services listen on
    pub csi_endpoint: PathBuf,
    /// Keycloak base URL
    pub keycloak_url: String,
    /// Keycloak realm
    pub keycloak_realm: String,
    /// Operator username used for the password grant
    pub keycloak_username: String,
    /// File holding the operator password
    pub keycloak_password_file: PathBuf,
    /// Client the admin token is requested as
    pub keycloak_admin_client_id: String,
    /// Per-request HTTP timeout towards Keycloak
    pub keycloak_timeout_secs: u64,
    /// Overall deadline of one CSI call
    pub request_timeout_secs: u64,
    /// Node identifier reported by NodeGetInfo
    pub node_id: String,
    /// Mode of the published `client-id` file
    pub client_id_file_mode: u32,
    /// Mode of the published `client-secret` file
    pub client_secret_file_mode: u32,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Default log filter
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable does not parse or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            csi_endpoint: env::var("CSI_ENDPOINT")
                .map_or_else(|_| PathBuf::from("/csi/csi.sock"), PathBuf::from),
            keycloak_url: env::var("KEYCLOAK_URL").unwrap_or_default(),
            keycloak_realm: env::var("KEYCLOAK_REALM").unwrap_or_else(|_| "master".to_string()),
            keycloak_username: env::var("KEYCLOAK_CLIENT_ID")
                .unwrap_or_else(|_| "k8s-csi-driver".to_string()),
            keycloak_password_file: env::var("KEYCLOAK_CLIENT_SECRET_FILE")
                .map_or_else(|_| PathBuf::from("/etc/keycloak/password"), PathBuf::from),
            keycloak_admin_client_id: env::var("KEYCLOAK_ADMIN_CLIENT_ID")
                .unwrap_or_else(|_| DEFAULT_ADMIN_CLIENT_ID.to_string()),
            keycloak_timeout_secs: parse_env("KEYCLOAK_TIMEOUT", 10)?,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT", 30)?,
            node_id: env::var("NODE_ID").unwrap_or_default(),
            client_id_file_mode: parse_mode_env("CLIENT_ID_FILE_MODE", 0o444)?,
            client_secret_file_mode: parse_mode_env("CLIENT_SECRET_FILE_MODE", 0o440)?,
            shutdown_timeout_seconds: parse_env("SHUTDOWN_TIMEOUT", 30)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_env("LOG_FORMAT", LogFormat::Json)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.keycloak_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("KEYCLOAK_URL".to_string()));
        }
        if self.keycloak_username.is_empty() {
            return Err(ConfigError::MissingRequired("KEYCLOAK_CLIENT_ID".to_string()));
        }
        if self.keycloak_admin_client_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "KEYCLOAK_ADMIN_CLIENT_ID".to_string(),
            ));
        }
        if self.csi_endpoint.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("CSI_ENDPOINT".to_string()));
        }
        for (name, secs) in [
            ("KEYCLOAK_TIMEOUT", self.keycloak_timeout_secs),
            ("REQUEST_TIMEOUT", self.request_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ParseError {
                    name: name.to_string(),
                    reason: "timeout must be greater than 0".to_string(),
                });
            }
        }
        check_mode("CLIENT_ID_FILE_MODE", self.client_id_file_mode)?;
        check_mode("CLIENT_SECRET_FILE_MODE", self.client_secret_file_mode)?;
        Ok(())
    }

    /// Builds the resolver configuration.
    #[must_use]
    pub fn keycloak_config(&self) -> KeycloakConfig {
        KeycloakConfig::new(
            self.keycloak_url.clone(),
            self.keycloak_username.clone(),
            self.keycloak_password_file.clone(),
        )
        .with_realm(self.keycloak_realm.clone())
        .with_timeout(Duration::from_secs(self.keycloak_timeout_secs))
        .with_admin_client_id(self.keycloak_admin_client_id.clone())
    }

    /// Overall deadline of one CSI call.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Graceful shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// Parse an environment variable with a default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse an octal file mode environment variable with a default value.
fn parse_mode_env(name: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Ok(val) => parse_mode(&val).map_err(|reason| ConfigError::ParseError {
            name: name.to_string(),
            reason,
        }),
        Err(_) => Ok(default),
    }
}

/// Parses an octal mode such as `440` or `0o440`.
///
/// # Errors
///
/// Returns a description of the problem when `value` is not octal.
pub fn parse_mode(value: &str) -> Result<u32, String> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .or_else(|| trimmed.strip_prefix("0O"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 8).map_err(|e| format!("'{trimmed}' is not an octal mode: {e}"))
}

/// Rejects modes with write or execute bits, or bits outside the permission range.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidFileMode`] naming `name`.
pub fn check_mode(name: &str, mode: u32) -> Result<(), ConfigError> {
    if mode & !MAX_FILE_MODE != 0 {
        return Err(ConfigError::InvalidFileMode {
            name: name.to_string(),
            mode,
        });
    }
    Ok(())
}
