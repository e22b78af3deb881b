//! Keycloak resolver configuration.

use crate::error::{KeycloakError, KeycloakResult};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Client the admin token is requested as.
pub const DEFAULT_ADMIN_CLIENT_ID: &str = "admin-cli";

/// Keycloak resolver configuration.
#[derive(Debug, Clone)]
pub struct KeycloakConfig {
    /// Keycloak base URL, may include a path prefix
    pub url: String,
    /// Realm all lookups and token requests are scoped to
    pub realm: String,
    /// Operator username used for the password grant
    pub username: String,
    /// File holding the operator password, re-read on every refresh
    pub password_path: PathBuf,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Client identifier sent with the password grant
    pub admin_client_id: String,
}

impl KeycloakConfig {
    /// Create a new configuration with the default realm and timeout.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into(),
            realm: "master".to_string(),
            username: username.into(),
            password_path: password_path.into(),
            timeout: Duration::from_secs(10),
            admin_client_id: DEFAULT_ADMIN_CLIENT_ID.to_string(),
        }
    }

    /// Set the realm.
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Set the per-request HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the client identifier used for the password grant.
    #[must_use]
    pub fn with_admin_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.admin_client_id = client_id.into();
        self
    }

    /// Check construction-time preconditions and return the parsed base URL.
    ///
    /// The password file is only checked for existence; its content is read
    /// at refresh time.
    ///
    /// # Errors
    ///
    /// Returns [`KeycloakError::InvalidConfig`] naming the first failing field.
    pub fn validate(&self) -> KeycloakResult<Url> {
        if self.url.trim().is_empty() {
            return Err(KeycloakError::invalid_config("keycloak URL is required"));
        }
        let base = Url::parse(&self.url).map_err(|e| {
            KeycloakError::invalid_config(format!("keycloak URL {:?} is invalid: {e}", self.url))
        })?;
        if base.cannot_be_a_base() {
            return Err(KeycloakError::invalid_config(format!(
                "keycloak URL {:?} cannot be used as a base",
                self.url
            )));
        }
        if self.realm.is_empty() {
            return Err(KeycloakError::invalid_config("keycloak realm is required"));
        }
        if self.username.is_empty() {
            return Err(KeycloakError::invalid_config("keycloak username is required"));
        }
        if self.admin_client_id.is_empty() {
            return Err(KeycloakError::invalid_config(
                "keycloak admin client ID is required",
            ));
        }
        if self.timeout.is_zero() {
            return Err(KeycloakError::invalid_config(
                "keycloak timeout must be greater than 0",
            ));
        }
        if !self.password_path.exists() {
            return Err(KeycloakError::invalid_config(format!(
                "keycloak password file {} does not exist",
                self.password_path.display()
            )));
        }
        Ok(base)
    }
}
