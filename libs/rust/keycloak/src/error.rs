//! Keycloak error types using thiserror 2.0.
//!
//! Separates caller misconfiguration (unknown client, empty secret) from
//! transport and remote failures so the adapter can report them differently.

use crate::context::Interrupted;
use std::fmt;
use thiserror::Error;

/// Maximum number of characters of a remote error body kept in messages.
pub const MAX_ERROR_BODY: usize = 256;

/// JSON field names whose values are scrubbed from remote error bodies.
const SENSITIVE_FIELDS: &[&str] = &[
    "value",
    "secret",
    "password",
    "access_token",
    "refresh_token",
    "id_token",
    "token",
];

/// Remote step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Password-grant token issuance
    TokenRefresh,
    /// Client name to internal identifier
    ClientLookup,
    /// Internal identifier to client secret
    SecretLookup,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TokenRefresh => "refreshing access token",
            Self::ClientLookup => "resolving client ID",
            Self::SecretLookup => "fetching client secret",
        })
    }
}

/// Keycloak-specific errors.
#[derive(Error, Debug)]
pub enum KeycloakError {
    /// Invalid configuration detected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No client with the requested name exists in the realm
    #[error("client {client_name:?} not found")]
    ClientNotFound {
        /// Name that was looked up
        client_name: String,
    },

    /// The client exists but its secret is empty
    #[error("client secret for {client_name:?} is empty")]
    EmptySecret {
        /// Name whose secret was empty
        client_name: String,
    },

    /// Keycloak answered with a status of 300 or above
    #[error("{step}: server error status {status}: {body}")]
    Remote {
        /// Failing step
        step: Step,
        /// HTTP status code
        status: u16,
        /// Sanitized, truncated response body
        body: String,
    },

    /// The request never produced a response
    #[error("{step}: {reason}")]
    Transport {
        /// Failing step
        step: Step,
        /// Underlying cause
        reason: String,
    },

    /// The response body could not be decoded
    #[error("{step}: decoding response: {reason}")]
    Decode {
        /// Failing step
        step: Step,
        /// Underlying cause
        reason: String,
    },

    /// The operator password file could not be read at refresh time
    #[error("refreshing access token: reading password file: {0}")]
    PasswordFile(#[source] std::io::Error),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// The caller's deadline passed
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Result type for Keycloak operations.
pub type KeycloakResult<T> = Result<T, KeycloakError>;

impl KeycloakError {
    /// The caller asked for something that does not exist or is unusable.
    #[must_use]
    pub const fn is_misconfiguration(&self) -> bool {
        matches!(self, Self::ClientNotFound { .. } | Self::EmptySecret { .. })
    }

    /// The failure is likely to clear up on its own.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// The caller cancelled the call or its deadline passed.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// The remote step that failed, if the error came from a remote call.
    #[must_use]
    pub const fn step(&self) -> Option<Step> {
        match self {
            Self::Remote { step, .. } | Self::Transport { step, .. } | Self::Decode { step, .. } => {
                Some(*step)
            }
            Self::PasswordFile(_) => Some(Step::TokenRefresh),
            _ => None,
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a remote error, sanitizing the body.
    #[must_use]
    pub fn remote(step: Step, status: u16, body: &str) -> Self {
        Self::Remote {
            step,
            status,
            body: sanitize_body(body),
        }
    }

    /// Classify a reqwest failure for the given step.
    #[must_use]
    pub fn from_reqwest(step: Step, err: &reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode {
                step,
                reason: err.to_string(),
            }
        } else {
            Self::Transport {
                step,
                reason: err.to_string(),
            }
        }
    }
}

impl From<Interrupted> for KeycloakError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::Cancelled => Self::Cancelled,
            Interrupted::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Scrub sensitive JSON fields from a response body and cap its length.
#[must_use]
pub fn sanitize_body(body: &str) -> String {
    let scrubbed = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(mut json) => {
            redact(&mut json);
            json.to_string()
        }
        Err(_) => body.trim().to_string(),
    };

    if scrubbed.chars().count() > MAX_ERROR_BODY {
        let mut truncated: String = scrubbed.chars().take(MAX_ERROR_BODY).collect();
        truncated.push_str("...");
        truncated
    } else {
        scrubbed
    }
}

fn redact(json: &mut serde_json::Value) {
    match json {
        serde_json::Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                let key = key.to_lowercase();
                if SENSITIVE_FIELDS.iter().any(|f| key == *f) {
                    *value = serde_json::Value::String("[REDACTED]".to_string());
                } else {
                    redact(value);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_step() {
        let err = KeycloakError::remote(Step::ClientLookup, 503, "maintenance");
        assert_eq!(
            err.to_string(),
            "resolving client ID: server error status 503: maintenance"
        );
    }

    #[test]
    fn test_misconfiguration_classification() {
        assert!(KeycloakError::ClientNotFound {
            client_name: "a".to_string()
        }
        .is_misconfiguration());
        assert!(KeycloakError::EmptySecret {
            client_name: "a".to_string()
        }
        .is_misconfiguration());
        assert!(!KeycloakError::remote(Step::SecretLookup, 404, "").is_misconfiguration());
        assert!(!KeycloakError::Cancelled.is_misconfiguration());
    }

    #[test]
    fn test_transient_errors() {
        assert!(KeycloakError::remote(Step::TokenRefresh, 502, "").is_transient());
        assert!(KeycloakError::remote(Step::TokenRefresh, 429, "").is_transient());
        assert!(!KeycloakError::remote(Step::TokenRefresh, 401, "").is_transient());
        assert!(KeycloakError::Transport {
            step: Step::SecretLookup,
            reason: "connection refused".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_from_interrupted() {
        assert!(matches!(
            KeycloakError::from(Interrupted::Cancelled),
            KeycloakError::Cancelled
        ));
        assert!(KeycloakError::from(Interrupted::DeadlineExceeded).is_interrupted());
    }

    #[test]
    fn test_sanitize_redacts_secret_fields() {
        let body = r#"{"value":"s3cr3t","nested":{"access_token":"abc"},"error":"bad"}"#;
        let sanitized = sanitize_body(body);
        assert!(!sanitized.contains("s3cr3t"));
        assert!(!sanitized.contains("abc"));
        assert!(sanitized.contains("bad"));
        assert!(sanitized.contains("[REDACTED]"));
    }

    #[test]
    fn test_sanitize_truncates_plain_text() {
        let body = "x".repeat(MAX_ERROR_BODY * 2);
        let sanitized = sanitize_body(&body);
        assert_eq!(sanitized.len(), MAX_ERROR_BODY + 3);
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn test_password_file_step() {
        let err = KeycloakError::PasswordFile(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(err.step(), Some(Step::TokenRefresh));
    }
}
