//! Cached admin access token.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Admin access token with the instant after which it must be refreshed.
pub struct AccessToken {
    value: SecretString,
    expires_at: Instant,
}

impl AccessToken {
    /// Build a token issued `now` with the lifetime reported by Keycloak.
    ///
    /// Returns `None` when the lifetime does not fit in an [`Instant`].
    #[must_use]
    pub fn issued(value: impl Into<String>, lifetime_secs: u64, now: Instant) -> Option<Self> {
        let expires_at = now.checked_add(expiry_after(lifetime_secs))?;
        Some(Self {
            value: SecretString::from(value.into()),
            expires_at,
        })
    }

    /// True at or after the refresh instant.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Bearer value.
    #[must_use]
    pub fn secret(&self) -> &str {
        self.value.expose_secret()
    }

    /// Instant after which the token is refreshed.
    #[must_use]
    pub const fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Portion of the reported lifetime the token is used for: 75%, rounded the
/// same way as integer seconds (`lifetime - lifetime / 4`).
#[must_use]
pub const fn expiry_after(lifetime_secs: u64) -> Duration {
    Duration::from_secs(lifetime_secs - lifetime_secs / 4)
}

/// Single token slot. `None` until the first successful refresh.
///
/// The lock is held across a refresh so only one refresh is ever in flight.
pub type TokenSlot = Mutex<Option<AccessToken>>;
