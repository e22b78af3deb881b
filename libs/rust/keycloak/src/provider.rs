//! Abstract secret-fetching capability.

use crate::context::RequestContext;
use crate::error::KeycloakResult;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretSlice};
use std::sync::Arc;

/// Raw client secret bytes. Debug output is redacted.
pub struct ClientSecret(SecretSlice<u8>);

impl ClientSecret {
    /// Wrap raw secret bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(SecretSlice::from(bytes))
    }

    /// The secret bytes.
    #[must_use]
    pub fn expose_secret(&self) -> &[u8] {
        self.0.expose_secret()
    }

    /// Number of bytes in the secret.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expose_secret().len()
    }

    /// True if the secret has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClientSecret").field(&"[REDACTED]").finish()
    }
}

/// Anything that can resolve a client name to its secret.
#[async_trait]
pub trait ClientSecretProvider: Send + Sync {
    /// Resolve `client_name` to its secret, honouring the caller's
    /// cancellation and deadline.
    async fn fetch(&self, ctx: &RequestContext, client_name: &str) -> KeycloakResult<ClientSecret>;
}

#[async_trait]
impl<P> ClientSecretProvider for Arc<P>
where
    P: ClientSecretProvider + ?Sized,
{
    async fn fetch(&self, ctx: &RequestContext, client_name: &str) -> KeycloakResult<ClientSecret> {
        (**self).fetch(ctx, client_name).await
    }
}
