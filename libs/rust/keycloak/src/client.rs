//! Keycloak admin API client with a shared, lock-guarded access token.

use crate::{
    config::KeycloakConfig,
    context::RequestContext,
    error::{sanitize_body, KeycloakError, KeycloakResult, Step, MAX_ERROR_BODY},
    models::{ClientRepresentation, CredentialRepresentation, PasswordGrant, TokenResponse},
    provider::{ClientSecret, ClientSecretProvider},
    token::{AccessToken, TokenSlot},
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Upper bound on the bytes read from an error response.
const MAX_ERROR_READ: usize = MAX_ERROR_BODY * 4;

/// Prefix of a remote error body whose read failed part way.
pub const UNREADABLE_BODY: &str = "[unreadable body]";

/// Resolves client names to client secrets through the Keycloak admin API.
pub struct KeycloakClient {
    config: KeycloakConfig,
    base: Url,
    http: Client,
    token: TokenSlot,
}

impl KeycloakClient {
    /// Create a new client, validating the configuration eagerly.
    ///
    /// # Errors
    ///
    /// Returns [`KeycloakError::InvalidConfig`] if the URL or username is
    /// missing, the password file does not exist, or the HTTP client cannot
    /// be built.
    pub fn new(config: KeycloakConfig) -> KeycloakResult<Self> {
        let base = config.validate()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| KeycloakError::invalid_config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            config,
            base,
            http,
            token: Mutex::new(None),
        })
    }

    async fn resolve(&self, ctx: &RequestContext, client_name: &str) -> KeycloakResult<ClientSecret> {
        let id = self.find_client_id(ctx, client_name).await?;
        self.get_client_secret(ctx, client_name, &id).await
    }

    /// Maps a client name to the internal client UUID the secret endpoint
    /// needs. Callers usually call the name "clientID".
    async fn find_client_id(&self, ctx: &RequestContext, client_name: &str) -> KeycloakResult<String> {
        let token = self.access_token(ctx).await?;

        let url = self.endpoint(&["admin", "realms", self.config.realm.as_str(), "clients"]);
        let request = self
            .http
            .get(url)
            .query(&[("clientId", client_name)])
            .bearer_auth(token.expose_secret());

        let clients: Vec<ClientRepresentation> = self.send(ctx, Step::ClientLookup, request).await?;

        match clients.as_slice() {
            [] => Err(KeycloakError::ClientNotFound {
                client_name: client_name.to_string(),
            }),
            [only] => Ok(only.id.clone()),
            [first, ..] => {
                warn!(
                    client_name,
                    matches = clients.len(),
                    "Multiple clients share this name, using the first"
                );
                Ok(first.id.clone())
            }
        }
    }

    async fn get_client_secret(
        &self,
        ctx: &RequestContext,
        client_name: &str,
        id: &str,
    ) -> KeycloakResult<ClientSecret> {
        let token = self.access_token(ctx).await?;

        let url = self.endpoint(&[
            "admin",
            "realms",
            self.config.realm.as_str(),
            "clients",
            id,
            "client-secret",
        ]);
        let request = self.http.get(url).bearer_auth(token.expose_secret());

        let credential: CredentialRepresentation =
            self.send(ctx, Step::SecretLookup, request).await?;

        if credential.value.is_empty() {
            return Err(KeycloakError::EmptySecret {
                client_name: client_name.to_string(),
            });
        }

        Ok(ClientSecret::new(credential.value.into_bytes()))
    }

    /// Returns the cached token, refreshing it first if it is unset or
    /// expired. The lock is held for the whole check-refresh sequence.
    async fn access_token(&self, ctx: &RequestContext) -> KeycloakResult<SecretString> {
        let mut slot = ctx.run(self.token.lock()).await?;

        if let Some(token) = slot.as_ref() {
            if !token.is_expired(Instant::now()) {
                return Ok(SecretString::from(token.secret().to_owned()));
            }
        }

        let token = self.refresh_access_token(ctx).await?;
        let bearer = SecretString::from(token.secret().to_owned());
        *slot = Some(token);
        Ok(bearer)
    }

    /// Issues a password grant. Must be called with the token lock held.
    ///
    /// The password is read from disk on every call so the file can be
    /// rotated without a restart.
    async fn refresh_access_token(&self, ctx: &RequestContext) -> KeycloakResult<AccessToken> {
        let raw = ctx
            .run(tokio::fs::read_to_string(&self.config.password_path))
            .await?
            .map_err(KeycloakError::PasswordFile)?;
        let password = SecretString::from(raw.trim().to_owned());
        drop(raw);

        let url = self.endpoint(&[
            "realms",
            self.config.realm.as_str(),
            "protocol",
            "openid-connect",
            "token",
        ]);
        let grant = PasswordGrant {
            grant_type: "password",
            username: &self.config.username,
            password: password.expose_secret(),
            client_id: &self.config.admin_client_id,
        };
        let request = self.http.post(url).form(&grant);

        let response: TokenResponse = self.send(ctx, Step::TokenRefresh, request).await?;
        let token = AccessToken::issued(response.access_token, response.expires_in, Instant::now())
            .ok_or_else(|| KeycloakError::Decode {
                step: Step::TokenRefresh,
                reason: format!("token lifetime of {} seconds is out of range", response.expires_in),
            })?;

        info!(expires_in = response.expires_in, "Refreshed Keycloak access token");
        Ok(token)
    }

    /// Sends a request and decodes a JSON body, treating any status of 300
    /// or above as a remote error.
    async fn send<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        step: Step,
        request: RequestBuilder,
    ) -> KeycloakResult<T> {
        ctx.run(async {
            let response = request
                .send()
                .await
                .map_err(|e| KeycloakError::from_reqwest(step, &e))?;

            let status = response.status();
            if status.as_u16() >= 300 {
                let status = status.as_u16();
                return Err(match read_error_body(response).await {
                    Ok(body) => KeycloakError::remote(step, status, &body),
                    Err(partial) => KeycloakError::Remote {
                        step,
                        status,
                        body: format!("{UNREADABLE_BODY} {}", sanitize_body(&partial)),
                    },
                });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| KeycloakError::from_reqwest(step, &e))?;
            debug!(%step, status = status.as_u16(), len = bytes.len(), "Keycloak response");

            // serde_json messages can quote input, which may be secret.
            serde_json::from_slice(&bytes).map_err(|e| KeycloakError::Decode {
                step,
                reason: format!(
                    "{:?} error at line {} column {}",
                    e.classify(),
                    e.line(),
                    e.column()
                ),
            })
        })
        .await?
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        // validate() rejects cannot-be-a-base URLs, so this always applies.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Reads at most [`MAX_ERROR_READ`] bytes of an error response body.
///
/// A read that fails part way returns what arrived as the error.
async fn read_error_body(mut response: Response) -> Result<String, String> {
    let mut body = Vec::new();

    while body.len() < MAX_ERROR_READ {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(MAX_ERROR_READ - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Failed reading error response body");
                return Err(String::from_utf8_lossy(&body).into_owned());
            }
        }
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[async_trait]
impl ClientSecretProvider for KeycloakClient {
    #[instrument(skip(self, ctx))]
    async fn fetch(&self, ctx: &RequestContext, client_name: &str) -> KeycloakResult<ClientSecret> {
        let start = std::time::Instant::now();
        let result = self.resolve(ctx, client_name).await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(_) => info!(client_name, elapsed_ms, "Finished fetching client secret"),
            Err(e) if e.is_interrupted() => {
                info!(client_name, elapsed_ms, error = %e, "Fetching client secret interrupted");
            }
            Err(e) => warn!(
                client_name,
                elapsed_ms,
                step = e.step().map(tracing::field::display),
                transient = e.is_transient(),
                error = %e,
                "Failed fetching client secret"
            ),
        }

        result
    }
}
