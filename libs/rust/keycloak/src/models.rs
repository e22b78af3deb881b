//! Keycloak wire types.

use serde::{Deserialize, Serialize};

/// Password-grant form body sent to the token endpoint.
#[derive(Serialize)]
pub struct PasswordGrant<'a> {
    /// Always `password`
    pub grant_type: &'static str,
    /// Operator username
    pub username: &'a str,
    /// Operator password as read from the password file
    pub password: &'a str,
    /// Client the token is requested as
    pub client_id: &'a str,
}

/// Token endpoint response.
#[derive(Deserialize)]
pub struct TokenResponse {
    /// Bearer token for the admin API
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

/// One entry of the client listing; only the internal identifier is used.
#[derive(Debug, Deserialize)]
pub struct ClientRepresentation {
    /// Internal client UUID
    pub id: String,
}

/// Client-secret endpoint response.
#[derive(Deserialize)]
pub struct CredentialRepresentation {
    /// Secret value; empty when Keycloak omits it
    #[serde(default)]
    pub value: String,
}
