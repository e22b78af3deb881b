//! Keycloak client-secret resolver.
//!
//! Resolves a client name to its confidential secret through the Keycloak
//! admin API, sharing one admin access token between concurrent callers.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod provider;
pub mod token;

pub use client::KeycloakClient;
pub use config::KeycloakConfig;
pub use context::{Interrupted, RequestContext};
pub use error::{KeycloakError, KeycloakResult, Step};
pub use provider::{ClientSecret, ClientSecretProvider};
