//! Bearer-token authentication against the identity provider.
//!
//! Only the principal's numeric id (and optional email) matter to the rest of
//! the crate: they stamp task ownership and gate every read.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AuthConfig, DevToken};
use crate::task::{Owner, Task};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid authorization header")]
    InvalidHeader,

    #[error("Missing token")]
    MissingToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid user payload")]
    InvalidPayload,

    #[error("Authentication provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Not permitted")]
    NotPermitted,
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
}

impl Principal {
    /// Builds a principal from a provider payload; `id` is required, the
    /// username falls back to the email and then to the id.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        let id = payload.get("id")?.as_i64()?;
        let email = payload
            .get("email")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let username = payload
            .get("username")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| email.clone())
            .unwrap_or_else(|| id.to_string());

        Some(Self {
            id,
            username,
            email,
        })
    }

    pub fn owner(&self) -> Owner {
        Owner {
            id: self.id,
            email: self.email.clone(),
        }
    }
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &SecretString) -> Result<Principal, AuthError>;
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header: &str) -> Result<SecretString, AuthError> {
    let header = header.trim_start();
    let prefix = header.get(..7).ok_or(AuthError::InvalidHeader)?;
    if !prefix.eq_ignore_ascii_case("bearer ") {
        return Err(AuthError::InvalidHeader);
    }

    let token = header[7..].trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(SecretString::from(token.to_string()))
}

/// Owner-only access check.
pub fn authorize_owner(principal: &Principal, task: &Task) -> Result<(), AuthError> {
    if task.is_owned_by(principal.id) {
        Ok(())
    } else {
        Err(AuthError::NotPermitted)
    }
}

/// Static tokens from settings, for local development.
pub struct DevTokenAuthenticator {
    tokens: HashMap<String, DevToken>,
}

impl DevTokenAuthenticator {
    pub fn new(tokens: HashMap<String, DevToken>) -> Self {
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for DevTokenAuthenticator {
    fn authenticate(&self, token: &SecretString) -> Result<Principal, AuthError> {
        let dev = self
            .tokens
            .get(token.expose_secret())
            .ok_or(AuthError::InvalidCredentials)?;

        Ok(Principal {
            id: dev.id,
            username: dev
                .username
                .clone()
                .or_else(|| dev.email.clone())
                .unwrap_or_else(|| "dev".to_string()),
            email: dev.email.clone(),
        })
    }
}

/// Asks the provider's `/api/users/me` endpoint who owns the token.
pub struct RemoteAuthenticator {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl RemoteAuthenticator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/users/me", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Authenticator for RemoteAuthenticator {
    fn authenticate(&self, token: &SecretString) -> Result<Principal, AuthError> {
        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(token.expose_secret())
            .send()
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        if response.status() != reqwest::StatusCode::OK {
            debug!("Provider rejected token with status {}", response.status());
            return Err(AuthError::InvalidCredentials);
        }

        let payload: serde_json::Value =
            response.json().map_err(|_| AuthError::InvalidPayload)?;
        Principal::from_payload(&payload).ok_or(AuthError::InvalidPayload)
    }
}

/// Tries each authenticator in turn. Only `InvalidCredentials` moves on to
/// the next one; any other error is final.
pub struct ChainAuthenticator {
    links: Vec<Box<dyn Authenticator>>,
}

impl ChainAuthenticator {
    pub fn new(links: Vec<Box<dyn Authenticator>>) -> Self {
        Self { links }
    }

    /// Dev tokens first, then the remote provider.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let mut links: Vec<Box<dyn Authenticator>> = Vec::new();
        let dev = DevTokenAuthenticator::new(config.dev_tokens.clone());
        if !dev.is_empty() {
            links.push(Box::new(dev));
        }
        links.push(Box::new(RemoteAuthenticator::new(
            &config.base_url,
            Duration::from_secs(config.timeout_seconds),
        )?));
        Ok(Self::new(links))
    }
}

impl Authenticator for ChainAuthenticator {
    fn authenticate(&self, token: &SecretString) -> Result<Principal, AuthError> {
        for link in &self.links {
            match link.authenticate(token) {
                Err(AuthError::InvalidCredentials) => continue,
                other => return other,
            }
        }
        Err(AuthError::InvalidCredentials)
    }
}
