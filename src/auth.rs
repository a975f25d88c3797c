//! Credential exchange and validation against the service. The caller owns
//! persistence of the key; this client only talks to the network.

use crate::api::{self, Api};
use crate::transport::{no_progress, Body, Request, Transport, TransportError};
use serde_json::json;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    /// Login succeeded but the account has no API key issued.
    #[error("login successful, but the user doesn't have an API key")]
    NoCredentialIssued,
    #[error("network failure: {0}")]
    NetworkFailure(#[from] TransportError),
}

/// An API key the service has accepted at least once.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiKey(pub String);

pub struct AuthClient<'a, T> {
    transport: &'a T,
    api: &'a Api,
}

impl<'a, T: Transport> AuthClient<'a, T> {
    pub fn new(transport: &'a T, api: &'a Api) -> Self {
        Self { transport, api }
    }

    /// Exchanges email+password for an API key. Does not validate the key.
    pub async fn login(&self, email: &str, password: &str) -> Result<ApiKey, AuthError> {
        info!("[auth] login {}", email);
        let headers = [("User-Agent", api::USER_AGENT.to_string())];
        let response = self
            .transport
            .post(
                Request {
                    url: self.api.login_url(),
                    headers: &headers,
                    body: Body::Json(json!({ "email": email, "password": password })),
                },
                no_progress(),
            )
            .await?;

        if !response.ok() {
            return Err(AuthError::InvalidCredentials(format!(
                "login rejected (HTTP {})",
                response.status
            )));
        }

        let root = api::parse_root(&response.body).ok_or_else(|| {
            AuthError::InvalidCredentials("login failed (malformed server response)".to_string())
        })?;
        if !api::success(&root) {
            let message = api::first_message(&root)
                .unwrap_or("login failed (no message provided by server)")
                .to_string();
            return Err(AuthError::InvalidCredentials(message));
        }

        match api::login_api_key(&root) {
            None | Some(api::NO_KEY_SENTINEL) => Err(AuthError::NoCredentialIssued),
            Some(key) => Ok(ApiKey(key.to_string())),
        }
    }

    /// Lightweight key check: a status poll with an empty uuid.
    pub async fn validate(&self, key: &ApiKey) -> Result<(), AuthError> {
        info!("[auth] validating key");
        let headers = [
            ("apiKey", key.0.clone()),
            ("User-Agent", api::USER_AGENT.to_string()),
        ];
        let response = self
            .transport
            .post(
                Request {
                    url: self.api.status_url(),
                    headers: &headers,
                    body: Body::Form(api::status_body("")),
                },
                no_progress(),
            )
            .await?;

        if response.ok() {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials(format!(
                "failed to verify API key (HTTP {})",
                response.status
            )))
        }
    }
}
