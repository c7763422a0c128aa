//! Operator authentication for the admin surface.
//!
//! Buyer-facing routes are open; only `/admin/*` goes through an [`Authenticator`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{AuthConfig, AuthMethod};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Lower-cased request headers presented for authentication.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
}

impl AuthRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Who performed an admin action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operator {
    pub name: String,
    pub method: &'static str,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Operator, AuthError>;

    fn method_name(&self) -> &'static str;
}

/// Accepts every request. Must be selected explicitly in config.
#[derive(Debug, Default)]
pub struct NoneAuthenticator;

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<Operator, AuthError> {
        Ok(Operator {
            name: "anonymous".to_string(),
            method: "none",
        })
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

/// Checks `Authorization: Bearer <key>` or `X-API-Key: <key>` against one shared key.
pub struct ApiKeyAuthenticator {
    expected_digest: [u8; 32],
}

impl ApiKeyAuthenticator {
    pub fn new(api_key: &str) -> Self {
        Self {
            expected_digest: Sha256::digest(api_key.as_bytes()).into(),
        }
    }

    fn presented_key(request: &AuthRequest) -> Option<&str> {
        request
            .header("authorization")
            .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
            .or_else(|| request.header("x-api-key"))
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Operator, AuthError> {
        let key = Self::presented_key(request).ok_or(AuthError::NotAuthenticated)?;

        // Constant-time over fixed-size digests.
        let presented: [u8; 32] = Sha256::digest(key.as_bytes()).into();
        let diff = presented
            .iter()
            .zip(self.expected_digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));

        if diff == 0 {
            Ok(Operator {
                name: "admin".to_string(),
                method: "api_key",
            })
        } else {
            Err(AuthError::InvalidCredentials("Invalid API key".to_string()))
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Build the authenticator selected in config.
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    match config.method {
        AuthMethod::None => Ok(Box::new(NoneAuthenticator)),
        AuthMethod::ApiKey => {
            let api_key = config.api_key.as_deref().ok_or_else(|| {
                AuthError::ConfigurationError(
                    "api_key must be set when using api_key auth method".to_string(),
                )
            })?;
            Ok(Box::new(ApiKeyAuthenticator::new(api_key)))
        }
    }
}
