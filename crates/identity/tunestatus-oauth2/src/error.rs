//! OAuth2 and account-linking error types.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tunestatus_core::StoreError;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

/// Low-level failures talking to a provider or handling the carrier token.
#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Token exchange failed with status {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Handshake token error: {0}")]
    HandshakeToken(#[from] jsonwebtoken::errors::Error),

    #[error("Handshake expired")]
    HandshakeExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Slack,
    Spotify,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Slack => "slack",
            Provider::Spotify => "spotify",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcomes of a linking request.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Credential carrier is missing, invalid or expired")]
    InvalidCredentialCarrier,

    #[error("Anti-forgery state is absent or does not match the handshake")]
    StateMismatch,

    #[error("{provider} authorization exchange failed: {reason}")]
    AuthorizationExchangeFailed { provider: Provider, reason: String },

    #[error("{provider} authorization response was malformed: {reason}")]
    ProviderAuthBadRequest { provider: Provider, reason: String },

    #[error("Failed to persist linked identity: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("Could not generate anti-forgery token: {0}")]
    EntropyUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LinkError {
    pub(crate) fn exchange_failed(provider: Provider, reason: impl Into<String>) -> Self {
        Self::AuthorizationExchangeFailed {
            provider,
            reason: reason.into(),
        }
    }

    pub(crate) fn bad_request(provider: Provider, reason: impl Into<String>) -> Self {
        Self::ProviderAuthBadRequest {
            provider,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            LinkError::InvalidCredentialCarrier => "invalid_credential_carrier",
            LinkError::StateMismatch => "state_mismatch",
            LinkError::AuthorizationExchangeFailed { .. } => "authorization_exchange_failed",
            LinkError::ProviderAuthBadRequest { .. } => "provider_auth_bad_request",
            LinkError::PersistenceFailure(_) => "persistence_failure",
            LinkError::EntropyUnavailable(_) => "entropy_unavailable",
            LinkError::Internal(_) => "internal_error",
        }
    }

    /// The provider the failure is attributable to, if any.
    pub fn provider(&self) -> Option<Provider> {
        match self {
            LinkError::AuthorizationExchangeFailed { provider, .. }
            | LinkError::ProviderAuthBadRequest { provider, .. } => Some(*provider),
            _ => None,
        }
    }
}
