//! The two-hop account linking state machine.

use crate::client::LinkClient;
use crate::config::LinkConfig;
use crate::error::{LinkError, OAuth2Error, OAuth2Result, Provider};
use crate::state::{
    HandshakeCodec, HandshakeState, MAX_HANDSHAKE_TTL_SECONDS, generate_state_token,
};
use crate::types::{SlackCallbackQuery, SpotifyCallbackQuery};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use tunestatus_core::{IdentityStore, LinkedIdentity};

/// Result of the first hop: where to send the user and what to hand them to carry.
#[derive(Debug, Clone)]
pub struct LinkRedirect {
    pub authorize_url: String,
    /// Sealed [`HandshakeState`] for the credential carrier
    pub carrier: String,
    pub handshake: HandshakeState,
}

/// Drives the Slack -> Spotify handshake and persists the merged identity.
#[derive(Clone)]
pub struct AccountLinker {
    config: LinkConfig,
    client: LinkClient,
    codec: HandshakeCodec,
    store: Arc<dyn IdentityStore>,
}

impl AccountLinker {
    pub fn new(config: LinkConfig, store: Arc<dyn IdentityStore>) -> OAuth2Result<Self> {
        if config.handshake_secret.is_empty() {
            return Err(OAuth2Error::ConfigError(
                "Handshake secret must not be empty".to_string(),
            ));
        }

        if config.handshake_ttl_seconds > MAX_HANDSHAKE_TTL_SECONDS {
            return Err(OAuth2Error::ConfigError(format!(
                "Handshake TTL must not exceed {} seconds",
                MAX_HANDSHAKE_TTL_SECONDS
            )));
        }

        let client = LinkClient::new(config.http_timeout_seconds)?;
        let codec = HandshakeCodec::new(
            config.handshake_secret.as_bytes(),
            config.handshake_ttl_seconds,
        );

        Ok(Self {
            config,
            client,
            codec,
            store,
        })
    }

    pub fn handshake_ttl(&self) -> Duration {
        self.codec.ttl()
    }

    /// First hop: Slack redirected back with its authorization code.
    pub async fn begin(&self, query: SlackCallbackQuery) -> Result<LinkRedirect, LinkError> {
        if let Some(error) = query.error {
            warn!(%error, "Slack authorization was declined");
            return Err(LinkError::exchange_failed(Provider::Slack, error));
        }

        let code = query
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| LinkError::bad_request(Provider::Slack, "missing authorization code"))?;

        let slack_response = self
            .client
            .exchange_slack_code(&self.config.slack, &code)
            .await
            .map_err(|e| {
                warn!(error = %e, "Slack token exchange failed");
                LinkError::bad_request(Provider::Slack, e.to_string())
            })?;

        if !slack_response.ok {
            let reason = slack_response
                .error
                .unwrap_or_else(|| "unknown_error".to_string());
            warn!(%reason, "Slack rejected the authorization code");
            return Err(LinkError::exchange_failed(Provider::Slack, reason));
        }

        let user = slack_response
            .authorized_user()
            .map_err(|reason| LinkError::bad_request(Provider::Slack, reason))?;

        let state = generate_state_token().map_err(|e| LinkError::EntropyUnavailable(e.to_string()))?;
        let handshake = self
            .codec
            .issue(user.id.clone(), user.access_token.clone(), state);

        let carrier = self
            .codec
            .seal(&handshake)
            .map_err(|e| LinkError::Internal(e.to_string()))?;

        let authorize_url = self
            .client
            .spotify_authorization_url(&self.config.spotify, &handshake.state)
            .map_err(|e| LinkError::Internal(e.to_string()))?;

        info!(user_id = %handshake.user_id, "Slack authorization complete, redirecting to Spotify");

        Ok(LinkRedirect {
            authorize_url,
            carrier,
            handshake,
        })
    }

    /// Terminal hop: Spotify redirected back; `carrier` is the sealed handshake, if any.
    pub async fn complete(
        &self,
        carrier: Option<&str>,
        query: SpotifyCallbackQuery,
    ) -> Result<LinkedIdentity, LinkError> {
        let handshake = carrier
            .ok_or(LinkError::InvalidCredentialCarrier)
            .and_then(|token| {
                self.codec.open(token).map_err(|e| {
                    warn!(error = %e, "Rejected handshake carrier");
                    LinkError::InvalidCredentialCarrier
                })
            })?;

        if !handshake.verify_state(query.state.as_deref()) {
            warn!(user_id = %handshake.user_id, "Spotify callback state does not match handshake");
            return Err(LinkError::StateMismatch);
        }

        if let Some(error) = query.error {
            warn!(user_id = %handshake.user_id, %error, "Spotify authorization was declined");
            return Err(LinkError::exchange_failed(Provider::Spotify, error));
        }

        let code = query.code.filter(|code| !code.is_empty()).ok_or_else(|| {
            LinkError::exchange_failed(Provider::Spotify, "missing authorization code")
        })?;

        let token = self
            .client
            .exchange_spotify_code(&self.config.spotify, &code)
            .await
            .map_err(|e| {
                warn!(user_id = %handshake.user_id, error = %e, "Spotify token exchange failed");
                LinkError::exchange_failed(Provider::Spotify, e.to_string())
            })?;

        let refresh_token = token
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| LinkError::exchange_failed(Provider::Spotify, "no refresh token issued"))?;

        let expiry = Some(token.expires_in)
            .filter(|secs| *secs >= 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                warn!(user_id = %handshake.user_id, expires_in = token.expires_in, "Spotify token lifetime out of range");
                LinkError::exchange_failed(Provider::Spotify, "invalid expires_in")
            })?;

        let identity = LinkedIdentity::new(
            handshake.user_id,
            handshake.slack_access_token,
            token.access_token,
            refresh_token,
            expiry,
            token.token_type,
        )
        .map_err(|e| LinkError::exchange_failed(Provider::Spotify, e.to_string()))?;

        self.store.persist(identity.clone()).await.map_err(|e| {
            warn!(user_id = %identity.platform_user_id, error = %e, "Failed to persist linked identity");
            LinkError::PersistenceFailure(e)
        })?;

        info!(user_id = %identity.platform_user_id, "Linked Slack and Spotify accounts");
        Ok(identity)
    }
}
