//! Anti-forgery tokens and the signed handshake carrier.

use crate::error::{OAuth2Error, OAuth2Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw entropy per anti-forgery token (encodes to 43 characters).
pub const STATE_TOKEN_BYTES: usize = 32;

/// Longest lifetime a staged handshake may be given (one day).
pub const MAX_HANDSHAKE_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Generate an anti-forgery token from the operating system CSPRNG.
pub fn generate_state_token() -> OAuth2Result<String> {
    generate_state_token_with(&mut OsRng)
}

fn generate_state_token_with<R: RngCore>(rng: &mut R) -> OAuth2Result<String> {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| OAuth2Error::EntropyUnavailable(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Slack identity staged between the two hops, bound to one anti-forgery token.
#[derive(Clone, Serialize, Deserialize)]
pub struct HandshakeState {
    pub user_id: String,
    pub slack_access_token: String,
    pub state: String,
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl HandshakeState {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Compare the echoed `state` parameter against the bound token.
    pub fn verify_state(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented else {
            return false;
        };
        if presented.len() != self.state.len() {
            return false;
        }

        // constant time over equal-length inputs
        presented
            .bytes()
            .zip(self.state.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeState")
            .field("user_id", &self.user_id)
            .field("slack_access_token", &"<redacted>")
            .field("state", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Seals and opens [`HandshakeState`] as an HS256 JWT.
#[derive(Clone)]
pub struct HandshakeCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl HandshakeCodec {
    /// `ttl_seconds` is capped at [`MAX_HANDSHAKE_TTL_SECONDS`].
    pub fn new(secret: &[u8], ttl_seconds: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::seconds(ttl_seconds.min(MAX_HANDSHAKE_TTL_SECONDS) as i64),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Build a fresh handshake that expires one TTL from now.
    pub fn issue(&self, user_id: String, slack_access_token: String, state: String) -> HandshakeState {
        let issued_at = Utc::now();
        HandshakeState {
            user_id,
            slack_access_token,
            state,
            issued_at,
            expires_at: issued_at + self.ttl,
        }
    }

    pub fn seal(&self, handshake: &HandshakeState) -> OAuth2Result<String> {
        let token = encode(&Header::new(Algorithm::HS256), handshake, &self.encoding_key)?;
        Ok(token)
    }

    pub fn open(&self, token: &str) -> OAuth2Result<HandshakeState> {
        let handshake = decode::<HandshakeState>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => OAuth2Error::HandshakeExpired,
                _ => OAuth2Error::HandshakeToken(e),
            })?
            .claims;

        if handshake.is_expired() {
            return Err(OAuth2Error::HandshakeExpired);
        }

        Ok(handshake)
    }
}
