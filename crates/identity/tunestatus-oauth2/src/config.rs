//! OAuth2 configuration types.

use serde::{Deserialize, Serialize};

/// Slack OAuth v2 app credentials (the first hop).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
    /// Only sent when the Slack app was installed with an explicit redirect URI
    pub redirect_uri: Option<String>,
}

impl Default for SlackOAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            token_endpoint: "https://slack.com/api/oauth.v2.access".to_string(),
            redirect_uri: None,
        }
    }
}

/// Spotify authorization code flow configuration (the terminal hop).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub show_dialog: bool,
}

impl Default for SpotifyOAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorization_endpoint: "https://accounts.spotify.com/authorize".to_string(),
            token_endpoint: "https://accounts.spotify.com/api/token".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            scopes: vec!["user-read-currently-playing".to_string()],
            show_dialog: false,
        }
    }
}

/// Everything the account linker needs, injected at construction.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub slack: SlackOAuthConfig,
    pub spotify: SpotifyOAuthConfig,
    /// HMAC key used to sign the handshake carrier
    pub handshake_secret: String,
    pub handshake_ttl_seconds: u64,
    pub http_timeout_seconds: u64,
}

impl LinkConfig {
    pub fn new(
        slack: SlackOAuthConfig,
        spotify: SpotifyOAuthConfig,
        handshake_secret: impl Into<String>,
    ) -> Self {
        Self {
            slack,
            spotify,
            handshake_secret: handshake_secret.into(),
            handshake_ttl_seconds: 3600, // 1 hour
            http_timeout_seconds: 10,
        }
    }

    pub fn with_handshake_ttl(mut self, seconds: u64) -> Self {
        self.handshake_ttl_seconds = seconds;
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }
}
