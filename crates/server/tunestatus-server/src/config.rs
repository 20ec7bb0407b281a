//! Configuration for the tunestatus server
//!
//! Values are layered, later sources winning:
//! - Defaults
//! - Configuration file (config.toml, or the path in TUNESTATUS_CONFIG_FILE)
//! - Environment variables with the TUNESTATUS__ prefix (e.g. TUNESTATUS__SERVER__PORT)
//! - The legacy variables of the original deployment (PORT, SPOTIFY_SLACK_APP_*, SPOTIFY_ID, SPOTIFY_SECRET)

use crate::sync::NowPlayingConfig;
use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tunestatus_oauth2::{
    LinkConfig, MAX_HANDSHAKE_TTL_SECONDS, SlackOAuthConfig, SpotifyOAuthConfig,
    generate_state_token,
};

/// Minimum handshake signing key length in bytes
pub const MIN_HANDSHAKE_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub slack: SlackOAuthConfig,
    pub spotify: SpotifyOAuthConfig,
    pub handshake: HandshakeConfig,
    pub upstream: UpstreamConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,

    /// Configuration file the settings were read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1)
    pub host: IpAddr,

    /// Port to bind to (default: 3000)
    pub port: u16,

    /// Directory served for any path not matched by a route
    pub static_dir: Option<PathBuf>,

    /// Mark the handshake cookie `Secure` (disable only for plain-http local development)
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// HMAC key for the handshake carrier; generated per process when empty
    pub secret: String,

    /// Lifetime of a staged handshake (default: 3600 = 1 hour)
    pub ttl_seconds: u64,

    /// Set when `secret` was generated at startup rather than configured
    #[serde(skip)]
    pub generated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Timeout applied to every outbound Slack/Spotify call
    pub http_timeout_seconds: u64,

    pub spotify_api_base: String,

    pub slack_api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,

    /// Seconds between status syncs (default: 10)
    pub interval_seconds: u64,

    pub status_emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON document holding linked identities
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    /// Log format (pretty, json, compact)
    pub format: String,

    /// Whether to include the target module
    pub target: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            static_dir: Some(PathBuf::from("./static")),
            secure_cookies: true,
        }
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_seconds: 3600,
            generated: false,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            http_timeout_seconds: 10,
            spotify_api_base: "https://api.spotify.com/v1".to_string(),
            slack_api_base: "https://slack.com/api".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 10,
            status_emoji: ":headphones:".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/linked_identities.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            target: true,
        }
    }
}

impl Config {
    /// Load configuration from file, environment and legacy variables
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_path =
            std::env::var("TUNESTATUS_CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        let source = config_source(&config_path);
        if let Some(path) = &source {
            builder = builder.add_source(File::from(path.as_path()));
        }

        builder = builder.add_source(
            Environment::with_prefix("TUNESTATUS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut settings: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.source = source;
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.ensure_handshake_secret()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Apply the environment variables the original deployment used
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().context("Invalid PORT value")?;
        }

        if let Some(url) = lookup("SPOTIFY_SLACK_APP_SLACK_AUTH_URL") {
            self.slack.token_endpoint = url;
        }

        if let Some(url) = lookup("SPOTIFY_SLACK_APP_SPOTIFY_REDIRECT_URL") {
            self.spotify.redirect_uri = url;
        }

        if let Some(id) = lookup("SPOTIFY_SLACK_APP_SLACK_CLIENT_ID") {
            self.slack.client_id = id;
        }

        if let Some(secret) = lookup("SPOTIFY_SLACK_APP_SLACK_CLIENT_SECRET") {
            self.slack.client_secret = secret;
        }

        if let Some(id) = lookup("SPOTIFY_ID") {
            self.spotify.client_id = id;
        }

        if let Some(secret) = lookup("SPOTIFY_SECRET") {
            self.spotify.client_secret = secret;
        }

        Ok(())
    }

    /// Fill in a random per-process handshake secret when none is configured
    fn ensure_handshake_secret(&mut self) -> Result<()> {
        if self.handshake.secret.is_empty() {
            let first = generate_state_token().context("Failed to generate handshake secret")?;
            let second = generate_state_token().context("Failed to generate handshake secret")?;
            self.handshake.secret = format!("{}{}", first, second);
            self.handshake.generated = true;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.slack.client_id.is_empty() || self.slack.client_secret.is_empty() {
            anyhow::bail!("Slack client id and client secret must be configured");
        }

        if self.spotify.client_id.is_empty() || self.spotify.client_secret.is_empty() {
            anyhow::bail!("Spotify client id and client secret must be configured");
        }

        if self.spotify.redirect_uri.is_empty() {
            anyhow::bail!("Spotify redirect URI must be configured");
        }

        if self.handshake.secret.len() < MIN_HANDSHAKE_SECRET_LEN {
            anyhow::bail!(
                "Handshake secret must be at least {} bytes",
                MIN_HANDSHAKE_SECRET_LEN
            );
        }

        if self.handshake.ttl_seconds == 0 {
            anyhow::bail!("Handshake TTL must be greater than 0");
        }

        if self.handshake.ttl_seconds > MAX_HANDSHAKE_TTL_SECONDS {
            anyhow::bail!(
                "Handshake TTL must not exceed {} seconds",
                MAX_HANDSHAKE_TTL_SECONDS
            );
        }

        if self.upstream.http_timeout_seconds == 0 {
            anyhow::bail!("Upstream HTTP timeout must be greater than 0");
        }

        if self.sync.interval_seconds == 0 {
            anyhow::bail!("Sync interval must be greater than 0");
        }

        let valid_formats = ["pretty", "json", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.server.host, self.server.port))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_seconds)
    }

    /// The settings the account linker is constructed with
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig::new(
            self.slack.clone(),
            self.spotify.clone(),
            self.handshake.secret.clone(),
        )
        .with_handshake_ttl(self.handshake.ttl_seconds)
        .with_http_timeout(self.upstream.http_timeout_seconds)
    }

    pub fn now_playing_config(&self) -> NowPlayingConfig {
        NowPlayingConfig {
            spotify_api_base: self.upstream.spotify_api_base.clone(),
            slack_api_base: self.upstream.slack_api_base.clone(),
            status_emoji: self.sync.status_emoji.clone(),
            status_ttl: self.sync_interval(),
            http_timeout: Duration::from_secs(self.upstream.http_timeout_seconds),
        }
    }

    /// Get the log filter string for tracing
    pub fn log_filter(&self) -> String {
        if self.logging.level.contains('=') || self.logging.level.contains(',') {
            self.logging.level.clone()
        } else {
            format!(
                "tunestatus_server={},tunestatus_oauth2={},tower_http={},{}",
                self.logging.level, self.logging.level, self.logging.level, self.logging.level
            )
        }
    }
}

/// The configuration file to read, if one exists at `path`
fn config_source(path: &str) -> Option<PathBuf> {
    let path = PathBuf::from(path);
    path.is_file().then_some(path)
}
