//! Now-playing status sync: Spotify's current track into the Slack profile status.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use tunestatus_core::{IdentityStore, LinkedIdentity, StatusSync, SyncError, SyncResult};

/// Slack rejects status text longer than this
pub const MAX_STATUS_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct NowPlayingConfig {
    pub spotify_api_base: String,
    pub slack_api_base: String,
    pub status_emoji: String,
    /// How long a status stays up if no later sync replaces it
    pub status_ttl: Duration,
    pub http_timeout: Duration,
}

impl Default for NowPlayingConfig {
    fn default() -> Self {
        Self {
            spotify_api_base: "https://api.spotify.com/v1".to_string(),
            slack_api_base: "https://slack.com/api".to_string(),
            status_emoji: ":headphones:".to_string(),
            status_ttl: Duration::from_secs(10),
            http_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CurrentlyPlaying {
    #[serde(default)]
    is_playing: bool,
    item: Option<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SlackApiResponse {
    ok: bool,
    error: Option<String>,
}

/// What a sync did for one linked user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSyncOutcome {
    Updated(String),
    NothingPlaying,
    TokenExpired,
}

pub struct NowPlayingSync {
    store: Arc<dyn IdentityStore>,
    http_client: Client,
    config: NowPlayingConfig,
}

impl NowPlayingSync {
    pub fn new(store: Arc<dyn IdentityStore>, config: NowPlayingConfig) -> SyncResult<Self> {
        let http_client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| SyncError::Upstream(e.to_string()))?;

        Ok(Self {
            store,
            http_client,
            config,
        })
    }

    #[instrument(skip(self, identity), fields(user_id = %identity.platform_user_id))]
    pub async fn sync_user(&self, identity: &LinkedIdentity) -> SyncResult<UserSyncOutcome> {
        if identity.streaming_token_expired() {
            warn!("Spotify token expired, skipping status update");
            return Ok(UserSyncOutcome::TokenExpired);
        }

        let Some(track) = self.currently_playing(identity).await? else {
            debug!("Nothing playing");
            return Ok(UserSyncOutcome::NothingPlaying);
        };

        let status = status_text(&track);
        self.set_status(identity, &status).await?;
        debug!("Status updated");
        Ok(UserSyncOutcome::Updated(status))
    }

    async fn currently_playing(&self, identity: &LinkedIdentity) -> SyncResult<Option<Track>> {
        let url = format!(
            "{}/me/player/currently-playing",
            self.config.spotify_api_base.trim_end_matches('/')
        );

        let response = self
            .http_client
            .get(url)
            .bearer_auth(&identity.streaming_access_token)
            .send()
            .await
            .map_err(|e| SyncError::Upstream(format!("spotify: {}", e)))?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SyncError::Upstream(format!(
                "spotify returned {}",
                response.status()
            )));
        }

        let playing: CurrentlyPlaying = response
            .json()
            .await
            .map_err(|e| SyncError::Upstream(format!("spotify: {}", e)))?;

        let is_playing = playing.is_playing;
        Ok(playing.item.filter(|_| is_playing))
    }

    async fn set_status(&self, identity: &LinkedIdentity, status: &str) -> SyncResult<()> {
        let url = format!(
            "{}/users.profile.set",
            self.config.slack_api_base.trim_end_matches('/')
        );
        let expiration = Utc::now().timestamp() + self.config.status_ttl.as_secs() as i64;

        let response: SlackApiResponse = self
            .http_client
            .post(url)
            .bearer_auth(&identity.platform_access_token)
            .json(&json!({
                "profile": {
                    "status_text": status,
                    "status_emoji": self.config.status_emoji,
                    "status_expiration": expiration,
                }
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SyncError::Upstream(format!("slack: {}", e)))?
            .json()
            .await
            .map_err(|e| SyncError::Upstream(format!("slack: {}", e)))?;

        if !response.ok {
            return Err(SyncError::Upstream(format!(
                "slack rejected status: {}",
                response.error.unwrap_or_else(|| "unknown_error".to_string())
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl StatusSync for NowPlayingSync {
    async fn sync_status(&self) -> SyncResult<()> {
        let identities = self.store.list().await?;
        let mut updated = 0usize;

        for identity in &identities {
            match self.sync_user(identity).await {
                Ok(UserSyncOutcome::Updated(_)) => updated += 1,
                Ok(_) => {}
                Err(e) => warn!(user_id = %identity.platform_user_id, error = %e, "Status sync failed for user"),
            }
        }

        if updated > 0 {
            info!(updated, total = identities.len(), "Pushed now-playing statuses");
        }
        Ok(())
    }
}

fn status_text(track: &Track) -> String {
    let artists = track
        .artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let text = if artists.is_empty() {
        track.name.clone()
    } else {
        format!("{} - {}", track.name, artists)
    };

    text.chars().take(MAX_STATUS_LEN).collect()
}
