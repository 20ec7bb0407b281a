//! OAuth2 protocol types for Slack and Spotify.

use serde::{Deserialize, Serialize};

/// Query string Slack appends when redirecting back to the first hop
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackCallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Query string Spotify appends when redirecting back to the terminal hop
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpotifyCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Response body of Slack's `oauth.v2.access`.
///
/// `ok: false` responses carry only `error`, so everything else is optional at this
/// level. A present `authed_user` must carry both `id` and `access_token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackOAuthResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authed_user: Option<SlackAuthedUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<SlackTeam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackAuthedUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackTeam {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SlackOAuthResponse {
    /// The authorizing user, provided the response carries usable credentials.
    pub fn authorized_user(&self) -> Result<&SlackAuthedUser, String> {
        let user = self
            .authed_user
            .as_ref()
            .ok_or_else(|| "response has no authed_user".to_string())?;

        if user.id.trim().is_empty() {
            return Err("authed_user.id is empty".to_string());
        }
        if user.access_token.trim().is_empty() {
            return Err("authed_user.access_token is empty".to_string());
        }

        Ok(user)
    }
}

/// Spotify token endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}
