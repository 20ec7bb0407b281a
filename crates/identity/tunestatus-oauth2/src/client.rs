//! HTTP client for the Slack and Spotify OAuth2 endpoints.

use crate::config::{SlackOAuthConfig, SpotifyOAuthConfig};
use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::{SlackOAuthResponse, SpotifyTokenResponse};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// OAuth2 client for both hops of the linking handshake.
///
/// Every request is bounded by the client-wide timeout.
#[derive(Clone)]
pub struct LinkClient {
    http_client: Client,
}

impl LinkClient {
    pub fn new(http_timeout_seconds: u64) -> OAuth2Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(http_timeout_seconds))
            .build()?;

        Ok(Self { http_client })
    }

    /// Exchange Slack's authorization code via `oauth.v2.access`.
    pub async fn exchange_slack_code(
        &self,
        config: &SlackOAuthConfig,
        code: &str,
    ) -> OAuth2Result<SlackOAuthResponse> {
        let mut params = vec![
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ];
        if let Some(redirect_uri) = &config.redirect_uri {
            params.push(("redirect_uri", redirect_uri.as_str()));
        }

        let response = self
            .http_client
            .post(&config.token_endpoint)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Slack token exchange failed");
            return Err(OAuth2Error::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let slack_response: SlackOAuthResponse = serde_json::from_str(&body)
            .map_err(|e| OAuth2Error::InvalidTokenResponse(e.to_string()))?;

        debug!(ok = slack_response.ok, "Received Slack token response");
        Ok(slack_response)
    }

    /// Build the Spotify authorize URL carrying `state`.
    pub fn spotify_authorization_url(
        &self,
        config: &SpotifyOAuthConfig,
        state: &str,
    ) -> OAuth2Result<String> {
        let mut url = Url::parse(&config.authorization_endpoint)?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &config.client_id);
            params.append_pair("redirect_uri", &config.redirect_uri);
            params.append_pair("state", state);

            if !config.scopes.is_empty() {
                params.append_pair("scope", &config.scopes.join(" "));
            }
            if config.show_dialog {
                params.append_pair("show_dialog", "true");
            }
        }

        Ok(url.to_string())
    }

    /// Exchange Spotify's authorization code for access and refresh tokens.
    pub async fn exchange_spotify_code(
        &self,
        config: &SpotifyOAuthConfig,
        code: &str,
    ) -> OAuth2Result<SpotifyTokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
        ];

        let response = self
            .http_client
            .post(&config.token_endpoint)
            .basic_auth(&config.client_id, Some(&config.client_secret))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Spotify token exchange failed");
            return Err(OAuth2Error::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: SpotifyTokenResponse = response
            .json()
            .await
            .map_err(|e| OAuth2Error::InvalidTokenResponse(e.to_string()))?;

        debug!("Successfully exchanged Spotify code for tokens");
        Ok(token_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_spotify_authorization_url() {
        let client = LinkClient::new(5).unwrap();
        let config = SpotifyOAuthConfig {
            client_id: "spotify_client".to_string(),
            client_secret: "spotify_secret".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            ..SpotifyOAuthConfig::default()
        };

        let auth_url = client
            .spotify_authorization_url(&config, "state-123")
            .unwrap();

        let url = Url::parse(&auth_url).unwrap();
        assert_eq!(url.host_str(), Some("accounts.spotify.com"));
        assert_eq!(url.path(), "/authorize");

        let params: HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(params.get("response_type"), Some(&"code".into()));
        assert_eq!(params.get("client_id"), Some(&"spotify_client".into()));
        assert_eq!(
            params.get("redirect_uri"),
            Some(&"http://localhost:3000/callback".into())
        );
        assert_eq!(params.get("state"), Some(&"state-123".into()));
        assert_eq!(
            params.get("scope"),
            Some(&"user-read-currently-playing".into())
        );
        assert!(!params.contains_key("client_secret"));
        assert!(!params.contains_key("show_dialog"));
    }

    #[test]
    fn test_invalid_authorization_endpoint() {
        let client = LinkClient::new(5).unwrap();
        let config = SpotifyOAuthConfig {
            authorization_endpoint: "not a url".to_string(),
            ..SpotifyOAuthConfig::default()
        };

        let result = client.spotify_authorization_url(&config, "state");
        assert!(matches!(result, Err(OAuth2Error::UrlError(_))));
    }
}
