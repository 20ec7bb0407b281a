//! Integration and security tests for the linking handshake.

#[cfg(test)]
mod integration_tests {
    use crate::{
        AccountLinker, LinkConfig, LinkError, OAuth2Error, Provider, SlackCallbackQuery,
        SlackOAuthConfig, SpotifyCallbackQuery, SpotifyOAuthConfig,
    };
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::{Duration as StdDuration, Instant};
    use tunestatus_core::{
        IdentityStore, InMemoryIdentityStore, LinkedIdentity, StoreError, StoreResult,
    };
    use url::Url;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECRET: &str = "test-handshake-secret-0123456789abcdef";

    fn link_config(server: &MockServer) -> LinkConfig {
        let slack = SlackOAuthConfig {
            client_id: "slack_client".to_string(),
            client_secret: "slack_secret".to_string(),
            token_endpoint: format!("{}/api/oauth.v2.access", server.uri()),
            redirect_uri: None,
        };
        let spotify = SpotifyOAuthConfig {
            client_id: "spotify_client".to_string(),
            client_secret: "spotify_secret".to_string(),
            authorization_endpoint: format!("{}/authorize", server.uri()),
            token_endpoint: format!("{}/api/token", server.uri()),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            ..SpotifyOAuthConfig::default()
        };
        LinkConfig::new(slack, spotify, SECRET).with_http_timeout(5)
    }

    async fn mount_slack_success(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/oauth.v2.access"))
            .and(body_string_contains("code=abc123"))
            .and(body_string_contains("client_id=slack_client"))
            .and(body_string_contains("client_secret=slack_secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "app_id": "A1",
                "authed_user": {
                    "id": "U1",
                    "scope": "users.profile:write",
                    "access_token": "tok-a",
                    "token_type": "user"
                },
                "team": { "id": "T1", "name": "Team" }
            })))
            .mount(server)
            .await;
    }

    fn slack_query(code: &str) -> SlackCallbackQuery {
        SlackCallbackQuery {
            code: Some(code.to_string()),
            ..SlackCallbackQuery::default()
        }
    }

    fn spotify_query(code: &str, state: &str) -> SpotifyCallbackQuery {
        SpotifyCallbackQuery {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            error: None,
        }
    }

    struct FailingStore;

    #[async_trait]
    impl IdentityStore for FailingStore {
        async fn persist(&self, _identity: LinkedIdentity) -> StoreResult<()> {
            Err(StoreError::Backend("database unavailable".to_string()))
        }

        async fn get(&self, _platform_user_id: &str) -> StoreResult<Option<LinkedIdentity>> {
            Ok(None)
        }

        async fn list(&self) -> StoreResult<Vec<LinkedIdentity>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_full_handshake_persists_once() {
        let server = MockServer::start().await;
        mount_slack_success(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=spotify-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "spotify-access",
                "token_type": "Bearer",
                "scope": "user-read-currently-playing",
                "expires_in": 3600,
                "refresh_token": "spotify-refresh"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryIdentityStore::new());
        let linker = AccountLinker::new(link_config(&server), store.clone()).unwrap();

        let redirect = linker.begin(slack_query("abc123")).await.unwrap();
        let identity = linker
            .complete(
                Some(&redirect.carrier),
                spotify_query("spotify-code", &redirect.handshake.state),
            )
            .await
            .unwrap();

        assert_eq!(identity.platform_user_id, "U1");
        assert_eq!(identity.platform_access_token, "tok-a");
        assert_eq!(identity.streaming_access_token, "spotify-access");
        assert_eq!(identity.streaming_refresh_token, "spotify-refresh");
        assert_eq!(identity.streaming_token_type, "Bearer");
        assert!(identity.streaming_token_expiry > Utc::now() + Duration::minutes(59));

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("U1").await.unwrap(), Some(identity));
    }

    #[tokio::test]
    async fn test_first_hop_stages_identity_and_redirects() {
        let server = MockServer::start().await;
        mount_slack_success(&server).await;

        let store = Arc::new(InMemoryIdentityStore::new());
        let linker = AccountLinker::new(link_config(&server), store.clone()).unwrap();

        let before = Utc::now();
        let redirect = linker.begin(slack_query("abc123")).await.unwrap();

        assert_eq!(redirect.handshake.user_id, "U1");
        assert_eq!(redirect.handshake.slack_access_token, "tok-a");
        let ttl = redirect.handshake.expires_at - before;
        assert!(ttl > Duration::minutes(59) && ttl <= Duration::minutes(61));

        let url = Url::parse(&redirect.authorize_url).unwrap();
        assert_eq!(url.path(), "/authorize");
        let params: HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(
            params.get("state").map(|s| s.to_string()),
            Some(redirect.handshake.state.clone())
        );
        assert_eq!(params.get("client_id"), Some(&"spotify_client".into()));

        // nothing is persisted until the terminal hop
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_each_handshake_gets_a_fresh_state() {
        let server = MockServer::start().await;
        mount_slack_success(&server).await;

        let linker = AccountLinker::new(
            link_config(&server),
            Arc::new(InMemoryIdentityStore::new()),
        )
        .unwrap();

        let first = linker.begin(slack_query("abc123")).await.unwrap();
        let second = linker.begin(slack_query("abc123")).await.unwrap();
        assert_ne!(first.handshake.state, second.handshake.state);
        assert_ne!(first.carrier, second.carrier);
    }

    #[tokio::test]
    async fn test_slack_rejection_is_exchange_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth.v2.access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "error": "invalid_code"
            })))
            .mount(&server)
            .await;

        let linker = AccountLinker::new(
            link_config(&server),
            Arc::new(InMemoryIdentityStore::new()),
        )
        .unwrap();

        let result = linker.begin(slack_query("stale")).await;
        match result {
            Err(LinkError::AuthorizationExchangeFailed { provider, reason }) => {
                assert_eq!(provider, Provider::Slack);
                assert_eq!(reason, "invalid_code");
            }
            other => panic!("Expected AuthorizationExchangeFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_slack_responses_are_bad_requests() {
        let server = MockServer::start().await;
        let linker = AccountLinker::new(
            link_config(&server),
            Arc::new(InMemoryIdentityStore::new()),
        )
        .unwrap();

        // missing authed_user.access_token
        Mock::given(method("POST"))
            .and(path("/api/oauth.v2.access"))
            .and(body_string_contains("code=no-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "authed_user": { "id": "U1" }
            })))
            .mount(&server)
            .await;

        // not json
        Mock::given(method("POST"))
            .and(path("/api/oauth.v2.access"))
            .and(body_string_contains("code=garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        // upstream failure
        Mock::given(method("POST"))
            .and(path("/api/oauth.v2.access"))
            .and(body_string_contains("code=boom"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        for code in ["no-token", "garbage", "boom"] {
            let result = linker.begin(slack_query(code)).await;
            assert!(
                matches!(
                    result,
                    Err(LinkError::ProviderAuthBadRequest {
                        provider: Provider::Slack,
                        ..
                    })
                ),
                "code {} gave {:?}",
                code,
                result
            );
        }
    }

    #[tokio::test]
    async fn test_missing_slack_code_skips_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let linker = AccountLinker::new(
            link_config(&server),
            Arc::new(InMemoryIdentityStore::new()),
        )
        .unwrap();

        let result = linker.begin(SlackCallbackQuery::default()).await;
        assert!(matches!(
            result,
            Err(LinkError::ProviderAuthBadRequest { .. })
        ));

        let declined = SlackCallbackQuery {
            error: Some("access_denied".to_string()),
            ..SlackCallbackQuery::default()
        };
        let result = linker.begin(declined).await;
        assert!(matches!(
            result,
            Err(LinkError::AuthorizationExchangeFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_carrier_rejected_before_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryIdentityStore::new());
        let linker = AccountLinker::new(link_config(&server), store.clone()).unwrap();

        let result = linker.complete(None, spotify_query("code", "state")).await;
        assert!(matches!(result, Err(LinkError::InvalidCredentialCarrier)));

        let result = linker
            .complete(Some("forged.carrier.token"), spotify_query("code", "state"))
            .await;
        assert!(matches!(result, Err(LinkError::InvalidCredentialCarrier)));

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_state_mismatch_rejected_before_exchange() {
        let server = MockServer::start().await;
        mount_slack_success(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryIdentityStore::new());
        let linker = AccountLinker::new(link_config(&server), store.clone()).unwrap();
        let redirect = linker.begin(slack_query("abc123")).await.unwrap();

        let result = linker
            .complete(Some(&redirect.carrier), spotify_query("code", "forged-state"))
            .await;
        assert!(matches!(result, Err(LinkError::StateMismatch)));

        let absent = SpotifyCallbackQuery {
            code: Some("code".to_string()),
            state: None,
            error: None,
        };
        let result = linker.complete(Some(&redirect.carrier), absent).await;
        assert!(matches!(result, Err(LinkError::StateMismatch)));

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_carrier_from_other_handshake_is_rejected() {
        let server = MockServer::start().await;
        mount_slack_success(&server).await;

        let linker = AccountLinker::new(
            link_config(&server),
            Arc::new(InMemoryIdentityStore::new()),
        )
        .unwrap();

        let victim = linker.begin(slack_query("abc123")).await.unwrap();
        let attacker = linker.begin(slack_query("abc123")).await.unwrap();

        // attacker's callback state replayed against the victim's carrier
        let result = linker
            .complete(
                Some(&victim.carrier),
                spotify_query("code", &attacker.handshake.state),
            )
            .await;
        assert!(matches!(result, Err(LinkError::StateMismatch)));
    }

    #[tokio::test]
    async fn test_spotify_network_error_does_not_persist() {
        let server = MockServer::start().await;
        mount_slack_success(&server).await;

        let mut config = link_config(&server);
        // nothing listens on the discard port
        config.spotify.token_endpoint = "http://127.0.0.1:9/api/token".to_string();

        let store = Arc::new(InMemoryIdentityStore::new());
        let linker = AccountLinker::new(config, store.clone()).unwrap();
        let redirect = linker.begin(slack_query("abc123")).await.unwrap();

        let result = linker
            .complete(
                Some(&redirect.carrier),
                spotify_query("code", &redirect.handshake.state),
            )
            .await;

        assert!(matches!(
            result,
            Err(LinkError::AuthorizationExchangeFailed {
                provider: Provider::Spotify,
                ..
            })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_spotify_error_and_incomplete_tokens() {
        let server = MockServer::start().await;
        mount_slack_success(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("code=bad-grant"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid authorization code"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("code=no-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "spotify-access",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryIdentityStore::new());
        let linker = AccountLinker::new(link_config(&server), store.clone()).unwrap();

        for code in ["bad-grant", "no-refresh"] {
            let redirect = linker.begin(slack_query("abc123")).await.unwrap();
            let result = linker
                .complete(
                    Some(&redirect.carrier),
                    spotify_query(code, &redirect.handshake.state),
                )
                .await;
            assert!(
                matches!(result, Err(LinkError::AuthorizationExchangeFailed { .. })),
                "code {} gave {:?}",
                code,
                result
            );
        }

        let redirect = linker.begin(slack_query("abc123")).await.unwrap();
        let declined = SpotifyCallbackQuery {
            code: None,
            state: Some(redirect.handshake.state.clone()),
            error: Some("access_denied".to_string()),
        };
        let result = linker.complete(Some(&redirect.carrier), declined).await;
        assert!(matches!(
            result,
            Err(LinkError::AuthorizationExchangeFailed { .. })
        ));

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_surfaced() {
        let server = MockServer::start().await;
        mount_slack_success(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "spotify-access",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "spotify-refresh"
            })))
            .mount(&server)
            .await;

        let linker = AccountLinker::new(link_config(&server), Arc::new(FailingStore)).unwrap();
        let redirect = linker.begin(slack_query("abc123")).await.unwrap();

        let result = linker
            .complete(
                Some(&redirect.carrier),
                spotify_query("code", &redirect.handshake.state),
            )
            .await;
        assert!(matches!(result, Err(LinkError::PersistenceFailure(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_token_lifetime_is_exchange_failure() {
        for expires_in in [i64::MAX, -1] {
            let server = MockServer::start().await;
            mount_slack_success(&server).await;

            Mock::given(method("POST"))
                .and(path("/api/token"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "spotify-access",
                    "token_type": "Bearer",
                    "expires_in": expires_in,
                    "refresh_token": "spotify-refresh"
                })))
                .mount(&server)
                .await;

            let store = Arc::new(InMemoryIdentityStore::new());
            let linker = AccountLinker::new(link_config(&server), store.clone()).unwrap();
            let redirect = linker.begin(slack_query("abc123")).await.unwrap();

            let result = linker
                .complete(
                    Some(&redirect.carrier),
                    spotify_query("code", &redirect.handshake.state),
                )
                .await;

            assert!(
                matches!(
                    result,
                    Err(LinkError::AuthorizationExchangeFailed {
                        provider: Provider::Spotify,
                        ref reason,
                    }) if reason == "invalid expires_in"
                ),
                "expires_in = {}",
                expires_in
            );
            assert!(store.is_empty().await);
        }
    }

    #[tokio::test]
    async fn test_hung_slack_is_cut_off_by_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth.v2.access"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(StdDuration::from_secs(3))
                    .set_body_json(serde_json::json!({ "ok": true })),
            )
            .mount(&server)
            .await;

        let config = link_config(&server).with_http_timeout(1);
        let linker =
            AccountLinker::new(config, Arc::new(InMemoryIdentityStore::new())).unwrap();

        let started = Instant::now();
        let result = linker.begin(slack_query("abc123")).await;

        assert!(started.elapsed() < StdDuration::from_millis(2500));
        assert!(matches!(
            result,
            Err(LinkError::ProviderAuthBadRequest {
                provider: Provider::Slack,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_hung_spotify_is_cut_off_by_timeout() {
        let server = MockServer::start().await;
        mount_slack_success(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(StdDuration::from_secs(3))
                    .set_body_json(serde_json::json!({
                        "access_token": "spotify-access",
                        "token_type": "Bearer",
                        "expires_in": 3600,
                        "refresh_token": "spotify-refresh"
                    })),
            )
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryIdentityStore::new());
        let config = link_config(&server).with_http_timeout(1);
        let linker = AccountLinker::new(config, store.clone()).unwrap();
        let redirect = linker.begin(slack_query("abc123")).await.unwrap();

        let started = Instant::now();
        let result = linker
            .complete(
                Some(&redirect.carrier),
                spotify_query("code", &redirect.handshake.state),
            )
            .await;

        assert!(started.elapsed() < StdDuration::from_millis(2500));
        assert!(matches!(
            result,
            Err(LinkError::AuthorizationExchangeFailed {
                provider: Provider::Spotify,
                ..
            })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_carrier_is_rejected() {
        let server = MockServer::start().await;
        mount_slack_success(&server).await;

        // zero TTL: the carrier is already expired when it comes back
        let config = link_config(&server).with_handshake_ttl(0);
        let linker =
            AccountLinker::new(config, Arc::new(InMemoryIdentityStore::new())).unwrap();
        let redirect = linker.begin(slack_query("abc123")).await.unwrap();

        let result = linker
            .complete(
                Some(&redirect.carrier),
                spotify_query("code", &redirect.handshake.state),
            )
            .await;
        assert!(matches!(result, Err(LinkError::InvalidCredentialCarrier)));
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let config = LinkConfig::new(
            SlackOAuthConfig::default(),
            SpotifyOAuthConfig::default(),
            "",
        );
        let result = AccountLinker::new(config, Arc::new(InMemoryIdentityStore::new()));
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_handshake_ttl_is_rejected() {
        let config = LinkConfig::new(
            SlackOAuthConfig::default(),
            SpotifyOAuthConfig::default(),
            SECRET,
        )
        .with_handshake_ttl(u64::MAX);

        let result = AccountLinker::new(config, Arc::new(InMemoryIdentityStore::new()));
        assert!(matches!(result, Err(OAuth2Error::ConfigError(_))));
    }
}
