//! HTTP surface: the two OAuth callbacks, liveness and static files.

use crate::error::ApiError;
use axum::{
    Json, Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;
use tunestatus_oauth2::{AccountLinker, SlackCallbackQuery, SpotifyCallbackQuery};

/// Cookie carrying the sealed handshake between the two hops
pub const HANDSHAKE_COOKIE: &str = "tunestatus_handshake";

#[derive(Clone)]
pub struct AppState {
    pub linker: Arc<AccountLinker>,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(linker: AccountLinker, secure_cookies: bool) -> Self {
        Self {
            linker: Arc::new(linker),
            secure_cookies,
        }
    }
}

pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/slackAuth", get(slack_callback))
        .route("/callback", get(spotify_callback))
        .route("/users", get(health))
        .route("/health", get(health))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}

/// First hop: exchange the Slack code, stage the identity and send the user to Spotify.
pub async fn slack_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<SlackCallbackQuery>,
) -> Result<(CookieJar, Redirect), ApiError> {
    let redirect = state.linker.begin(query).await?;

    let ttl = state.linker.handshake_ttl();
    let max_age = time::Duration::seconds(ttl.num_seconds());
    let cookie = Cookie::build((HANDSHAKE_COOKIE, redirect.carrier))
        .path("/")
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .expires(time::OffsetDateTime::now_utc() + max_age);

    // 303 so the browser follows with a plain GET
    Ok((jar.add(cookie), Redirect::to(&redirect.authorize_url)))
}

/// Terminal hop: verify the carrier and state, exchange the Spotify code, persist.
pub async fn spotify_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<SpotifyCallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let carrier = jar.get(HANDSHAKE_COOKIE).map(|cookie| cookie.value().to_string());

    let identity = state.linker.complete(carrier.as_deref(), query).await?;
    info!(user_id = %identity.platform_user_id, "Account link completed");

    let jar = jar.remove(Cookie::build(HANDSHAKE_COOKIE).path("/"));
    let body = Json(json!({
        "status": "linked",
        "user_id": identity.platform_user_id,
    }));

    Ok((jar, body))
}

pub async fn health() -> &'static str {
    "OK"
}
