//! Slack to Spotify account linking over two chained OAuth2 authorization code flows.
//!
//! The first hop exchanges Slack's code, seals the Slack identity together with a
//! fresh anti-forgery token into a short-lived signed carrier, and sends the user
//! to Spotify. The second hop opens the carrier, checks the echoed state, exchanges
//! Spotify's code and persists the merged [`LinkedIdentity`].

mod client;
mod config;
mod error;
mod linker;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use client::LinkClient;
pub use config::{LinkConfig, SlackOAuthConfig, SpotifyOAuthConfig};
pub use error::{LinkError, OAuth2Error, OAuth2Result, Provider};
pub use linker::{AccountLinker, LinkRedirect};
pub use state::{
    HandshakeCodec, HandshakeState, MAX_HANDSHAKE_TTL_SECONDS, STATE_TOKEN_BYTES,
    generate_state_token,
};
pub use types::{
    SlackAuthedUser, SlackCallbackQuery, SlackOAuthResponse, SlackTeam, SpotifyCallbackQuery,
    SpotifyTokenResponse,
};

pub use tunestatus_core::{IdentityStore, LinkedIdentity};
