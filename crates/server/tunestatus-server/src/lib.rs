//! Tunestatus HTTP server
//!
//! Hosts the Slack -> Spotify account linking callbacks and the periodic job
//! that mirrors each linked user's currently playing track into their Slack
//! status.

pub mod config;
pub mod error;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::ApiError;
pub use routes::{AppState, HANDSHAKE_COOKIE, router};
pub use scheduler::SyncScheduler;
pub use store::JsonFileIdentityStore;
pub use sync::{NowPlayingConfig, NowPlayingSync};
