//! Core types and collaborator traits for linked Slack/Spotify identities.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod memory;

pub use memory::InMemoryIdentityStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Rejected identity: {0}")]
    Rejected(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

/// A Slack user linked to their Spotify account.
///
/// Only constructed once both providers have issued credentials; `new` refuses
/// empty credential fields so a half-finished handshake can never reach a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub platform_user_id: String,
    pub platform_access_token: String,
    pub streaming_access_token: String,
    pub streaming_refresh_token: String,
    pub streaming_token_expiry: DateTime<Utc>,
    pub streaming_token_type: String,
}

impl LinkedIdentity {
    pub fn new(
        platform_user_id: String,
        platform_access_token: String,
        streaming_access_token: String,
        streaming_refresh_token: String,
        streaming_token_expiry: DateTime<Utc>,
        streaming_token_type: String,
    ) -> StoreResult<Self> {
        let identity = Self {
            platform_user_id,
            platform_access_token,
            streaming_access_token,
            streaming_refresh_token,
            streaming_token_expiry,
            streaming_token_type,
        };
        identity.validate()?;
        Ok(identity)
    }

    /// Checks that every credential field is populated.
    pub fn validate(&self) -> StoreResult<()> {
        let fields = [
            ("platform_user_id", &self.platform_user_id),
            ("platform_access_token", &self.platform_access_token),
            ("streaming_access_token", &self.streaming_access_token),
            ("streaming_refresh_token", &self.streaming_refresh_token),
        ];

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(StoreError::Rejected(format!("{} is empty", name)));
            }
        }

        Ok(())
    }

    pub fn streaming_token_expired(&self) -> bool {
        Utc::now() >= self.streaming_token_expiry
    }
}

/// Persistence collaborator for linked identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert or overwrite the identity keyed by `platform_user_id`.
    async fn persist(&self, identity: LinkedIdentity) -> StoreResult<()>;

    async fn get(&self, platform_user_id: &str) -> StoreResult<Option<LinkedIdentity>>;

    async fn list(&self) -> StoreResult<Vec<LinkedIdentity>>;
}

/// The periodic "push currently playing track into status" job.
#[async_trait]
pub trait StatusSync: Send + Sync {
    async fn sync_status(&self) -> SyncResult<()>;
}
