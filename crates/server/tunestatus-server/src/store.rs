//! JSON-file backed identity store
//!
//! All linked identities live in a single JSON document keyed by Slack user id.
//! Writes are serialised and committed by writing a sibling temp file and
//! renaming it over the document, so a crash mid-write leaves the previous
//! version intact.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};
use tunestatus_core::{IdentityStore, LinkedIdentity, StoreResult};

pub struct JsonFileIdentityStore {
    path: PathBuf,
    identities: Mutex<HashMap<String, LinkedIdentity>>,
}

impl JsonFileIdentityStore {
    /// Open the store, creating the parent directory and loading any existing document.
    #[instrument]
    pub async fn open(path: impl AsRef<Path> + std::fmt::Debug) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create storage directory: {}", e);
                e
            })?;
        }

        let identities = if fs::try_exists(&path).await? {
            let json = fs::read_to_string(&path).await?;
            let identities: HashMap<String, LinkedIdentity> = serde_json::from_str(&json)
                .map_err(|e| {
                    error!("Failed to deserialize identity store: {}", e);
                    e
                })?;
            info!(count = identities.len(), "Loaded linked identities");
            identities
        } else {
            info!("No existing identity store found, starting empty");
            HashMap::new()
        };

        Ok(Self {
            path,
            identities: Mutex::new(identities),
        })
    }

    async fn write_document(&self, identities: &HashMap<String, LinkedIdentity>) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(identities)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            error!(file = ?self.path, "Failed to commit identity store: {}", e);
            e
        })?;

        debug!(count = identities.len(), "Identity store written");
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for JsonFileIdentityStore {
    #[instrument(skip(self, identity), fields(user_id = %identity.platform_user_id))]
    async fn persist(&self, identity: LinkedIdentity) -> StoreResult<()> {
        identity.validate()?;

        let mut identities = self.identities.lock().await;
        let mut next = identities.clone();
        next.insert(identity.platform_user_id.clone(), identity);

        self.write_document(&next).await?;
        *identities = next;
        Ok(())
    }

    async fn get(&self, platform_user_id: &str) -> StoreResult<Option<LinkedIdentity>> {
        Ok(self.identities.lock().await.get(platform_user_id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<LinkedIdentity>> {
        Ok(self.identities.lock().await.values().cloned().collect())
    }
}
