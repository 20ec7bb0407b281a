use crate::{IdentityStore, LinkedIdentity, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of IdentityStore
#[derive(Clone, Default)]
pub struct InMemoryIdentityStore {
    identities: Arc<RwLock<HashMap<String, LinkedIdentity>>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.identities.read().await.is_empty()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn persist(&self, identity: LinkedIdentity) -> StoreResult<()> {
        identity.validate()?;

        let mut identities = self.identities.write().await;
        identities.insert(identity.platform_user_id.clone(), identity);
        Ok(())
    }

    async fn get(&self, platform_user_id: &str) -> StoreResult<Option<LinkedIdentity>> {
        let identities = self.identities.read().await;
        Ok(identities.get(platform_user_id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<LinkedIdentity>> {
        let identities = self.identities.read().await;
        Ok(identities.values().cloned().collect())
    }
}
