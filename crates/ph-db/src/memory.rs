use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{VpsInstance, VpsUpdate};
use crate::{RegistryStore, Result, StoreError, UniqueKey, token_fingerprint};

#[derive(Debug, Default)]
struct Tables {
    instances: HashMap<String, VpsInstance>,
    retired: HashSet<(UniqueKey, String)>,
}

/// In-process registry. Not durable; used for tests and single-node trials.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn insert(&self, instance: &VpsInstance) -> Result<()> {
        let mut tables = self.tables.write().await;

        let fingerprint = token_fingerprint(&instance.access_token);
        if tables.instances.contains_key(&instance.vps_id)
            || tables
                .retired
                .contains(&(UniqueKey::VpsId, instance.vps_id.clone()))
        {
            return Err(StoreError::Conflict(UniqueKey::VpsId));
        }
        if tables
            .instances
            .values()
            .any(|v| v.access_token == instance.access_token)
            || tables.retired.contains(&(UniqueKey::AccessToken, fingerprint))
        {
            return Err(StoreError::Conflict(UniqueKey::AccessToken));
        }

        tables
            .instances
            .insert(instance.vps_id.clone(), instance.clone());
        Ok(())
    }

    async fn find_by_id(&self, vps_id: &str) -> Result<Option<VpsInstance>> {
        Ok(self.tables.read().await.instances.get(vps_id).cloned())
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<VpsInstance>> {
        let tables = self.tables.read().await;
        Ok(tables
            .instances
            .values()
            .filter(|v| v.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<VpsInstance>> {
        let tables = self.tables.read().await;
        let mut all: Vec<_> = tables.instances.values().cloned().collect();
        all.sort_by_key(|v| v.created_at);
        Ok(all)
    }

    async fn vps_id_taken(&self, vps_id: &str) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.instances.contains_key(vps_id)
            || tables
                .retired
                .contains(&(UniqueKey::VpsId, vps_id.to_string())))
    }

    async fn update(&self, vps_id: &str, update: &VpsUpdate) -> Result<()> {
        let mut tables = self.tables.write().await;
        let vps = tables
            .instances
            .get_mut(vps_id)
            .ok_or_else(|| StoreError::NotFound(vps_id.to_string()))?;

        if let Some(status) = update.status {
            vps.status = status;
        }
        if let Some(password) = &update.password {
            vps.credentials.password = password.clone();
        }
        Ok(())
    }

    async fn remove(&self, vps_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(vps) = tables.instances.remove(vps_id) {
            tables.retired.insert((UniqueKey::VpsId, vps.vps_id));
            tables
                .retired
                .insert((UniqueKey::AccessToken, token_fingerprint(&vps.access_token)));
        }
        Ok(())
    }
}
