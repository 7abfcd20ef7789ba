use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::models::{RetiredIdentifier, VpsInstance, VpsUpdate};
use crate::{RegistryStore, Result, StoreError, UniqueKey, token_fingerprint};

const ACCESS_TOKEN_CONSTRAINT: &str = "vps_instances_access_token_key";

/// PostgreSQL-backed registry. The pool provides connection-level concurrency.
#[derive(Clone)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map unique violations on `vps_instances` to the key that collided.
fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        let key = match db.constraint() {
            Some(ACCESS_TOKEN_CONSTRAINT) => UniqueKey::AccessToken,
            _ => UniqueKey::VpsId,
        };
        return StoreError::Conflict(key);
    }
    StoreError::Database(err)
}

#[async_trait]
impl RegistryStore for PgRegistry {
    async fn insert(&self, instance: &VpsInstance) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if RetiredIdentifier::exists(&mut *tx, UniqueKey::VpsId.as_str(), &instance.vps_id).await? {
            return Err(StoreError::Conflict(UniqueKey::VpsId));
        }
        let fingerprint = token_fingerprint(&instance.access_token);
        if RetiredIdentifier::exists(&mut *tx, UniqueKey::AccessToken.as_str(), &fingerprint).await? {
            return Err(StoreError::Conflict(UniqueKey::AccessToken));
        }

        VpsInstance::insert(&mut tx, instance)
            .await
            .map_err(map_insert_error)?;
        tx.commit().await?;

        debug!(vps_id = %instance.vps_id, "registry: record inserted");
        Ok(())
    }

    async fn find_by_id(&self, vps_id: &str) -> Result<Option<VpsInstance>> {
        Ok(VpsInstance::get_by_id(&self.pool, vps_id).await?)
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<VpsInstance>> {
        Ok(VpsInstance::list_for_owner(&self.pool, owner_id).await?)
    }

    async fn list_all(&self) -> Result<Vec<VpsInstance>> {
        Ok(VpsInstance::list_all(&self.pool).await?)
    }

    async fn vps_id_taken(&self, vps_id: &str) -> Result<bool> {
        if VpsInstance::get_by_id(&self.pool, vps_id).await?.is_some() {
            return Ok(true);
        }
        Ok(RetiredIdentifier::exists(&self.pool, UniqueKey::VpsId.as_str(), vps_id).await?)
    }

    async fn update(&self, vps_id: &str, update: &VpsUpdate) -> Result<()> {
        match VpsInstance::update(&self.pool, vps_id, update).await? {
            0 => Err(StoreError::NotFound(vps_id.to_string())),
            _ => Ok(()),
        }
    }

    async fn remove(&self, vps_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(token) = VpsInstance::delete(&mut tx, vps_id).await? {
            RetiredIdentifier::insert(&mut tx, UniqueKey::VpsId.as_str(), vps_id).await?;
            RetiredIdentifier::insert(
                &mut tx,
                UniqueKey::AccessToken.as_str(),
                &token_fingerprint(&token),
            )
            .await?;
            debug!(vps_id, "registry: record removed");
        }

        tx.commit().await?;
        Ok(())
    }
}
