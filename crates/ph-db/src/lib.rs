pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use memory::MemoryRegistry;
pub use models::{Credentials, Resources, VpsInstance, VpsStatus, VpsUpdate};
pub use postgres::PgRegistry;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("vps {0} not found")]
    NotFound(String),

    #[error("{0} already in use")]
    Conflict(UniqueKey),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Columns that must never repeat, including across removed instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniqueKey {
    VpsId,
    AccessToken,
}

impl UniqueKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VpsId => "vps_id",
            Self::AccessToken => "access_token",
        }
    }
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable mapping from `vps_id` to the declared state of an instance.
///
/// Every method is atomic with respect to a single record. Implementations
/// carry their own concurrency safety and are shared behind an `Arc`.
#[async_trait]
pub trait RegistryStore: Send + Sync + 'static {
    /// Insert a new record. Fails with `Conflict` if the `vps_id` or
    /// `access_token` is live or was used by a removed instance.
    async fn insert(&self, instance: &VpsInstance) -> Result<()>;

    async fn find_by_id(&self, vps_id: &str) -> Result<Option<VpsInstance>>;

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<VpsInstance>>;

    async fn list_all(&self) -> Result<Vec<VpsInstance>>;

    /// Whether `vps_id` belongs to a live or previously removed instance.
    async fn vps_id_taken(&self, vps_id: &str) -> Result<bool>;

    /// Apply a partial update. Fails with `NotFound` if the record is absent.
    async fn update(&self, vps_id: &str, update: &VpsUpdate) -> Result<()>;

    /// Remove the record and retire its identifiers. Succeeds if already absent.
    async fn remove(&self, vps_id: &str) -> Result<()>;
}

/// Create a connection pool to PostgreSQL.
pub async fn create_pool(database_url: &str) -> std::result::Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Hex SHA-256 of an access token, kept after removal instead of the token itself.
pub(crate) fn token_fingerprint(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
