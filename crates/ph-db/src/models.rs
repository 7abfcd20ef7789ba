use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

// ── VpsStatus ───────────────────────────────────────────────────────

/// Last confirmed runtime outcome for an instance.
///
/// `Deleted` is never stored: a deleted instance has no row. It is reported
/// back to callers as the outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "vps_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VpsStatus {
    Running,
    Stopped,
    Deleted,
}

impl VpsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for VpsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── VpsInstance ─────────────────────────────────────────────────────

/// Resources declared at creation. Immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Resources {
    pub memory_gib: i32,
    pub cpu_cores: i32,
    pub disk_gib: i32,
}

/// Login credentials. Only `password` changes, through rotation.
#[derive(Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct VpsInstance {
    pub vps_id: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub runtime_handle: String,
    #[sqlx(flatten)]
    pub resources: Resources,
    #[sqlx(flatten)]
    pub credentials: Credentials,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub status: VpsStatus,
}

/// Mutable fields of a record. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VpsUpdate {
    pub status: Option<VpsStatus>,
    pub password: Option<String>,
}

impl VpsUpdate {
    pub fn status(status: VpsStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Self::default()
        }
    }
}

impl VpsInstance {
    pub async fn insert(tx: &mut Transaction<'_, Postgres>, vps: &VpsInstance) -> sqlx::Result<()> {
        sqlx::query(
            r#"INSERT INTO vps_instances (vps_id, access_token, runtime_handle, memory_gib, cpu_cores, disk_gib,
                                          username, password, owner_id, created_at, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(&vps.vps_id)
        .bind(&vps.access_token)
        .bind(&vps.runtime_handle)
        .bind(vps.resources.memory_gib)
        .bind(vps.resources.cpu_cores)
        .bind(vps.resources.disk_gib)
        .bind(&vps.credentials.username)
        .bind(&vps.credentials.password)
        .bind(&vps.owner_id)
        .bind(vps.created_at)
        .bind(vps.status)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn get_by_id(pool: &PgPool, vps_id: &str) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM vps_instances WHERE vps_id = $1")
            .bind(vps_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_owner(pool: &PgPool, owner_id: &str) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as("SELECT * FROM vps_instances WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_all(pool)
            .await
    }

    pub async fn list_all(pool: &PgPool) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as("SELECT * FROM vps_instances ORDER BY created_at")
            .fetch_all(pool)
            .await
    }

    /// Returns the number of rows touched (0 when the record is absent).
    pub async fn update(pool: &PgPool, vps_id: &str, update: &VpsUpdate) -> sqlx::Result<u64> {
        let result = sqlx::query(
            r#"UPDATE vps_instances
               SET status   = COALESCE($1, status),
                   password = COALESCE($2, password)
               WHERE vps_id = $3"#,
        )
        .bind(update.status)
        .bind(update.password.as_deref())
        .bind(vps_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete the row, returning its access token if it existed.
    pub async fn delete(tx: &mut Transaction<'_, Postgres>, vps_id: &str) -> sqlx::Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("DELETE FROM vps_instances WHERE vps_id = $1 RETURNING access_token")
                .bind(vps_id)
                .fetch_optional(&mut **tx)
                .await?;
        Ok(row.map(|(token,)| token))
    }
}

// ── RetiredIdentifier ───────────────────────────────────────────────

pub struct RetiredIdentifier;

impl RetiredIdentifier {
    pub async fn insert(tx: &mut Transaction<'_, Postgres>, kind: &str, value: &str) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO retired_identifiers (kind, value) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(kind)
        .bind(value)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn exists<'e, E>(executor: E, kind: &str, value: &str) -> sqlx::Result<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM retired_identifiers WHERE kind = $1 AND value = $2)",
        )
        .bind(kind)
        .bind(value)
        .fetch_one(executor)
        .await?;
        Ok(exists)
    }
}
