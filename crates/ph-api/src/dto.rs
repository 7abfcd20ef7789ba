use chrono::{DateTime, Utc};
use ph_core::{Created, Delivery, LifecycleAck, Rotated};
use ph_db::{Resources, VpsInstance, VpsStatus};
use ph_infra::types::RuntimeHandle;
use serde::{Deserialize, Serialize};

// ── Requests ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateVpsRequest {
    pub memory_gib: i32,
    pub cpu_cores: i32,
    pub disk_gib: i32,
}

impl From<CreateVpsRequest> for Resources {
    fn from(req: CreateVpsRequest) -> Self {
        Resources {
            memory_gib: req.memory_gib,
            cpu_cores: req.cpu_cores,
            disk_gib: req.disk_gib,
        }
    }
}

// ── Responses ──────────────────────────────────────────────────────

/// Public view of an instance. Password and access token never leave the
/// notification channel.
#[derive(Debug, Serialize)]
pub struct VpsResponse {
    pub vps_id: String,
    pub container: String,
    pub memory_gib: i32,
    pub cpu_cores: i32,
    pub disk_gib: i32,
    pub username: String,
    pub owner_id: String,
    pub status: VpsStatus,
    pub created_at: DateTime<Utc>,
}

impl From<VpsInstance> for VpsResponse {
    fn from(vps: VpsInstance) -> Self {
        let container = RuntimeHandle(vps.runtime_handle).short().to_string();
        Self {
            vps_id: vps.vps_id,
            container,
            memory_gib: vps.resources.memory_gib,
            cpu_cores: vps.resources.cpu_cores,
            disk_gib: vps.resources.disk_gib,
            username: vps.credentials.username,
            owner_id: vps.owner_id,
            status: vps.status,
            created_at: vps.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub vps: VpsResponse,
    pub delivery: Delivery,
}

impl From<Created> for CreatedResponse {
    fn from(created: Created) -> Self {
        Self {
            vps: created.instance.into(),
            delivery: created.delivery,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub vps_id: String,
    pub status: VpsStatus,
}

impl From<LifecycleAck> for StatusResponse {
    fn from(ack: LifecycleAck) -> Self {
        Self {
            vps_id: ack.vps_id,
            status: ack.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RotatedResponse {
    pub vps_id: String,
    pub delivery: Delivery,
}

impl From<Rotated> for RotatedResponse {
    fn from(rotated: Rotated) -> Self {
        Self {
            vps_id: rotated.vps_id,
            delivery: rotated.delivery,
        }
    }
}
