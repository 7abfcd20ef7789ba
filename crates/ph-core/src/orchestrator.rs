use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use ph_db::{Credentials, RegistryStore, Resources, StoreError, UniqueKey, VpsInstance, VpsStatus, VpsUpdate};
use ph_infra::ContainerRuntime;
use ph_infra::types::{ContainerSpec, RuntimeHandle};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

use crate::credentials::{
    CredentialSource, INITIAL_PASSWORD_LEN, ROTATED_PASSWORD_LEN, RandomCredentials, username_for,
};
use crate::error::{LifecycleError, Result};
use crate::locks::KeyedLocks;
use crate::notify::{Delivery, Notification, NotificationSink};

/// Upper bound on identifier regeneration before giving up.
pub const MAX_ID_ATTEMPTS: usize = 16;

/// Identity of whoever issued an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub display_name: String,
}

impl Caller {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Fixed set of administrator identities.
#[derive(Debug, Clone, Default)]
pub struct AdminSet(HashSet<String>);

impl AdminSet {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    /// Parse a comma-separated list, ignoring blanks.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Image every instance is created from.
    pub base_image: String,
    /// Container hostnames are `{hostname_prefix}-{vps_id}`.
    pub hostname_prefix: String,
    /// Restrict start/stop to the owner or an admin.
    pub owner_only_power: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_image: "ubuntu:22.04".into(),
            hostname_prefix: "powerhost".into(),
            owner_only_power: false,
        }
    }
}

/// Outcome of a successful create.
#[derive(Debug, Clone)]
pub struct Created {
    pub instance: VpsInstance,
    pub delivery: Delivery,
}

/// Outcome of a successful password rotation.
#[derive(Debug, Clone)]
pub struct Rotated {
    pub vps_id: String,
    pub delivery: Delivery,
}

/// Acknowledgement of a start, stop or delete, with the confirmed status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleAck {
    pub vps_id: String,
    pub status: VpsStatus,
}

#[derive(Debug, Clone, Copy)]
enum Power {
    Start,
    Stop,
}

impl Power {
    fn target(self) -> VpsStatus {
        match self {
            Self::Start => VpsStatus::Running,
            Self::Stop => VpsStatus::Stopped,
        }
    }
}

/// Sequences runtime calls with registry updates for every lifecycle intent.
///
/// Intents on the same `vps_id` run one at a time; intents on different ids
/// run in parallel. Each intent executes on its own task, so a caller that
/// goes away cannot abandon a runtime call between the call and the registry
/// update that records its outcome.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) registry: Arc<dyn RegistryStore>,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    notifier: Arc<dyn NotificationSink>,
    credentials: Arc<dyn CredentialSource>,
    admins: Arc<AdminSet>,
    config: Arc<OrchestratorConfig>,
    pub(crate) locks: Arc<KeyedLocks>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        runtime: Arc<dyn ContainerRuntime>,
        notifier: Arc<dyn NotificationSink>,
        admins: AdminSet,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            runtime,
            notifier,
            credentials: Arc::new(RandomCredentials),
            admins: Arc::new(admins),
            config: Arc::new(config),
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Replace the credential source (the default draws from the OS CSPRNG).
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn is_admin(&self, caller: &Caller) -> bool {
        self.admins.contains(&caller.id)
    }

    // ── Intents ─────────────────────────────────────────────────────

    /// Provision a container and record it. Admin only.
    pub async fn create_instance(&self, caller: &Caller, resources: Resources) -> Result<Created> {
        self.require_admin(caller, "create instances")?;
        validate_resources(&resources)?;

        let this = self.clone();
        let caller = caller.clone();
        detached(async move { this.create(caller, resources).await }).await
    }

    /// Instances owned by the caller.
    pub async fn list_instances(&self, caller: &Caller) -> Result<Vec<VpsInstance>> {
        Ok(self.registry.find_by_owner(&caller.id).await?)
    }

    /// A single instance, visible to its owner and to admins.
    pub async fn get_instance(&self, caller: &Caller, vps_id: &str) -> Result<VpsInstance> {
        let vps = self.find(vps_id).await?;
        self.require_owner_or_admin(caller, &vps)?;
        Ok(vps)
    }

    pub async fn start_instance(&self, caller: &Caller, vps_id: &str) -> Result<LifecycleAck> {
        self.power(caller, vps_id, Power::Start).await
    }

    pub async fn stop_instance(&self, caller: &Caller, vps_id: &str) -> Result<LifecycleAck> {
        self.power(caller, vps_id, Power::Stop).await
    }

    /// Remove the container and then the record. Admin only.
    pub async fn delete_instance(&self, caller: &Caller, vps_id: &str) -> Result<LifecycleAck> {
        self.require_admin(caller, "delete instances")?;

        let this = self.clone();
        let vps_id = vps_id.to_string();
        detached(async move { this.delete(vps_id).await }).await
    }

    /// Replace the password and deliver it. Owner or admin.
    pub async fn regenerate_credentials(&self, caller: &Caller, vps_id: &str) -> Result<Rotated> {
        let this = self.clone();
        let caller = caller.clone();
        let vps_id = vps_id.to_string();
        detached(async move { this.rotate(caller, vps_id).await }).await
    }

    // ── Sequencing ──────────────────────────────────────────────────

    async fn create(&self, caller: Caller, resources: Resources) -> Result<Created> {
        let (vps_id, guard) = self.reserve_vps_id().await?;

        let memory_gib = u32::try_from(resources.memory_gib)
            .map_err(|_| LifecycleError::InvalidRequest("memory_gib out of range".into()))?;
        let spec = ContainerSpec {
            image: self.config.base_image.clone(),
            memory_gib,
            hostname: format!("{}-{}", self.config.hostname_prefix, vps_id),
            labels: HashMap::from([
                ("powerhost.vps_id".to_string(), vps_id.clone()),
                ("powerhost.owner_id".to_string(), caller.id.clone()),
            ]),
        };

        let handle = match self.runtime.create_container(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(vps_id = %vps_id, owner_id = %caller.id, error = %e, "failed to create container");
                return Err(e.into());
            }
        };

        let mut instance = VpsInstance {
            vps_id: vps_id.clone(),
            access_token: self.credentials.access_token(),
            runtime_handle: handle.0.clone(),
            resources,
            credentials: Credentials {
                username: username_for(&caller.display_name),
                password: self.credentials.password(INITIAL_PASSWORD_LEN),
            },
            owner_id: caller.id.clone(),
            created_at: Utc::now(),
            status: VpsStatus::Running,
        };

        if let Err(e) = self.insert_with_fresh_token(&mut instance).await {
            self.discard_container(&vps_id, &handle).await;
            return Err(e);
        }
        drop(guard);

        info!(
            vps_id = %vps_id,
            owner_id = %caller.id,
            handle = %handle.short(),
            memory_gib = resources.memory_gib,
            cpu_cores = resources.cpu_cores,
            disk_gib = resources.disk_gib,
            runtime = self.runtime.name(),
            "vps created"
        );

        let delivery = self
            .deliver(
                &caller.id,
                Notification::Created {
                    vps_id: instance.vps_id.clone(),
                    username: instance.credentials.username.clone(),
                    password: instance.credentials.password.clone(),
                    container: handle.short().to_string(),
                    memory_gib: resources.memory_gib,
                    cpu_cores: resources.cpu_cores,
                    disk_gib: resources.disk_gib,
                },
            )
            .await;

        Ok(Created { instance, delivery })
    }

    async fn power(&self, caller: &Caller, vps_id: &str, op: Power) -> Result<LifecycleAck> {
        let this = self.clone();
        let caller = caller.clone();
        let vps_id = vps_id.to_string();
        detached(async move {
            let _guard = this.locks.lock(&vps_id).await;
            let vps = this.find(&vps_id).await?;
            if this.config.owner_only_power {
                this.require_owner_or_admin(&caller, &vps)?;
            }

            let handle = RuntimeHandle(vps.runtime_handle.clone());
            let result = match op {
                Power::Start => this.runtime.start(&handle).await,
                Power::Stop => this.runtime.stop(&handle).await,
            };
            match result {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(vps_id = %vps_id, handle = %handle.short(), "container missing from runtime");
                    return Err(LifecycleError::NotFoundInRuntime {
                        vps_id,
                        handle: handle.0,
                    });
                }
                Err(e) => {
                    error!(vps_id = %vps_id, ?op, error = %e, "runtime call failed");
                    return Err(e.into());
                }
            }

            let status = op.target();
            this.registry
                .update(&vps_id, &VpsUpdate::status(status))
                .await?;

            info!(vps_id = %vps_id, caller = %caller.id, %status, "vps power state changed");
            Ok(LifecycleAck { vps_id, status })
        })
        .await
    }

    async fn delete(&self, vps_id: String) -> Result<LifecycleAck> {
        let _guard = self.locks.lock(&vps_id).await;
        let vps = self.find(&vps_id).await?;
        let handle = RuntimeHandle(vps.runtime_handle.clone());

        let already_absent = match self.runtime.stop(&handle).await {
            Ok(()) => false,
            Err(e) if e.is_not_found() => true,
            Err(e) => {
                error!(vps_id = %vps_id, error = %e, "failed to stop container for deletion");
                return Err(e.into());
            }
        };

        if already_absent {
            warn!(vps_id = %vps_id, handle = %handle.short(), "container already gone, removing record");
        } else if let Err(e) = self.runtime.remove(&handle).await
            && !e.is_not_found()
        {
            error!(vps_id = %vps_id, error = %e, "failed to remove container");
            return Err(e.into());
        }

        self.registry.remove(&vps_id).await?;

        info!(vps_id = %vps_id, "vps deleted");
        Ok(LifecycleAck {
            vps_id,
            status: VpsStatus::Deleted,
        })
    }

    async fn rotate(&self, caller: Caller, vps_id: String) -> Result<Rotated> {
        let guard = self.locks.lock(&vps_id).await;
        let vps = self.find(&vps_id).await?;
        self.require_owner_or_admin(&caller, &vps)?;

        let mut password = self.credentials.password(ROTATED_PASSWORD_LEN);
        for _ in 1..MAX_ID_ATTEMPTS {
            if password != vps.credentials.password {
                break;
            }
            password = self.credentials.password(ROTATED_PASSWORD_LEN);
        }
        if password == vps.credentials.password {
            return Err(LifecycleError::Internal(
                "credential source keeps returning the current password".into(),
            ));
        }

        self.registry
            .update(&vps_id, &VpsUpdate::password(password.clone()))
            .await?;
        drop(guard);

        info!(vps_id = %vps_id, caller = %caller.id, "vps password rotated");

        let delivery = self
            .deliver(
                &caller.id,
                Notification::PasswordRotated {
                    vps_id: vps_id.clone(),
                    password,
                },
            )
            .await;

        Ok(Rotated { vps_id, delivery })
    }

    // ── Helpers ─────────────────────────────────────────────────────

    /// Pick an id no live or removed instance has used, and lock it.
    ///
    /// The lock is held until the record is inserted, so a concurrent create
    /// that draws the same id waits and then sees it taken.
    async fn reserve_vps_id(&self) -> Result<(String, OwnedMutexGuard<()>)> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let candidate = self.credentials.vps_id();
            let guard = self.locks.lock(&candidate).await;
            if !self.registry.vps_id_taken(&candidate).await? {
                return Ok((candidate, guard));
            }
            debug!(attempt, "vps id collision, regenerating");
        }
        Err(LifecycleError::IdSpaceExhausted(MAX_ID_ATTEMPTS))
    }

    async fn insert_with_fresh_token(&self, instance: &mut VpsInstance) -> Result<()> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            match self.registry.insert(instance).await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict(UniqueKey::AccessToken)) => {
                    debug!(attempt, vps_id = %instance.vps_id, "access token collision, regenerating");
                    instance.access_token = self.credentials.access_token();
                }
                Err(StoreError::Conflict(UniqueKey::VpsId)) => {
                    return Err(LifecycleError::Internal(format!(
                        "vps id {} was claimed by another writer",
                        instance.vps_id
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LifecycleError::IdSpaceExhausted(MAX_ID_ATTEMPTS))
    }

    /// Remove a container whose record could not be written.
    async fn discard_container(&self, vps_id: &str, handle: &RuntimeHandle) {
        match self.runtime.remove(handle).await {
            Ok(()) => warn!(vps_id, handle = %handle.short(), "registry insert failed, container removed"),
            Err(e) => error!(
                vps_id,
                handle = %handle.short(),
                error = %e,
                "registry insert failed and container cleanup failed"
            ),
        }
    }

    async fn deliver(&self, recipient: &str, notification: Notification) -> Delivery {
        match self.notifier.deliver(recipient, &notification).await {
            Ok(()) => Delivery::Delivered,
            Err(e) => {
                warn!(recipient, vps_id = notification.vps_id(), error = %e, "credential delivery failed");
                Delivery::Undelivered(e.to_string())
            }
        }
    }

    async fn find(&self, vps_id: &str) -> Result<VpsInstance> {
        self.registry
            .find_by_id(vps_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(vps_id.to_string()))
    }

    fn require_admin(&self, caller: &Caller, action: &str) -> Result<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(LifecycleError::Unauthorized(format!("only admins can {action}")))
        }
    }

    fn require_owner_or_admin(&self, caller: &Caller, vps: &VpsInstance) -> Result<()> {
        if vps.owner_id == caller.id || self.is_admin(caller) {
            Ok(())
        } else {
            Err(LifecycleError::Unauthorized(format!(
                "you don't own vps {}",
                vps.vps_id
            )))
        }
    }
}

fn validate_resources(resources: &Resources) -> Result<()> {
    for (name, value) in [
        ("memory_gib", resources.memory_gib),
        ("cpu_cores", resources.cpu_cores),
        ("disk_gib", resources.disk_gib),
    ] {
        if value < 1 {
            return Err(LifecycleError::InvalidRequest(format!(
                "{name} must be at least 1"
            )));
        }
    }
    Ok(())
}

/// Run an intent on its own task so it completes even if the caller drops.
async fn detached<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| LifecycleError::Internal(format!("intent task failed: {e}")))?
}
