#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ph_core::{
    AdminSet, Caller, CredentialSource, DeliveryError, Notification, NotificationSink,
    Orchestrator, OrchestratorConfig, RandomCredentials,
};
use ph_db::{MemoryRegistry, Resources};
use ph_infra::types::{ContainerSpec, ContainerState, RuntimeHandle};
use ph_infra::{ContainerRuntime, Error as RuntimeError};

pub const ADMIN: &str = "100";
pub const USER: &str = "200";
pub const OTHER: &str = "300";

pub fn admin() -> Caller {
    Caller::new(ADMIN, "Alice")
}

pub fn user() -> Caller {
    Caller::new(USER, "Bob")
}

pub fn other() -> Caller {
    Caller::new(OTHER, "Mallory")
}

pub fn small() -> Resources {
    Resources {
        memory_gib: 2,
        cpu_cores: 1,
        disk_gib: 10,
    }
}

// ── Runtime ─────────────────────────────────────────────────────────

/// In-memory container runtime with injectable failures.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, ContainerState>>,
    next_id: AtomicUsize,
    fail_create: Mutex<Option<RuntimeError>>,
    fail_stop: Mutex<Option<RuntimeError>>,
    fail_remove: Mutex<Option<RuntimeError>>,
    /// Completed start/stop calls in completion order.
    completed: Mutex<Vec<(String, ContainerState)>>,
    pub created_specs: Mutex<Vec<ContainerSpec>>,
    pub jitter: AtomicBool,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_create(&self, err: RuntimeError) {
        *self.fail_create.lock().unwrap() = Some(err);
    }

    pub fn fail_next_stop(&self, err: RuntimeError) {
        *self.fail_stop.lock().unwrap() = Some(err);
    }

    pub fn fail_next_remove(&self, err: RuntimeError) {
        *self.fail_remove.lock().unwrap() = Some(err);
    }

    /// Drop a container behind the orchestrator's back.
    pub fn vanish(&self, handle: &str) {
        self.containers.lock().unwrap().remove(handle);
    }

    /// Change a container's state behind the orchestrator's back.
    pub fn force_state(&self, handle: &str, state: ContainerState) {
        self.containers
            .lock()
            .unwrap()
            .insert(handle.to_string(), state);
    }

    pub fn state(&self, handle: &str) -> Option<ContainerState> {
        self.containers.lock().unwrap().get(handle).copied()
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    pub fn last_completed(&self, handle: &str) -> Option<ContainerState> {
        self.completed
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(h, _)| h == handle)
            .map(|(_, s)| *s)
    }

    async fn maybe_sleep(&self) {
        if self.jitter.load(Ordering::Relaxed) {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(Duration::from_millis((n % 7) as u64)).await;
        }
    }

    fn transition(&self, handle: &RuntimeHandle, state: ContainerState) -> ph_infra::Result<()> {
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(&handle.0) {
            Some(current) => {
                *current = state;
                self.completed
                    .lock()
                    .unwrap()
                    .push((handle.0.clone(), state));
                Ok(())
            }
            None => Err(RuntimeError::NotFound(handle.0.clone())),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> ph_infra::Result<RuntimeHandle> {
        if let Some(err) = self.fail_create.lock().unwrap().take() {
            return Err(err);
        }
        self.maybe_sleep().await;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = format!("{n:064x}");
        self.containers
            .lock()
            .unwrap()
            .insert(handle.clone(), ContainerState::Running);
        self.created_specs.lock().unwrap().push(spec.clone());
        Ok(RuntimeHandle(handle))
    }

    async fn start(&self, handle: &RuntimeHandle) -> ph_infra::Result<()> {
        self.maybe_sleep().await;
        self.transition(handle, ContainerState::Running)
    }

    async fn stop(&self, handle: &RuntimeHandle) -> ph_infra::Result<()> {
        if let Some(err) = self.fail_stop.lock().unwrap().take() {
            return Err(err);
        }
        self.maybe_sleep().await;
        self.transition(handle, ContainerState::Stopped)
    }

    async fn remove(&self, handle: &RuntimeHandle) -> ph_infra::Result<()> {
        if let Some(err) = self.fail_remove.lock().unwrap().take() {
            return Err(err);
        }
        self.containers.lock().unwrap().remove(&handle.0);
        Ok(())
    }

    async fn inspect(&self, handle: &RuntimeHandle) -> ph_infra::Result<ContainerState> {
        self.state(&handle.0)
            .ok_or_else(|| RuntimeError::NotFound(handle.0.clone()))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

// ── Notifications ───────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(String, Notification)>>,
    pub failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<(String, Notification)> {
        self.delivered.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(
        &self,
        recipient: &str,
        notification: &Notification,
    ) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError("direct messages disabled".into()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((recipient.to_string(), notification.clone()));
        Ok(())
    }
}

// ── Credentials ─────────────────────────────────────────────────────

/// Replays scripted ids, then falls back to random ones.
#[derive(Default)]
pub struct ScriptedCredentials {
    ids: Mutex<VecDeque<String>>,
    tokens: Mutex<VecDeque<String>>,
}

impl ScriptedCredentials {
    pub fn with_ids(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            ids: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        })
    }

    pub fn with_tokens(tokens: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            tokens: Mutex::new(tokens.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        })
    }
}

impl CredentialSource for ScriptedCredentials {
    fn vps_id(&self) -> String {
        self.ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RandomCredentials.vps_id())
    }

    fn access_token(&self) -> String {
        self.tokens
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RandomCredentials.access_token())
    }

    fn password(&self, len: usize) -> String {
        RandomCredentials.password(len)
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub registry: Arc<MemoryRegistry>,
    pub runtime: Arc<FakeRuntime>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let runtime = FakeRuntime::new();
        let sink = RecordingSink::new();
        let orchestrator = Orchestrator::new(
            registry.clone(),
            runtime.clone(),
            sink.clone(),
            AdminSet::new([ADMIN]),
            config,
        );
        Self {
            orchestrator,
            registry,
            runtime,
            sink,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.orchestrator = self.orchestrator.with_credentials(credentials);
        self
    }
}
