//! Lifecycle orchestration for container-backed VPS instances.
//!
//! The [`Orchestrator`] maps caller intents onto runtime calls and keeps the
//! registry in step with what the runtime actually confirmed.

pub mod credentials;
pub mod error;
pub mod locks;
pub mod notify;
pub mod orchestrator;
mod reconcile;

pub use credentials::{CredentialSource, RandomCredentials};
pub use error::{LifecycleError, Result};
pub use notify::{Delivery, DeliveryError, Notification, NotificationSink};
pub use orchestrator::{
    AdminSet, Caller, Created, LifecycleAck, Orchestrator, OrchestratorConfig, Rotated,
};
pub use reconcile::ReconcileReport;
