pub mod docker;
pub mod types;

use async_trait::async_trait;
use types::{ContainerSpec, ContainerState, RuntimeHandle};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("container {0} not found in runtime")]
    NotFound(String),

    #[error("runtime resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("container runtime timed out during {0}")]
    Timeout(&'static str),

    #[error("container runtime error during {operation}: {message}")]
    Unexpected {
        operation: &'static str,
        message: String,
    },
}

impl Error {
    /// The runtime has no container for the handle.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Contract over the container runtime backing VPS instances.
///
/// Calls complete or fail on their own; callers never cancel one mid-flight.
/// Timeouts are surfaced as `Error::Timeout`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Create and start a container. Fails with `ResourceExhausted` or
    /// `Unavailable`; a container that fails to start is removed again.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<RuntimeHandle>;

    /// Start a container. Already running is a no-op success.
    async fn start(&self, handle: &RuntimeHandle) -> Result<()>;

    /// Stop a container. Already stopped is a no-op success.
    async fn stop(&self, handle: &RuntimeHandle) -> Result<()>;

    /// Remove a container. Already absent is a no-op success.
    async fn remove(&self, handle: &RuntimeHandle) -> Result<()>;

    /// Report whether the container is currently running.
    async fn inspect(&self, handle: &RuntimeHandle) -> Result<ContainerState>;

    /// Runtime identifier, for logs.
    fn name(&self) -> &'static str;
}
