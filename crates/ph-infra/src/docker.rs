use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateImageOptionsBuilder, InspectContainerOptions, RemoveContainerOptionsBuilder,
    StartContainerOptions, StopContainerOptionsBuilder,
};
use futures_util::TryStreamExt;
use tracing::{info, warn};

use crate::types::{ContainerSpec, ContainerState, RuntimeHandle};
use crate::{ContainerRuntime, Error, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const STOP_GRACE_SECS: i32 = 10;

/// Local Docker daemon runtime, using the `bollard` client.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the local defaults (`DOCKER_HOST` or the unix socket).
    ///
    /// `DOCKER_TIMEOUT_SECS` bounds every call (default: 120).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let timeout = std::env::var("DOCKER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Unavailable(format!("connect: {e}")))?
            .with_timeout(Duration::from_secs(timeout));

        Ok(Self { docker })
    }

    /// Pull `image` if the daemon does not have it yet.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        let (from_image, tag) = match image.rsplit_once(':') {
            Some((img, tag)) => (img, tag),
            None => (image, "latest"),
        };
        info!(image, "docker: pulling image");

        self.docker
            .create_image(
                Some(
                    CreateImageOptionsBuilder::new()
                        .from_image(from_image)
                        .tag(tag)
                        .build(),
                ),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| creation_error(e, "pull image"))?;
        Ok(())
    }

    fn container_body(spec: &ContainerSpec) -> ContainerCreateBody {
        ContainerCreateBody {
            image: Some(spec.image.clone()),
            hostname: Some(spec.hostname.clone()),
            labels: Some(spec.labels.clone()),
            tty: Some(true),
            open_stdin: Some(true),
            host_config: Some(HostConfig {
                memory: Some(spec.memory_limit_bytes()),
                ..HostConfig::default()
            }),
            ..ContainerCreateBody::default()
        }
    }
}

/// A 304 means the container was already in the requested state.
fn is_not_modified(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

fn looks_exhausted(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["no space left", "out of memory", "insufficient", "cannot allocate"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Translate a bollard error for an operation on an existing container.
fn runtime_error(err: BollardError, handle: &RuntimeHandle, operation: &'static str) -> Error {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => Error::NotFound(handle.0.clone()),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => Error::Unexpected {
            operation,
            message: format!("{status_code}: {message}"),
        },
        BollardError::RequestTimeoutError => Error::Timeout(operation),
        other => Error::Unavailable(format!("{operation}: {other}")),
    }
}

/// Translate a bollard error raised while provisioning a new container.
fn creation_error(err: BollardError, operation: &'static str) -> Error {
    match err {
        BollardError::DockerResponseServerError { message, .. } if looks_exhausted(&message) => {
            Error::ResourceExhausted(message)
        }
        BollardError::RequestTimeoutError => Error::Timeout(operation),
        other => Error::Unavailable(format!("{operation}: {other}")),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<RuntimeHandle> {
        self.ensure_image(&spec.image).await?;

        let response = self
            .docker
            .create_container(
                None::<bollard::query_parameters::CreateContainerOptions>,
                Self::container_body(spec),
            )
            .await
            .map_err(|e| creation_error(e, "create container"))?;
        let handle = RuntimeHandle(response.id);

        // Clean up if the container cannot start
        if let Err(e) = self
            .docker
            .start_container(&handle.0, None::<StartContainerOptions>)
            .await
        {
            warn!(handle = %handle.short(), error = %e, "docker: start after create failed, removing");
            if let Err(cleanup) = self.remove(&handle).await {
                warn!(handle = %handle.short(), error = %cleanup, "docker: cleanup failed");
            }
            return Err(creation_error(e, "start container"));
        }

        info!(handle = %handle.short(), hostname = %spec.hostname, "docker: container created");
        Ok(handle)
    }

    async fn start(&self, handle: &RuntimeHandle) -> Result<()> {
        match self
            .docker
            .start_container(&handle.0, None::<StartContainerOptions>)
            .await
        {
            Ok(()) => {}
            Err(e) if is_not_modified(&e) => {}
            Err(e) => return Err(runtime_error(e, handle, "start")),
        }
        info!(handle = %handle.short(), "docker: container started");
        Ok(())
    }

    async fn stop(&self, handle: &RuntimeHandle) -> Result<()> {
        match self
            .docker
            .stop_container(
                &handle.0,
                Some(StopContainerOptionsBuilder::new().t(STOP_GRACE_SECS).build()),
            )
            .await
        {
            Ok(()) => {}
            Err(e) if is_not_modified(&e) => {}
            Err(e) => return Err(runtime_error(e, handle, "stop")),
        }
        info!(handle = %handle.short(), "docker: container stopped");
        Ok(())
    }

    async fn remove(&self, handle: &RuntimeHandle) -> Result<()> {
        match self
            .docker
            .remove_container(
                &handle.0,
                Some(RemoveContainerOptionsBuilder::new().force(true).v(true).build()),
            )
            .await
        {
            Ok(()) => {
                info!(handle = %handle.short(), "docker: container removed");
                Ok(())
            }
            Err(e) => match runtime_error(e, handle, "remove") {
                Error::NotFound(_) => {
                    warn!(handle = %handle.short(), "docker: container already removed");
                    Ok(())
                }
                other => Err(other),
            },
        }
    }

    async fn inspect(&self, handle: &RuntimeHandle) -> Result<ContainerState> {
        let details = self
            .docker
            .inspect_container(&handle.0, None::<InspectContainerOptions>)
            .await
            .map_err(|e| runtime_error(e, handle, "inspect"))?;

        let running = details
            .state
            .and_then(|state| state.running)
            .unwrap_or(false);

        Ok(if running {
            ContainerState::Running
        } else {
            ContainerState::Stopped
        })
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}
