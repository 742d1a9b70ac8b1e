//! Connection to the container runtime.
//!
//! The managed container and the Watchtower watcher live on whatever daemon
//! answers first: the local Docker endpoint (`DOCKER_HOST` or the default
//! socket), then the rootful Podman socket.

use crate::container::{ContainerError, Result};
use crate::env;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::SystemVersion;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for the runtime API.
#[derive(Debug, Clone)]
pub struct ContainerClientConfig {
    /// Per-request API timeout in seconds
    pub timeout: u64,
}

impl Default for ContainerClientConfig {
    fn default() -> Self {
        Self { timeout: 120 }
    }
}

/// Shared handle on the runtime API.
#[derive(Clone)]
pub struct ContainerClient {
    docker: Arc<Docker>,
}

impl ContainerClient {
    /// Connect with default settings.
    ///
    /// # Errors
    ///
    /// Returns error if no runtime endpoint answers a ping.
    pub async fn new() -> Result<Self> {
        Self::with_config(ContainerClientConfig::default()).await
    }

    /// Connect with `config` and ping the daemon once.
    ///
    /// # Errors
    ///
    /// Returns error if no runtime endpoint answers a ping.
    pub async fn with_config(config: ContainerClientConfig) -> Result<Self> {
        let client = Self {
            docker: Arc::new(open(&config)?),
        };
        client.ping().await?;
        Ok(client)
    }

    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| ContainerError::Other(format!("Container runtime did not answer ping: {}", e)))?;
        debug!("Container runtime answered ping");
        Ok(())
    }

    pub async fn version(&self) -> Result<SystemVersion> {
        self.docker
            .version()
            .await
            .map_err(|e| ContainerError::Other(format!("Failed to query runtime version: {}", e)))
    }

    /// Raw bollard handle.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Tell Docker from Podman by the components the daemon reports.
    pub async fn runtime_type(&self) -> Result<RuntimeType> {
        Ok(RuntimeType::from_version(&self.version().await?))
    }

    /// Whether `image` is already in the local store.
    ///
    /// # Errors
    ///
    /// Returns error on any API failure other than 404.
    pub async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(ContainerError::ApiError(e)),
        }
    }

    /// Whether a container called `name` exists in any state.
    pub async fn container_exists(&self, name: &str) -> Result<bool> {
        match self.container_state(name).await {
            Ok(_) => Ok(true),
            Err(ContainerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Current state of the container `name_or_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotFound`] if no such container exists.
    pub async fn container_state(&self, name_or_id: &str) -> Result<ContainerState> {
        let inspect = self
            .docker
            .inspect_container(
                name_or_id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    ContainerError::NotFound(name_or_id.to_string())
                } else {
                    ContainerError::ApiError(e)
                }
            })?;

        inspect
            .state
            .as_ref()
            .map(ContainerState::from)
            .ok_or_else(|| ContainerError::Other(format!("Container {} reported no state", name_or_id)))
    }
}

fn open(config: &ContainerClientConfig) -> Result<Docker> {
    match Docker::connect_with_local_defaults() {
        Ok(docker) => {
            info!("Using local container runtime endpoint");
            return Ok(docker.with_timeout(Duration::from_secs(config.timeout)));
        }
        Err(e) => debug!("Local runtime endpoint unavailable: {}", e),
    }

    #[cfg(unix)]
    {
        let socket = env::container::PODMAN_SOCKET;
        match Docker::connect_with_socket(socket, config.timeout, bollard::API_DEFAULT_VERSION) {
            Ok(docker) => {
                info!("Using Podman socket {}", socket);
                return Ok(docker);
            }
            Err(e) => debug!("Podman socket {} unavailable: {}", socket, e),
        }
    }

    Err(ContainerError::Other(
        "No container runtime reachable; is Docker installed and running?".to_string(),
    ))
}

fn is_not_found(e: &BollardError) -> bool {
    matches!(
        e,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Lifecycle state of a container as reported by inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Paused,
    /// Crash-looping under a restart policy
    Restarting,
    Stopped,
    Dead,
}

impl From<&bollard::models::ContainerState> for ContainerState {
    fn from(state: &bollard::models::ContainerState) -> Self {
        let flag = |f: Option<bool>| f.unwrap_or(false);

        if flag(state.running) && !flag(state.paused) && !flag(state.restarting) {
            ContainerState::Running
        } else if flag(state.paused) {
            ContainerState::Paused
        } else if flag(state.restarting) {
            ContainerState::Restarting
        } else if flag(state.dead) {
            ContainerState::Dead
        } else {
            ContainerState::Stopped
        }
    }
}

/// Which daemon implementation answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl RuntimeType {
    fn from_version(version: &SystemVersion) -> Self {
        let podman = version
            .components
            .iter()
            .flatten()
            .any(|c| c.name.to_lowercase().contains("podman"));

        if podman {
            RuntimeType::Podman
        } else {
            RuntimeType::Docker
        }
    }
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeType::Docker => write!(f, "Docker"),
            RuntimeType::Podman => write!(f, "Podman"),
        }
    }
}
