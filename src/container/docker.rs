//! Docker-backed container manager.
//!
//! Runs the single managed container and the Watchtower image update watcher.
//! The managed container is always recreated rather than restarted so that a
//! new environment or port mapping takes effect.

use crate::container::{
    ContainerClient, ContainerClientConfig, ContainerConfig, ContainerError, ContainerManager,
    ContainerSpec, ContainerState, Result,
};
use crate::env;
use async_trait::async_trait;
use futures::stream::StreamExt;
use tracing::{debug, info, warn};

/// Docker manager configuration.
#[derive(Debug, Clone)]
pub struct DockerManagerConfig {
    /// Name of the managed container
    pub container_name: String,
    /// Name of the watcher container
    pub watchtower_name: String,
    /// Stop timeout in seconds
    pub stop_timeout: i64,
    /// Automatically pull images if not present
    pub auto_pull: bool,
    /// Client configuration
    pub client: ContainerClientConfig,
}

impl Default for DockerManagerConfig {
    fn default() -> Self {
        Self {
            container_name: env::container::MANAGED_CONTAINER_NAME.to_string(),
            watchtower_name: env::container::WATCHTOWER_CONTAINER_NAME.to_string(),
            stop_timeout: 10,
            auto_pull: true,
            client: ContainerClientConfig::default(),
        }
    }
}

/// Manages the managed container through the Docker API.
pub struct DockerManager {
    client: ContainerClient,
    config: DockerManagerConfig,
}

impl DockerManager {
    /// Connect to the container runtime.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn connect(config: DockerManagerConfig) -> Result<Self> {
        let client = ContainerClient::with_config(config.client.clone()).await?;
        Ok(Self { client, config })
    }

    /// Get the underlying client.
    pub fn client(&self) -> &ContainerClient {
        &self.client
    }

    /// Pull a container image if not present locally.
    ///
    /// # Errors
    ///
    /// Returns error if image pull fails.
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.client.image_exists(image).await? {
            debug!("Image {} already exists locally", image);
            return Ok(());
        }

        self.pull_image(image).await
    }

    /// Pull a container image from registry.
    ///
    /// # Errors
    ///
    /// Returns error if image pull fails.
    pub async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image: {}", image);

        let mut stream = self.client.docker().create_image(
            Some(bollard::image::CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status: {}", status);
                    }
                    if let Some(error) = info.error {
                        return Err(ContainerError::PullError {
                            image: image.to_string(),
                            message: error,
                        });
                    }
                }
                Err(e) => {
                    return Err(ContainerError::PullError {
                        image: image.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!("Successfully pulled image: {}", image);
        Ok(())
    }

    /// Run Watchtower so the managed image is refreshed when a new version is
    /// published. Does nothing if the watcher already exists.
    ///
    /// # Errors
    ///
    /// Returns error if the watcher cannot be created or started.
    pub async fn run_watchtower(&self) -> Result<()> {
        let name = self.config.watchtower_name.as_str();
        if self.client.container_exists(name).await? {
            debug!("Watchtower container {} already exists", name);
            if self.client.container_state(name).await? != ContainerState::Running {
                self.start_container(name).await?;
            }
            return Ok(());
        }

        let config = ContainerConfig::builder()
            .image(env::container::WATCHTOWER_IMAGE)
            .bind(format!(
                "{0}:{0}",
                env::container::DOCKER_SOCKET
            ))
            .label(env::container::MANAGED_BY_LABEL, env!("CARGO_PKG_NAME"))
            .restart_unless_stopped()
            .build()?;

        self.create_container(&config, name).await?;
        self.start_container(name).await?;
        info!("Successfully started Watchtower to monitor: {}", self.config.container_name);
        Ok(())
    }

    async fn create_container(&self, config: &ContainerConfig, name: &str) -> Result<String> {
        if self.config.auto_pull {
            self.ensure_image(config.image()).await?;
        }

        let options = bollard::container::CreateContainerOptions {
            name,
            ..Default::default()
        };

        debug!("Creating container: {}", name);

        use bollard::container::Config as BollardConfig;

        let bollard_config = BollardConfig {
            image: Some(config.image.clone()),
            env: config.env.clone(),
            labels: config.labels.clone(),
            exposed_ports: config.exposed_ports.clone(),
            host_config: Some(config.host_config.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .docker()
            .create_container(Some(options), bollard_config)
            .await?;

        info!("Created container: {} ({})", name, response.id);
        Ok(response.id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        debug!("Starting container: {}", name);

        self.client
            .docker()
            .start_container(
                name,
                None::<bollard::container::StartContainerOptions<String>>,
            )
            .await?;

        info!("Started container: {}", name);
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        debug!("Stopping container: {}", name);

        self.client
            .docker()
            .stop_container(
                name,
                Some(bollard::container::StopContainerOptions {
                    t: self.config.stop_timeout,
                }),
            )
            .await?;

        info!("Stopped container: {}", name);
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        debug!("Removing container: {}", name);

        self.client
            .docker()
            .remove_container(
                name,
                Some(bollard::container::RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;

        info!("Removed container: {}", name);
        Ok(())
    }

    /// Stop and remove the managed container if it exists.
    async fn remove_managed(&self) -> Result<()> {
        let name = self.config.container_name.as_str();
        if !self.client.container_exists(name).await? {
            debug!("Container {} does not exist", name);
            return Ok(());
        }

        // Try to stop first, but don't fail if already stopped
        if let Err(e) = self.stop_container(name).await {
            warn!("Failed to stop container {}: {}", name, e);
        }

        self.remove_container(name).await
    }
}

/// Docker configuration for the managed container running `spec`.
pub(crate) fn managed_container_config(spec: &ContainerSpec) -> Result<ContainerConfig> {
    ContainerConfig::builder()
        .image(spec.image.as_str())
        .envs(spec.env.iter())
        .port_binding(spec.port_key(), spec.host_port)
        .label(env::container::MANAGED_BY_LABEL, env!("CARGO_PKG_NAME"))
        .restart_unless_stopped()
        .build()
}

#[async_trait]
impl ContainerManager for DockerManager {
    async fn is_running(&self) -> Result<bool> {
        match self.client.container_state(&self.config.container_name).await {
            Ok(state) => Ok(state == ContainerState::Running),
            Err(ContainerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn ensure_running(&self, spec: &ContainerSpec) -> Result<()> {
        let config = managed_container_config(spec)?;

        self.remove_managed().await?;

        let name = self.config.container_name.as_str();
        self.create_container(&config, name).await?;
        self.start_container(name).await?;

        info!(
            "Managed container {} running {} on {}:{} with {} env vars",
            name,
            spec.image,
            spec.host_port,
            spec.port_key(),
            spec.env.len()
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.remove_managed().await
    }
}
