//! Container runtime layer.
//!
//! The reconciler talks to the runtime only through [`ContainerManager`]. The
//! Docker-backed implementation lives in [`DockerManager`], built on the
//! bollard API, and [`RuntimeInstaller`] prepares a fresh machine.
//!
//! ## Architecture
//!
//! - [`client`]: Docker/Podman API client wrapper with connection management
//! - [`config`]: container configuration builder for the Docker API
//! - [`docker`]: the managed container and the image update watcher
//! - [`install`]: runtime installation and daemon readiness
//!
//! ## Usage
//!
//! ```rust,no_run
//! use container_runner::container::{ContainerManager, ContainerSpec, DockerManager};
//! use container_runner::dotenv::EnvironmentSet;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = DockerManager::connect(Default::default()).await?;
//!
//!     let spec = ContainerSpec {
//!         image: "nginxdemos/hello".to_string(),
//!         host_port: 8080,
//!         container_port: 80,
//!         env: EnvironmentSet::new(),
//!     };
//!     manager.ensure_running(&spec).await?;
//!
//!     manager.stop().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod docker;
pub mod install;

pub use client::{ContainerClient, ContainerClientConfig, ContainerState, RuntimeType};
pub use config::{ContainerConfig, ContainerConfigBuilder};
pub use docker::{DockerManager, DockerManagerConfig};
pub use install::{InstallerConfig, RuntimeInstaller};

use crate::dotenv::EnvironmentSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker/Podman API error
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Container not found
    #[error("Container not found: {0}")]
    NotFound(String),

    /// Container configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Image pull error
    #[error("Failed to pull image {image}: {message}")]
    PullError { image: String, message: String },

    /// Runtime installation error
    #[error("Installation error: {0}")]
    InstallError(String),

    /// Operation exceeded its time bound
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Desired state of the managed container.
///
/// Two specs are equal only when image, both ports and every environment
/// variable match; any difference means the container must be recreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub host_port: u16,
    pub container_port: u16,
    pub env: EnvironmentSet,
}

impl ContainerSpec {
    /// Docker port key for the container side of the mapping.
    pub fn port_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

/// Control over the single managed container.
#[async_trait]
pub trait ContainerManager: Send + Sync {
    /// Whether the managed container is currently running.
    async fn is_running(&self) -> Result<bool>;

    /// Pull the image and (re)create the container so that it runs `spec`.
    async fn ensure_running(&self, spec: &ContainerSpec) -> Result<()>;

    /// Stop and remove the managed container, if any.
    async fn stop(&self) -> Result<()>;
}
