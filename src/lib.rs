//! # Container Runner
//!
//! Runs a single OCI image as a managed Docker container and keeps it in line
//! with operator configuration, an env-file resource, a secret holding extra
//! environment variables and an optional PostgreSQL relation.
//!
//! ## Architecture Overview
//!
//! - **[`dotenv`]**: `.env` parsing into an ordered [`EnvironmentSet`]
//! - **[`secret`]**: Resolves the `env-vars` secret into environment variables
//! - **[`database`]**: Turns relation data into `APP_POSTGRES_URI`
//! - **[`container`]**: Docker client, managed container and runtime installer
//! - **[`reconciler`]**: Decides and applies the desired container state
//! - **[`hook`]**: Runs one lifecycle event against a unit directory
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use container_runner::{CharmConfig, HookEvent, hook};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CharmConfig {
//!         container_image_uri: "nginx".to_string(),
//!         host_port: 8080,
//!         ..CharmConfig::default()
//!     };
//!
//!     let state = hook::dispatch(HookEvent::ConfigChanged, Path::new("/var/lib/container-runner"), config).await?;
//!     println!("{}", state.status);
//!     Ok(())
//! }
//! ```

/// Operator configuration options and their validation.
pub mod config;

/// Container runtime integration.
///
/// Docker API client, the managed container lifecycle, Watchtower and the
/// installer for the runtime itself.
pub mod container;

/// Database relation binding.
pub mod database;

/// `.env` parsing.
pub mod dotenv;

/// Environment constants and path utilities.
///
/// Centralizes all hardcoded paths and names used throughout the
/// application for easier maintenance and consistency.
pub mod env;

/// Lifecycle event dispatch over a unit directory.
pub mod hook;

/// Reconciliation of the managed container and its persisted state.
pub mod reconciler;

/// Secret resolution.
pub mod secret;

// CLI module for command-line interface
pub mod cli;

pub use config::{CharmConfig, ConfigError, ConfigSnapshot};
pub use container::{ContainerError, ContainerManager, ContainerSpec};
pub use database::{DatabaseCredentials, RelationState};
pub use dotenv::{EnvironmentSet, ParseError};
pub use reconciler::{
    Action, HookEvent, Phase, ReconcileError, ReconcileInputs, Reconciler, RunnerState, UnitStatus,
};
pub use secret::{FileSecretStore, SecretError, SecretStore};
