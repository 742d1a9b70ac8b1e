//! Hook dispatch.
//!
//! Glues one lifecycle event to a reconciliation: reads the unit directory
//! (persisted state, env-file resource, relation data, secrets), runs the
//! [`Reconciler`] and writes the resulting state back.

use crate::config::{CharmConfig, ConfigError};
use crate::container::{
    ContainerError, ContainerManager, DockerManager, DockerManagerConfig, RuntimeInstaller,
};
use crate::database::RelationState;
use crate::env;
use crate::reconciler::{
    HookEvent, Phase, ReconcileError, ReconcileInputs, Reconciler, Reconciliation, RunnerState,
    StateStore, UnitStatus,
};
use crate::secret::{FileSecretStore, SecretStore};
use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Everything a hook needs to find inside a unit directory.
#[derive(Debug, Clone)]
pub struct UnitContext {
    unit_dir: PathBuf,
}

impl UnitContext {
    pub fn new(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
        }
    }

    pub fn unit_dir(&self) -> &Path {
        &self.unit_dir
    }

    pub fn state_store(&self) -> StateStore {
        StateStore::for_unit(&self.unit_dir)
    }

    pub fn secret_store(&self) -> FileSecretStore {
        FileSecretStore::new(env::secrets_dir_path(&self.unit_dir))
    }

    /// Content of the env-file resource, or `None` if it is not attached.
    pub async fn env_file(&self) -> Result<Option<String>, ConfigError> {
        let path = env::env_file_resource_path(&self.unit_dir);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(ConfigError::EnvFileRead)?;
        let content = String::from_utf8(bytes)
            .map_err(|e| ConfigError::EnvFileEncoding(e.utf8_error()))?;
        Ok(Some(content))
    }

    /// Gather the inputs of one reconciliation.
    pub async fn inputs(&self, config: &CharmConfig) -> Result<ReconcileInputs, ReconcileError> {
        Ok(ReconcileInputs {
            config: config.clone(),
            env_file: self.env_file().await?,
            relation: RelationState::load(&self.unit_dir).await?,
        })
    }
}

/// Reconcile `event` against `manager` and persist the outcome.
///
/// # Errors
///
/// Returns error only if the persisted state cannot be read or written.
/// Unusable inputs and reconciliation failures are reported through the
/// persisted status.
pub async fn run_hook<M, S>(
    event: HookEvent,
    unit: &UnitContext,
    config: CharmConfig,
    manager: M,
    store: S,
) -> Result<Reconciliation>
where
    M: ContainerManager,
    S: SecretStore,
{
    let state_store = unit.state_store();
    let previous = state_store.load().await?;
    let reconciler = Reconciler::new(manager, store);

    let outcome = match unit.inputs(&config).await {
        Ok(inputs) => reconciler.reconcile(event, &inputs, previous).await,
        Err(e) if event.is_teardown() => {
            warn!("Ignoring unusable inputs during {}: {}", event, e);
            let inputs = ReconcileInputs {
                config,
                ..ReconcileInputs::default()
            };
            reconciler.reconcile(event, &inputs, previous).await
        }
        Err(e) => reconciler.reject(event, e, previous),
    };

    state_store.save(&outcome.state).await?;
    Ok(outcome)
}

/// Handle `event` for the unit at `unit_dir` against the local Docker daemon.
///
/// The `install` event first installs the runtime, writes proxy settings,
/// starts Watchtower and pulls the configured image. Failures there block
/// the unit without reconciling.
pub async fn dispatch(event: HookEvent, unit_dir: &Path, config: CharmConfig) -> Result<RunnerState> {
    let unit = UnitContext::new(unit_dir);
    info!("Dispatching {} for unit at {}", event, unit_dir.display());

    if event == HookEvent::Install {
        if let Err(e) = config.validate() {
            let e = ReconcileError::from(e);
            error!("{}", e);
            return block(&unit, event, e.to_string(), Some(Phase::Error)).await;
        }
        if let Err(e) = install_runtime(&config).await {
            error!("Failed to install Container Runner: {}", e);
            return block(&unit, event, e.to_string(), None).await;
        }
    }

    let manager = match DockerManager::connect(DockerManagerConfig::default()).await {
        Ok(manager) => manager,
        Err(e) => {
            error!("Failed to connect to container runtime: {}", e);
            let message = format!("Failed to start Container Runner: {}", e);
            return block(&unit, event, message, None).await;
        }
    };

    if event == HookEvent::Install {
        if let Err(e) = prepare_images(&manager, &config).await {
            error!("Failed to prepare images: {}", e);
            return block(&unit, event, e.to_string(), None).await;
        }
        mark_installed(&unit).await?;
    }

    let outcome = run_hook(event, &unit, config, manager, unit.secret_store()).await?;
    Ok(outcome.state)
}

async fn install_runtime(config: &CharmConfig) -> crate::container::Result<()> {
    let installer = RuntimeInstaller::default();

    if let (Some(http_proxy), Some(https_proxy)) =
        (config.http_proxy.as_deref(), config.https_proxy.as_deref())
    {
        installer.write_proxy_config(http_proxy, https_proxy)?;
    }

    installer.install().await
}

async fn prepare_images(
    manager: &DockerManager,
    config: &CharmConfig,
) -> Result<(), ContainerError> {
    manager.run_watchtower().await?;
    manager.pull_image(&config.container_image_uri).await?;
    info!("Successfully pulled image: {}", config.container_image_uri);
    Ok(())
}

async fn mark_installed(unit: &UnitContext) -> Result<()> {
    let store = unit.state_store();
    let mut state = store.load().await?;
    state.installed = true;
    state.status = UnitStatus::Maintenance("Installation complete, waiting for database.".to_string());
    store.save(&state).await
}

async fn block(
    unit: &UnitContext,
    event: HookEvent,
    message: String,
    phase: Option<Phase>,
) -> Result<RunnerState> {
    let store = unit.state_store();
    let mut state = store.load().await?;
    if let Some(phase) = phase {
        state.phase = phase;
    }
    state.last_event = Some(event);
    state.updated_at = Some(Utc::now());
    state.status = UnitStatus::Blocked(message);
    store.save(&state).await?;
    Ok(state)
}
