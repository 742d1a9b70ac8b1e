//! Reconciler state carried between runs.
//!
//! Each hook invocation is a separate process, so the last-applied
//! [`ContainerSpec`] is persisted to `<unit>/state.json` and read back at the
//! start of the next run.

use crate::container::ContainerSpec;
use crate::reconciler::HookEvent;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle phase of the managed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Nothing has been reconciled yet
    #[default]
    Uninitialized,
    /// A database relation is required but missing
    WaitingForDatabase,
    /// Inputs are complete but the container is not running
    Ready,
    /// The container runs the last-applied spec
    Running,
    /// The container was stopped on request
    Stopped,
    /// Configuration is invalid
    Error,
}

/// Status shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "kebab-case")]
pub enum UnitStatus {
    /// Work in progress
    Maintenance(String),
    /// Waiting on a dependency
    Waiting(String),
    /// Misconfigured or failing, needs operator attention
    Blocked(String),
    /// Running
    #[default]
    Active,
}

impl UnitStatus {
    pub fn is_blocked(&self) -> bool {
        matches!(self, UnitStatus::Blocked(_))
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, UnitStatus::Waiting(_))
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitStatus::Maintenance(msg) => write!(f, "maintenance: {}", msg),
            UnitStatus::Waiting(msg) => write!(f, "waiting: {}", msg),
            UnitStatus::Blocked(msg) => write!(f, "blocked: {}", msg),
            UnitStatus::Active => write!(f, "active"),
        }
    }
}

/// Everything the reconciler remembers between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerState {
    pub phase: Phase,
    pub status: UnitStatus,
    /// Spec the managed container was last started with
    pub applied_spec: Option<ContainerSpec>,
    /// Host port currently published
    pub opened_port: Option<u16>,
    pub installed: bool,
    pub last_event: Option<HookEvent>,
    pub last_run_id: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for RunnerState {
    fn default() -> Self {
        Self {
            phase: Phase::Uninitialized,
            status: UnitStatus::Maintenance("Installing Container Runner".to_string()),
            applied_spec: None,
            opened_port: None,
            installed: false,
            last_event: None,
            last_run_id: None,
            updated_at: None,
        }
    }
}

/// Durable storage for [`RunnerState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location inside a unit directory.
    pub fn for_unit(unit_dir: &Path) -> Self {
        Self::new(crate::env::state_file_path(unit_dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state, or the initial state if none exists yet.
    pub async fn load(&self) -> Result<RunnerState> {
        if !self.path.exists() {
            debug!("No state at {}, starting fresh", self.path.display());
            return Ok(RunnerState::default());
        }

        let content = async_fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;

        serde_json::from_slice(&content)
            .with_context(|| format!("Failed to deserialize state file: {}", self.path.display()))
    }

    /// Persist `state` atomically: write a sibling temp file, then rename.
    pub async fn save(&self, state: &RunnerState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let content =
            serde_json::to_vec_pretty(state).context("Failed to serialize runner state")?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = async_fs::File::create(&temp_path)
            .await
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        file.write_all(&content)
            .await
            .context("Failed to write runner state")?;
        file.sync_all().await.context("Failed to sync runner state")?;
        drop(file);

        async_fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("Failed to move state into place: {}", self.path.display()))?;

        info!("State saved: phase {:?}, status {}", state.phase, state.status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dotenv::EnvironmentSet;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_state_is_initial() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::for_unit(dir.path());

        let state = store.load().await.unwrap();
        assert_eq!(state.phase, Phase::Uninitialized);
        assert!(state.applied_spec.is_none());
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::for_unit(dir.path());

        let state = RunnerState {
            phase: Phase::Running,
            status: UnitStatus::Active,
            applied_spec: Some(ContainerSpec {
                image: "nginx".to_string(),
                host_port: 8080,
                container_port: 80,
                env: [("A", "1")].into_iter().collect::<EnvironmentSet>(),
            }),
            opened_port: Some(8080),
            installed: true,
            last_event: Some(HookEvent::ConfigChanged),
            last_run_id: Some(Uuid::new_v4()),
            updated_at: Some(Utc::now()),
        };
        store.save(&state).await.unwrap();

        let reloaded = StateStore::for_unit(dir.path()).load().await.unwrap();
        assert_eq!(reloaded, state);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::for_unit(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(store.load().await.is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(UnitStatus::Active.to_string(), "active");
        assert_eq!(
            UnitStatus::Waiting("Waiting for database relation".to_string()).to_string(),
            "waiting: Waiting for database relation"
        );
    }
}
