//! Reconciliation of the managed container.
//!
//! [`Reconciler::reconcile`] is the single entry point for every lifecycle
//! event. It captures a [`ConfigSnapshot`], decides whether the container may
//! run, computes the desired [`ContainerSpec`] and converges the runtime to
//! it through a [`ContainerManager`].
//!
//! The decision follows a fixed order:
//!
//! 1. `stop`/`remove` tear the container down.
//! 2. A required but missing database relation stops the container and waits.
//! 3. The env-file resource, the `env-vars` secret and the database binding
//!    are merged, later layers winning on key collisions.
//! 4. The container is (re)created only if the candidate spec differs from
//!    the one it is known to be running.
//!
//! State survives between runs only through the [`RunnerState`] passed in
//! and returned; the reconciler itself holds none.

mod event;
pub mod state;

pub use event::HookEvent;
pub use state::{Phase, RunnerState, StateStore, UnitStatus};

use crate::config::{CharmConfig, ConfigError, ConfigSnapshot, DEFAULT_OPERATION_TIMEOUT_SECS};
use crate::container::{self, ContainerError, ContainerManager, ContainerSpec};
use crate::database::{self, RelationError, RelationState};
use crate::dotenv::{self, EnvironmentSet};
use crate::secret::{SecretError, SecretResolver, SecretStore};
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Status message while the database relation is missing
pub const WAITING_FOR_DATABASE: &str = "Waiting for database relation";

/// Reconciliation failures, grouped by how the operator must react.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Invalid options or a malformed env-file resource
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The database relation data cannot be used
    #[error("Invalid relation data: {0}")]
    Relation(#[from] RelationError),

    /// The `env-vars` secret could not be resolved
    #[error("Secret unavailable: {0}")]
    Secret(#[from] SecretError),

    /// The container runtime failed
    #[error("Failed to start Container Runner: {0}")]
    Container(#[from] ContainerError),
}

impl ReconcileError {
    /// Whether the next event may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Config(_) | ReconcileError::Relation(_) => false,
            ReconcileError::Secret(e) => e.is_transient(),
            ReconcileError::Container(_) => true,
        }
    }
}

/// Inputs gathered for one event.
#[derive(Debug, Clone, Default)]
pub struct ReconcileInputs {
    pub config: CharmConfig,
    /// Content of the env-file resource, if attached
    pub env_file: Option<String>,
    pub relation: RelationState,
}

/// What a reconciliation did to the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Created a container where none was running
    Started,
    /// Replaced a running container with a new spec
    Restarted,
    /// The running container already matched
    Unchanged,
    /// Stopped a running container
    Stopped,
    /// Nothing to do, or nothing could be done
    None,
}

/// Outcome of one reconciliation.
#[derive(Debug)]
pub struct Reconciliation {
    /// State to persist for the next run
    pub state: RunnerState,
    pub action: Action,
    pub error: Option<ReconcileError>,
}

/// The decision function driving the managed container.
pub struct Reconciler<M, S> {
    manager: M,
    secrets: SecretResolver<S>,
}

impl<M: ContainerManager, S: SecretStore> Reconciler<M, S> {
    pub fn new(manager: M, store: S) -> Self {
        Self {
            manager,
            secrets: SecretResolver::new(store),
        }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Reconcile after `event`, starting from the `previous` persisted state.
    ///
    /// Never fails: errors are folded into the returned state's phase and
    /// status and also handed back in [`Reconciliation::error`].
    pub async fn reconcile(
        &self,
        event: HookEvent,
        inputs: &ReconcileInputs,
        previous: RunnerState,
    ) -> Reconciliation {
        let run_id = Uuid::new_v4();
        let span = info_span!("reconcile", event = %event, run_id = %run_id);

        async move {
            let mut state = stamp(previous, event, run_id);

            let (action, error) = match self.converge(event, inputs, &mut state).await {
                Ok(action) => {
                    info!("Reconciled: {:?}, phase {:?}", action, state.phase);
                    (action, None)
                }
                Err(e) => {
                    record_failure(&e, &mut state);
                    (Action::None, Some(e))
                }
            };

            Reconciliation {
                state,
                action,
                error,
            }
        }
        .instrument(span)
        .await
    }

    /// Record inputs that could not be gathered for `event` without touching
    /// the container.
    pub fn reject(
        &self,
        event: HookEvent,
        error: ReconcileError,
        previous: RunnerState,
    ) -> Reconciliation {
        let run_id = Uuid::new_v4();
        let _span = info_span!("reconcile", event = %event, run_id = %run_id).entered();

        let mut state = stamp(previous, event, run_id);
        record_failure(&error, &mut state);

        Reconciliation {
            state,
            action: Action::None,
            error: Some(error),
        }
    }

    async fn converge(
        &self,
        event: HookEvent,
        inputs: &ReconcileInputs,
        state: &mut RunnerState,
    ) -> Result<Action, ReconcileError> {
        let limit = Duration::from_secs(inputs.config.operation_timeout_secs);
        let running = bounded("inspect", limit, self.manager.is_running()).await?;

        // Teardown must not depend on the configuration being valid
        if event.is_teardown() {
            return self.stop(running, limit, state, Phase::Stopped).await;
        }

        let snapshot = ConfigSnapshot::capture(&inputs.config, inputs.env_file.clone())?;
        let current = if running {
            state.applied_spec.clone()
        } else {
            None
        };

        let relation_established = inputs.relation.established && !event.drops_database();
        if !snapshot.is_ready(relation_established) {
            warn!("No database relation found. Waiting.");
            return self
                .stop(running, limit, state, Phase::WaitingForDatabase)
                .await;
        }

        let candidate = self
            .desired_spec(&snapshot, &inputs.relation, relation_established)
            .await?;

        if current.as_ref() == Some(&candidate) {
            debug!("Managed container already runs the desired spec");
            mark_running(state, candidate);
            return Ok(Action::Unchanged);
        }

        let action = if running {
            Action::Restarted
        } else {
            Action::Started
        };

        // Nothing runs the desired spec until ensure_running succeeds
        state.phase = Phase::Ready;
        info!(
            "Starting managed container {} on {}:{}",
            candidate.image, candidate.host_port, candidate.container_port
        );
        bounded(
            "ensure_running",
            limit,
            self.manager.ensure_running(&candidate),
        )
        .await?;

        mark_running(state, candidate);
        Ok(action)
    }

    async fn desired_spec(
        &self,
        snapshot: &ConfigSnapshot,
        relation: &RelationState,
        relation_established: bool,
    ) -> Result<ContainerSpec, ReconcileError> {
        let file_env = match snapshot.env_file_content.as_deref() {
            Some(content) => dotenv::parse(content).map_err(ConfigError::from)?,
            None => EnvironmentSet::new(),
        };

        let secret_env = self
            .secrets
            .resolve(snapshot.env_vars_secret_ref.as_deref())
            .await?;

        let database_env = if relation_established {
            database::bind(relation, &snapshot.database_name)
        } else {
            EnvironmentSet::new()
        };

        Ok(ContainerSpec {
            image: snapshot.container_image_uri.clone(),
            host_port: snapshot.host_port,
            container_port: snapshot.container_port,
            env: EnvironmentSet::layered([file_env, secret_env, database_env]),
        })
    }

    async fn stop(
        &self,
        running: bool,
        limit: Duration,
        state: &mut RunnerState,
        phase: Phase,
    ) -> Result<Action, ReconcileError> {
        // A restarting or paused container is not running but still exists
        bounded("stop", limit, self.manager.stop()).await?;

        state.applied_spec = None;
        state.opened_port = None;
        state.phase = phase;
        state.status = match phase {
            Phase::WaitingForDatabase => UnitStatus::Waiting(WAITING_FOR_DATABASE.to_string()),
            _ => UnitStatus::Maintenance("Managed container stopped".to_string()),
        };

        Ok(if running { Action::Stopped } else { Action::None })
    }
}

fn stamp(mut state: RunnerState, event: HookEvent, run_id: Uuid) -> RunnerState {
    state.last_event = Some(event);
    state.last_run_id = Some(run_id);
    state.updated_at = Some(Utc::now());
    state
}

fn mark_running(state: &mut RunnerState, spec: ContainerSpec) {
    state.opened_port = Some(spec.host_port);
    state.applied_spec = Some(spec);
    state.phase = Phase::Running;
    state.status = UnitStatus::Active;
}

fn record_failure(error: &ReconcileError, state: &mut RunnerState) {
    match error {
        ReconcileError::Secret(e) if e.is_transient() => {
            warn!("Failed to load secret env vars: {}", e);
            state.status = UnitStatus::Waiting(format!("Waiting for secret: {}", e));
        }
        ReconcileError::Config(_) | ReconcileError::Relation(_) | ReconcileError::Secret(_) => {
            error!("{}", error);
            state.phase = Phase::Error;
            state.status = UnitStatus::Blocked(error.to_string());
        }
        ReconcileError::Container(_) => {
            error!("{}", error);
            state.status = UnitStatus::Blocked(error.to_string());
        }
    }
}

async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = container::Result<T>>,
) -> container::Result<T> {
    let limit = if limit.is_zero() {
        Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS)
    } else {
        limit
    };

    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ContainerError::Timeout {
            operation,
            secs: limit.as_secs(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseCredentials;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeManager {
        running: Mutex<Option<ContainerSpec>>,
        /// A container that exists without running, e.g. crash-looping
        lingering: AtomicBool,
        ensure_calls: Mutex<Vec<ContainerSpec>>,
        stop_calls: Mutex<usize>,
        fail_start: AtomicBool,
    }

    impl FakeManager {
        fn ensure_count(&self) -> usize {
            self.ensure_calls.lock().unwrap().len()
        }

        fn stop_count(&self) -> usize {
            *self.stop_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ContainerManager for FakeManager {
        async fn is_running(&self) -> container::Result<bool> {
            Ok(self.running.lock().unwrap().is_some())
        }

        async fn ensure_running(&self, spec: &ContainerSpec) -> container::Result<()> {
            self.ensure_calls.lock().unwrap().push(spec.clone());
            if self.fail_start.load(Ordering::SeqCst) {
                *self.running.lock().unwrap() = None;
                return Err(ContainerError::PullError {
                    image: spec.image.clone(),
                    message: "manifest unknown".to_string(),
                });
            }
            *self.running.lock().unwrap() = Some(spec.clone());
            Ok(())
        }

        async fn stop(&self) -> container::Result<()> {
            *self.stop_calls.lock().unwrap() += 1;
            *self.running.lock().unwrap() = None;
            self.lingering.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Secrets {
        content: HashMap<String, String>,
        denied: bool,
    }

    #[async_trait]
    impl SecretStore for Secrets {
        async fn get_content(&self, id: &str) -> Result<HashMap<String, String>, SecretError> {
            if self.denied {
                return Err(SecretError::AccessDenied(id.to_string()));
            }
            self.content
                .get(id)
                .map(|payload| HashMap::from([("env-vars".to_string(), payload.clone())]))
                .ok_or_else(|| SecretError::NotFound(id.to_string()))
        }
    }

    fn nginx_inputs() -> ReconcileInputs {
        ReconcileInputs {
            config: CharmConfig {
                container_image_uri: "nginx".to_string(),
                host_port: 8080,
                container_port: 80,
                ..CharmConfig::default()
            },
            ..ReconcileInputs::default()
        }
    }

    fn reconciler(manager: FakeManager) -> Reconciler<FakeManager, Secrets> {
        Reconciler::new(manager, Secrets::default())
    }

    #[tokio::test]
    async fn test_starts_container_from_plain_config() {
        let reconciler = reconciler(FakeManager::default());

        let result = reconciler
            .reconcile(HookEvent::ConfigChanged, &nginx_inputs(), RunnerState::default())
            .await;

        assert!(result.error.is_none());
        assert_eq!(result.action, Action::Started);
        assert_eq!(result.state.phase, Phase::Running);
        assert_eq!(result.state.status, UnitStatus::Active);
        assert_eq!(result.state.opened_port, Some(8080));

        let calls = reconciler.manager().ensure_calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![ContainerSpec {
                image: "nginx".to_string(),
                host_port: 8080,
                container_port: 80,
                env: EnvironmentSet::new(),
            }]
        );
    }

    #[tokio::test]
    async fn test_second_reconcile_is_a_noop() {
        let reconciler = reconciler(FakeManager::default());
        let inputs = nginx_inputs();

        let first = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, RunnerState::default())
            .await;
        let second = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, first.state)
            .await;

        assert_eq!(second.action, Action::Unchanged);
        assert_eq!(reconciler.manager().ensure_count(), 1);
    }

    #[tokio::test]
    async fn test_port_change_restarts() {
        let reconciler = reconciler(FakeManager::default());
        let mut inputs = nginx_inputs();

        let first = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, RunnerState::default())
            .await;

        inputs.config.host_port = 9090;
        let second = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, first.state)
            .await;

        assert_eq!(second.action, Action::Restarted);
        assert_eq!(reconciler.manager().ensure_count(), 2);
        assert_eq!(
            second.state.applied_spec.as_ref().map(|s| s.host_port),
            Some(9090)
        );
    }

    #[tokio::test]
    async fn test_waits_for_database_without_running() {
        let reconciler = reconciler(FakeManager::default());
        let mut inputs = nginx_inputs();
        inputs.config.database_expected = true;

        let result = reconciler
            .reconcile(HookEvent::Start, &inputs, RunnerState::default())
            .await;

        assert!(result.error.is_none());
        assert_eq!(result.state.phase, Phase::WaitingForDatabase);
        assert_eq!(
            result.state.status,
            UnitStatus::Waiting(WAITING_FOR_DATABASE.to_string())
        );
        assert_eq!(reconciler.manager().ensure_count(), 0);
        assert!(reconciler.manager().running.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_database_created_starts_with_uri() {
        let reconciler = reconciler(FakeManager::default());
        let mut inputs = nginx_inputs();
        inputs.config.database_expected = true;

        let waiting = reconciler
            .reconcile(HookEvent::Install, &inputs, RunnerState::default())
            .await;

        inputs.relation =
            RelationState::established(DatabaseCredentials::new("u", "p", "db:5432"));
        let result = reconciler
            .reconcile(HookEvent::DatabaseCreated, &inputs, waiting.state)
            .await;

        assert_eq!(result.action, Action::Started);
        let spec = result.state.applied_spec.unwrap();
        assert_eq!(
            spec.env.get("APP_POSTGRES_URI"),
            Some("postgresql://u:p@db:5432/ratings")
        );
    }

    #[tokio::test]
    async fn test_relation_broken_stops_when_database_expected() {
        let reconciler = reconciler(FakeManager::default());
        let mut inputs = nginx_inputs();
        inputs.config.database_expected = true;
        inputs.relation =
            RelationState::established(DatabaseCredentials::new("u", "p", "db:5432"));

        let running = reconciler
            .reconcile(HookEvent::DatabaseCreated, &inputs, RunnerState::default())
            .await;
        assert_eq!(running.state.phase, Phase::Running);

        // Relation data is still visible while the broken event runs
        let broken = reconciler
            .reconcile(HookEvent::DatabaseRelationBroken, &inputs, running.state)
            .await;

        assert_eq!(broken.action, Action::Stopped);
        assert_eq!(broken.state.phase, Phase::WaitingForDatabase);
        assert!(broken.state.applied_spec.is_none());
        assert_eq!(reconciler.manager().stop_count(), 1);
    }

    #[tokio::test]
    async fn test_env_precedence() {
        let secrets = Secrets {
            content: HashMap::from([(
                "secret:env".to_string(),
                "SHARED=secret\nAPP_POSTGRES_URI=from-secret\nSECRET_ONLY=s".to_string(),
            )]),
            denied: false,
        };
        let reconciler = Reconciler::new(FakeManager::default(), secrets);

        let mut inputs = nginx_inputs();
        inputs.config.env_vars = Some("secret:env".to_string());
        inputs.env_file = Some("SHARED=file\nFILE_ONLY=f".to_string());
        inputs.relation =
            RelationState::established(DatabaseCredentials::new("u", "p", "db:5432"));

        let result = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, RunnerState::default())
            .await;

        let env = result.state.applied_spec.unwrap().env;
        assert_eq!(env.get("SHARED"), Some("secret"));
        assert_eq!(env.get("FILE_ONLY"), Some("f"));
        assert_eq!(env.get("SECRET_ONLY"), Some("s"));
        assert_eq!(
            env.get("APP_POSTGRES_URI"),
            Some("postgresql://u:p@db:5432/ratings")
        );
    }

    #[tokio::test]
    async fn test_malformed_env_file_blocks() {
        let reconciler = reconciler(FakeManager::default());
        let mut inputs = nginx_inputs();
        inputs.env_file = Some("GOOD=1\n=foo".to_string());

        let result = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, RunnerState::default())
            .await;

        assert!(matches!(
            result.error,
            Some(ReconcileError::Config(ConfigError::EnvFile(_)))
        ));
        assert_eq!(result.state.phase, Phase::Error);
        assert!(result.state.status.is_blocked());
        assert_eq!(reconciler.manager().ensure_count(), 0);
    }

    #[tokio::test]
    async fn test_denied_secret_leaves_container_alone() {
        let manager = FakeManager::default();
        let reconciler = Reconciler::new(
            manager,
            Secrets {
                denied: true,
                ..Secrets::default()
            },
        );

        let first = reconciler
            .reconcile(HookEvent::ConfigChanged, &nginx_inputs(), RunnerState::default())
            .await;
        assert_eq!(first.state.phase, Phase::Running);

        let mut inputs = nginx_inputs();
        inputs.config.env_vars = Some("secret:not-granted".to_string());
        let second = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, first.state)
            .await;

        let error = second.error.unwrap();
        assert!(error.is_transient());
        assert_eq!(second.state.phase, Phase::Running);
        assert!(second.state.status.is_waiting());
        assert_eq!(reconciler.manager().ensure_count(), 1);
        assert_eq!(reconciler.manager().stop_count(), 0);
    }

    #[tokio::test]
    async fn test_container_failure_is_blocked_and_retried() {
        let reconciler = reconciler(FakeManager {
            fail_start: AtomicBool::new(true),
            ..FakeManager::default()
        });

        let result = reconciler
            .reconcile(HookEvent::ConfigChanged, &nginx_inputs(), RunnerState::default())
            .await;

        assert!(matches!(result.error, Some(ReconcileError::Container(_))));
        assert_eq!(result.state.phase, Phase::Ready);
        assert!(result.state.status.is_blocked());
        assert!(result.state.applied_spec.is_none());

        // Next event tries again
        reconciler
            .reconcile(HookEvent::ConfigChanged, &nginx_inputs(), result.state)
            .await;
        assert_eq!(reconciler.manager().ensure_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_restart_keeps_retrying() {
        let reconciler = reconciler(FakeManager::default());
        let mut inputs = nginx_inputs();

        let first = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, RunnerState::default())
            .await;
        assert_eq!(first.state.phase, Phase::Running);

        reconciler.manager().fail_start.store(true, Ordering::SeqCst);
        inputs.config.host_port = 9090;
        let failed = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, first.state)
            .await;

        // The old container is gone and the new one never came up
        assert!(matches!(failed.error, Some(ReconcileError::Container(_))));
        assert_eq!(failed.state.phase, Phase::Ready);
        assert_eq!(
            failed.state.applied_spec.as_ref().map(|s| s.host_port),
            Some(8080)
        );

        reconciler.manager().fail_start.store(false, Ordering::SeqCst);
        let recovered = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, failed.state)
            .await;
        assert_eq!(recovered.action, Action::Started);
        assert_eq!(recovered.state.opened_port, Some(9090));
    }

    #[tokio::test]
    async fn test_remove_with_invalid_config_still_tears_down() {
        let reconciler = reconciler(FakeManager::default());
        let mut inputs = nginx_inputs();

        let first = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, RunnerState::default())
            .await;

        inputs.config.host_port = 0;
        let removed = reconciler
            .reconcile(HookEvent::Remove, &inputs, first.state)
            .await;

        assert!(removed.error.is_none());
        assert_eq!(removed.action, Action::Stopped);
        assert_eq!(removed.state.phase, Phase::Stopped);
        assert_eq!(reconciler.manager().stop_count(), 1);
        assert!(!reconciler.manager().is_running().await.unwrap());
    }

    #[tokio::test]
    async fn test_lingering_container_is_removed_while_waiting() {
        let reconciler = reconciler(FakeManager {
            lingering: AtomicBool::new(true),
            ..FakeManager::default()
        });
        let mut inputs = nginx_inputs();
        inputs.config.database_expected = true;

        let result = reconciler
            .reconcile(HookEvent::DatabaseRelationBroken, &inputs, RunnerState::default())
            .await;

        assert_eq!(result.state.phase, Phase::WaitingForDatabase);
        assert_eq!(reconciler.manager().stop_count(), 1);
        assert!(!reconciler.manager().lingering.load(Ordering::SeqCst));

        let stopped = reconciler
            .reconcile(HookEvent::Stop, &inputs, result.state)
            .await;
        assert_eq!(stopped.state.phase, Phase::Stopped);
        assert_eq!(reconciler.manager().stop_count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_inputs_block_without_container_action() {
        let reconciler = reconciler(FakeManager::default());

        let error = ReconcileError::Config(ConfigError::EnvFileEncoding(
            std::str::from_utf8(&[0xff, 0xfe]).unwrap_err(),
        ));
        let result = reconciler.reject(HookEvent::ConfigChanged, error, RunnerState::default());

        assert_eq!(result.state.phase, Phase::Error);
        assert!(result.state.status.is_blocked());
        assert_eq!(result.state.last_event, Some(HookEvent::ConfigChanged));
        assert_eq!(reconciler.manager().ensure_count(), 0);
        assert_eq!(reconciler.manager().stop_count(), 0);
    }

    #[tokio::test]
    async fn test_stopped_container_is_recreated() {
        let reconciler = reconciler(FakeManager::default());
        let inputs = nginx_inputs();

        let first = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, RunnerState::default())
            .await;

        // The container died behind our back; the persisted spec is stale
        *reconciler.manager().running.lock().unwrap() = None;

        let second = reconciler
            .reconcile(HookEvent::Start, &inputs, first.state)
            .await;
        assert_eq!(second.action, Action::Started);
        assert_eq!(reconciler.manager().ensure_count(), 2);
    }

    #[tokio::test]
    async fn test_stop_event_tears_down() {
        let reconciler = reconciler(FakeManager::default());
        let inputs = nginx_inputs();

        let first = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, RunnerState::default())
            .await;
        let stopped = reconciler
            .reconcile(HookEvent::Stop, &inputs, first.state)
            .await;

        assert_eq!(stopped.action, Action::Stopped);
        assert_eq!(stopped.state.phase, Phase::Stopped);
        assert_eq!(stopped.state.opened_port, None);
        assert_eq!(reconciler.manager().stop_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_port_is_config_error() {
        let reconciler = reconciler(FakeManager::default());
        let mut inputs = nginx_inputs();
        inputs.config.host_port = 0;

        let result = reconciler
            .reconcile(HookEvent::ConfigChanged, &inputs, RunnerState::default())
            .await;

        assert!(matches!(result.error, Some(ReconcileError::Config(_))));
        assert!(!result.error.unwrap().is_transient());
        assert_eq!(reconciler.manager().ensure_count(), 0);
    }
}
