//! Lifecycle events delivered by the orchestration framework.

use serde::{Deserialize, Serialize};

/// An event that triggers a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HookEvent {
    Install,
    Start,
    ConfigChanged,
    UpgradeCharm,
    Stop,
    Remove,
    DatabaseCreated,
    DatabaseChanged,
    DatabaseRelationBroken,
    SecretChanged,
    SecretRotate,
}

impl HookEvent {
    /// Events after which the managed container must not keep running.
    pub fn is_teardown(&self) -> bool {
        matches!(self, HookEvent::Stop | HookEvent::Remove)
    }

    /// Whether the database relation is being torn down by this event.
    ///
    /// Relation data is still readable while the broken event runs, so it
    /// must be ignored explicitly.
    pub fn drops_database(&self) -> bool {
        matches!(self, HookEvent::DatabaseRelationBroken)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::Install => "install",
            HookEvent::Start => "start",
            HookEvent::ConfigChanged => "config-changed",
            HookEvent::UpgradeCharm => "upgrade-charm",
            HookEvent::Stop => "stop",
            HookEvent::Remove => "remove",
            HookEvent::DatabaseCreated => "database-created",
            HookEvent::DatabaseChanged => "database-changed",
            HookEvent::DatabaseRelationBroken => "database-relation-broken",
            HookEvent::SecretChanged => "secret-changed",
            HookEvent::SecretRotate => "secret-rotate",
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
