//! PostgreSQL relation binding.
//!
//! When the `database` relation is established, the provider publishes
//! credentials and endpoints. [`bind`] turns them into the single
//! `APP_POSTGRES_URI` variable the managed application reads.

use crate::dotenv::EnvironmentSet;
use crate::env;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Relation data that cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum RelationError {
    #[error("failed to read relation data {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("relation data {} is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Credentials published on the database relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCredentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// `host:port`, possibly comma separated for several hosts
    #[serde(default)]
    pub endpoints: Option<String>,
    /// Database the provider created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Server version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl DatabaseCredentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        endpoints: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            endpoints: Some(endpoints.into()),
            ..Self::default()
        }
    }
}

/// State of the database relation as seen by this unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationState {
    pub established: bool,
    pub credentials: Option<DatabaseCredentials>,
}

impl RelationState {
    /// No relation.
    pub fn absent() -> Self {
        Self::default()
    }

    /// An established relation with the given credentials.
    pub fn established(credentials: DatabaseCredentials) -> Self {
        Self {
            established: true,
            credentials: Some(credentials),
        }
    }

    /// Read relation data from `<unit>/relations/database.json`.
    ///
    /// A missing file means the relation does not exist.
    pub async fn load(unit_dir: &Path) -> Result<Self, RelationError> {
        let path = env::relation_file_path(unit_dir, env::database::RELATION_NAME);
        if !path.exists() {
            debug!("No database relation data at {}", path.display());
            return Ok(Self::absent());
        }

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(source) => return Err(RelationError::Read { path, source }),
        };
        let credentials: DatabaseCredentials = match serde_json::from_slice(&content) {
            Ok(credentials) => credentials,
            Err(source) => return Err(RelationError::Malformed { path, source }),
        };

        Ok(Self::established(credentials))
    }
}

/// Build the connection string for `database_name`.
///
/// Username and password are percent-encoded so reserved characters cannot
/// change how the URI is split. Returns `None` when any part is missing.
pub fn connection_string(credentials: &DatabaseCredentials, database_name: &str) -> Option<String> {
    let username = credentials.username.as_deref().filter(|s| !s.is_empty());
    let password = credentials.password.as_deref().filter(|s| !s.is_empty());
    let endpoints = credentials.endpoints.as_deref().filter(|s| !s.is_empty());

    match (username, password, endpoints) {
        (Some(username), Some(password), Some(endpoints)) => Some(format!(
            "postgresql://{}:{}@{}/{}",
            urlencoding::encode(username),
            urlencoding::encode(password),
            endpoints,
            database_name
        )),
        _ => {
            warn!(
                "Missing database relation data. Cannot generate connection string. \
                 Got username: {}, Got password: {}, Got endpoints: {}",
                username.is_some(),
                password.is_some(),
                endpoints.is_some()
            );
            None
        }
    }
}

/// Derive the database environment from the relation state.
pub fn bind(relation: &RelationState, database_name: &str) -> EnvironmentSet {
    let mut env = EnvironmentSet::new();
    if !relation.established {
        return env;
    }

    let Some(credentials) = relation.credentials.as_ref() else {
        warn!("Database relation established without data yet");
        return env;
    };

    if let Some(uri) = connection_string(credentials, database_name) {
        info!(
            "Generated database connection string with endpoints: {}",
            credentials.endpoints.as_deref().unwrap_or_default()
        );
        env.insert(env::database::URI_ENV_VAR, uri);
    }
    env
}
