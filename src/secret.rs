//! Secret resolution.
//!
//! The `env-vars` option holds a reference to a secret whose `env-vars` field
//! carries `.env` formatted text. [`SecretResolver`] fetches that content from
//! a [`SecretStore`] and parses it with the same grammar as the env-file
//! resource.

use crate::dotenv::{self, EnvironmentSet};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, error};

/// Field of the secret content holding the `.env` payload
pub const ENV_VARS_FIELD: &str = "env-vars";

/// Prefix secret URIs may carry
pub const SECRET_URI_PREFIX: &str = "secret:";

/// Secret resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// The reference does not resolve to a secret
    #[error("secret {0:?} not found")]
    NotFound(String),

    /// The unit has not been granted access to the secret
    #[error("access to secret {0:?} has not been granted")]
    AccessDenied(String),

    /// The secret has no `env-vars` field
    #[error("secret {id:?} has no {field:?} field")]
    MissingField { id: String, field: &'static str },

    /// The payload is not valid `.env` content
    #[error("secret {id:?} payload is malformed: {source}")]
    Malformed {
        id: String,
        #[source]
        source: dotenv::ParseError,
    },

    /// The stored secret is not valid TOML
    #[error("secret {id:?} content is malformed: {source}")]
    InvalidContent {
        id: String,
        #[source]
        source: toml::de::Error,
    },

    /// The store could not be read
    #[error("failed to read secret {id:?}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

impl SecretError {
    /// Whether the condition may clear on its own, e.g. once access is granted.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SecretError::NotFound(_) | SecretError::AccessDenied(_) | SecretError::Io { .. }
        )
    }
}

/// Source of secret content.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the latest content of a secret as string fields.
    async fn get_content(&self, id: &str) -> Result<HashMap<String, String>, SecretError>;
}

/// Secret store backed by a directory of TOML files, one per secret.
///
/// `secret:abc` resolves to `<dir>/abc.toml`. A file the unit cannot read is
/// treated as an access grant that has not happened yet.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn secret_path(&self, id: &str) -> Option<PathBuf> {
        let id = id.strip_prefix(SECRET_URI_PREFIX).unwrap_or(id);
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return None;
        }
        Some(self.dir.join(format!("{}.toml", id)))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_content(&self, id: &str) -> Result<HashMap<String, String>, SecretError> {
        let path = self
            .secret_path(id)
            .ok_or_else(|| SecretError::NotFound(id.to_string()))?;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SecretError::NotFound(id.to_string()));
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(SecretError::AccessDenied(id.to_string()));
            }
            Err(source) => {
                return Err(SecretError::Io {
                    id: id.to_string(),
                    source,
                });
            }
        };

        toml::from_str(&content).map_err(|source| SecretError::InvalidContent {
            id: id.to_string(),
            source,
        })
    }
}

/// Resolves the `env-vars` secret reference into environment variables.
pub struct SecretResolver<S> {
    store: S,
}

impl<S: SecretStore> SecretResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Resolve `reference`; no reference yields an empty set.
    pub async fn resolve(&self, reference: Option<&str>) -> Result<EnvironmentSet, SecretError> {
        let Some(id) = reference else {
            return Ok(EnvironmentSet::new());
        };

        let content = self.store.get_content(id).await.inspect_err(|e| {
            error!("secret {:?} could not be fetched: {}", id, e);
        })?;

        let payload = content
            .get(ENV_VARS_FIELD)
            .ok_or_else(|| SecretError::MissingField {
                id: id.to_string(),
                field: ENV_VARS_FIELD,
            })?;

        let env = dotenv::parse(payload).map_err(|source| SecretError::Malformed {
            id: id.to_string(),
            source,
        })?;

        debug!("Secret env-vars loaded: {} variables", env.len());
        Ok(env)
    }
}
