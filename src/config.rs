//! Charm configuration and the per-reconciliation snapshot taken from it.
//!
//! Options use the kebab-case names the operator sets them with, so a
//! config file reads like:
//!
//! ```toml
//! container-image-uri = "nginxdemos/hello"
//! container-port = 80
//! host-port = 8080
//! database-expected = true
//! env-vars = "secret:cq2n1bfmp25c77ql3kpg"
//! ```

use crate::env;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default container image
pub const DEFAULT_CONTAINER_IMAGE: &str = "nginxdemos/hello";

/// Default container and host port
pub const DEFAULT_PORT: u16 = 80;

/// Default bound on a single container runtime operation, in seconds
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 120;

/// Configuration errors. These block the unit until the input is corrected.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("container-image-uri must not be empty")]
    EmptyImage,

    #[error("{option} must be between 1 and 65535")]
    InvalidPort { option: &'static str },

    #[error("database-name must not be empty")]
    EmptyDatabaseName,

    #[error("operation-timeout-secs must be greater than zero")]
    InvalidTimeout,

    #[error("{option} must not be empty when set")]
    EmptyProxy { option: &'static str },

    #[error("http-proxy and https-proxy must be set together")]
    UnpairedProxy,

    #[error("env-file resource is not valid UTF-8: {0}")]
    EnvFileEncoding(#[source] std::str::Utf8Error),

    #[error("failed to read env-file resource: {0}")]
    EnvFileRead(#[source] std::io::Error),

    #[error("env-file resource is malformed: {0}")]
    EnvFile(#[from] crate::dotenv::ParseError),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Charm configuration options as set by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CharmConfig {
    /// OCI image to run
    pub container_image_uri: String,
    /// Port the application listens on inside the container
    pub container_port: u16,
    /// Port published on the host
    pub host_port: u16,
    /// Wait for a database relation before running
    pub database_expected: bool,
    /// Secret reference holding extra `.env` content under `env-vars`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<String>,
    /// Database name used in the connection string
    pub database_name: String,
    /// HTTP proxy for the container runtime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    /// HTTPS proxy for the container runtime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
    /// Bound on each container runtime operation
    pub operation_timeout_secs: u64,
}

impl Default for CharmConfig {
    fn default() -> Self {
        Self {
            container_image_uri: DEFAULT_CONTAINER_IMAGE.to_string(),
            container_port: DEFAULT_PORT,
            host_port: DEFAULT_PORT,
            database_expected: false,
            env_vars: None,
            database_name: env::database::DEFAULT_DATABASE_NAME.to_string(),
            http_proxy: None,
            https_proxy: None,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        }
    }
}

impl CharmConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize to a TOML string
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Check option values that cannot be expressed in the type.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.container_image_uri.trim().is_empty() {
            return Err(ConfigError::EmptyImage);
        }
        if self.container_port == 0 {
            return Err(ConfigError::InvalidPort {
                option: "container-port",
            });
        }
        if self.host_port == 0 {
            return Err(ConfigError::InvalidPort { option: "host-port" });
        }
        if self.database_name.trim().is_empty() {
            return Err(ConfigError::EmptyDatabaseName);
        }
        if self.operation_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if matches!(self.http_proxy.as_deref(), Some("")) {
            return Err(ConfigError::EmptyProxy {
                option: "http-proxy",
            });
        }
        if matches!(self.https_proxy.as_deref(), Some("")) {
            return Err(ConfigError::EmptyProxy {
                option: "https-proxy",
            });
        }
        if self.http_proxy.is_some() != self.https_proxy.is_some() {
            return Err(ConfigError::UnpairedProxy);
        }
        Ok(())
    }

    /// Secret reference, with an empty string treated as unset.
    pub fn secret_ref(&self) -> Option<&str> {
        self.env_vars.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Immutable view of the inputs for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub container_image_uri: String,
    pub host_port: u16,
    pub container_port: u16,
    pub database_expected: bool,
    pub database_name: String,
    pub env_vars_secret_ref: Option<String>,
    pub env_file_content: Option<String>,
}

impl ConfigSnapshot {
    /// Validate `config` and capture it together with the env-file resource.
    pub fn capture(
        config: &CharmConfig,
        env_file_content: Option<String>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            container_image_uri: config.container_image_uri.trim().to_string(),
            host_port: config.host_port,
            container_port: config.container_port,
            database_expected: config.database_expected,
            database_name: config.database_name.trim().to_string(),
            env_vars_secret_ref: config.secret_ref().map(str::to_string),
            env_file_content,
        })
    }

    /// Whether the container may run given the database relation state.
    pub fn is_ready(&self, relation_established: bool) -> bool {
        !self.database_expected || relation_established
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CharmConfig::default();
        assert_eq!(config.container_image_uri, "nginxdemos/hello");
        assert_eq!(config.container_port, 80);
        assert_eq!(config.host_port, 80);
        assert!(!config.database_expected);
        assert_eq!(config.env_vars, None);
        assert_eq!(config.database_name, "ratings");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_kebab_case_options() {
        let config = CharmConfig::from_toml_str(
            r#"
container-image-uri = "nginx"
host-port = 8080
database-expected = true
env-vars = "secret:abc"
"#,
        )
        .unwrap();

        assert_eq!(config.container_image_uri, "nginx");
        assert_eq!(config.host_port, 8080);
        assert_eq!(config.container_port, 80);
        assert!(config.database_expected);
        assert_eq!(config.secret_ref(), Some("secret:abc"));
    }

    #[test]
    fn test_invalid_values() {
        let config = CharmConfig {
            host_port: 0,
            ..CharmConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPort { option: "host-port" })
        ));

        let config = CharmConfig {
            container_image_uri: "  ".to_string(),
            ..CharmConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyImage)));

        let config = CharmConfig {
            http_proxy: Some(String::new()),
            ..CharmConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyProxy { .. })
        ));
    }

    #[test]
    fn test_proxies_must_be_paired() {
        let config = CharmConfig {
            http_proxy: Some("http://proxy:3128".to_string()),
            ..CharmConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::UnpairedProxy)));

        let config = CharmConfig {
            http_proxy: Some("http://proxy:3128".to_string()),
            https_proxy: Some("http://proxy:3129".to_string()),
            ..CharmConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_port_fails_to_parse() {
        assert!(CharmConfig::from_toml_str("host-port = 70000").is_err());
        assert!(CharmConfig::from_toml_str("container-port = -1").is_err());
    }

    #[test]
    fn test_empty_secret_ref_is_unset() {
        let config = CharmConfig {
            env_vars: Some("  ".to_string()),
            ..CharmConfig::default()
        };
        assert_eq!(config.secret_ref(), None);

        let snapshot = ConfigSnapshot::capture(&config, None).unwrap();
        assert_eq!(snapshot.env_vars_secret_ref, None);
    }

    #[test]
    fn test_snapshot_readiness() {
        let config = CharmConfig {
            database_expected: true,
            ..CharmConfig::default()
        };
        let snapshot = ConfigSnapshot::capture(&config, Some("A=1".to_string())).unwrap();

        assert!(!snapshot.is_ready(false));
        assert!(snapshot.is_ready(true));
        assert_eq!(snapshot.env_file_content.as_deref(), Some("A=1"));
    }
}
