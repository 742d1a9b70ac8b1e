//! Environment constants and path utilities for the container runner.
//!
//! This module centralizes all hardcoded paths, file names and well-known
//! names used throughout the application, making them easier to maintain.

use std::path::{Path, PathBuf};

/// Default unit directory holding config, resources, relations and state
pub const DEFAULT_UNIT_DIR: &str = "/var/lib/container-runner";

/// Application directory name inside a user's home directory
pub const APP_DIR_NAME: &str = ".container-runner";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Local configuration file name looked up in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "container-runner.toml";

/// Persisted reconciler state file name
pub const STATE_FILE_NAME: &str = "state.json";

/// Log level environment variable
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";

/// Unit directory layout
pub mod unit {
    /// Resources directory name
    pub const RESOURCES_DIR_NAME: &str = "resources";

    /// The `.env` file resource
    pub const ENV_FILE_RESOURCE: &str = "env-file";

    /// Relations directory name
    pub const RELATIONS_DIR_NAME: &str = "relations";

    /// Secrets directory name
    pub const SECRETS_DIR_NAME: &str = "secrets";
}

/// Container and runtime names
pub mod container {
    /// Name of the managed container
    pub const MANAGED_CONTAINER_NAME: &str = "managed_container";

    /// Name of the image update watcher container
    pub const WATCHTOWER_CONTAINER_NAME: &str = "watchtower";

    /// Image update watcher image
    pub const WATCHTOWER_IMAGE: &str = "containrrr/watchtower";

    /// Docker socket, mounted into the watcher
    pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";

    /// Rootful Podman API socket, tried when no Docker endpoint answers
    pub const PODMAN_SOCKET: &str = "unix:///run/podman/podman.sock";

    /// Docker daemon configuration file
    pub const DOCKER_DAEMON_CONFIG_PATH: &str = "/etc/docker/daemon.json";

    /// Label stamped on every container this runner creates
    pub const MANAGED_BY_LABEL: &str = "io.container-runner.managed-by";
}

/// Database relation constants
pub mod database {
    /// Relation name
    pub const RELATION_NAME: &str = "database";

    /// Environment variable receiving the connection string
    pub const URI_ENV_VAR: &str = "APP_POSTGRES_URI";

    /// Database requested from the relation
    pub const DEFAULT_DATABASE_NAME: &str = "ratings";
}

/// Build the resources directory path
pub fn resources_dir_path(unit_dir: &Path) -> PathBuf {
    unit_dir.join(unit::RESOURCES_DIR_NAME)
}

/// Build the `.env` resource file path
pub fn env_file_resource_path(unit_dir: &Path) -> PathBuf {
    resources_dir_path(unit_dir).join(unit::ENV_FILE_RESOURCE)
}

/// Build the relations directory path
pub fn relations_dir_path(unit_dir: &Path) -> PathBuf {
    unit_dir.join(unit::RELATIONS_DIR_NAME)
}

/// Build a relation data file path
pub fn relation_file_path(unit_dir: &Path, relation: &str) -> PathBuf {
    relations_dir_path(unit_dir).join(format!("{}.json", relation))
}

/// Build the secrets directory path
pub fn secrets_dir_path(unit_dir: &Path) -> PathBuf {
    unit_dir.join(unit::SECRETS_DIR_NAME)
}

/// Build the persisted state file path
pub fn state_file_path(unit_dir: &Path) -> PathBuf {
    unit_dir.join(STATE_FILE_NAME)
}

/// Build the unit config file path
pub fn unit_config_file_path(unit_dir: &Path) -> PathBuf {
    unit_dir.join(CONFIG_FILE_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    home_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_paths() {
        let unit_dir = Path::new("/var/lib/container-runner");

        assert_eq!(
            env_file_resource_path(unit_dir),
            Path::new("/var/lib/container-runner/resources/env-file")
        );
        assert_eq!(
            relation_file_path(unit_dir, database::RELATION_NAME),
            Path::new("/var/lib/container-runner/relations/database.json")
        );
        assert_eq!(
            secrets_dir_path(unit_dir),
            Path::new("/var/lib/container-runner/secrets")
        );
        assert_eq!(
            state_file_path(unit_dir),
            Path::new("/var/lib/container-runner/state.json")
        );
    }

    #[test]
    fn test_config_paths() {
        let home_dir = Path::new("/home/user");
        let current_dir = Path::new("/current/project");

        assert_eq!(
            user_config_file_path(home_dir),
            Path::new("/home/user/.container-runner/config.toml")
        );
        assert_eq!(
            local_config_file_path(current_dir),
            Path::new("/current/project/container-runner.toml")
        );
    }
}
