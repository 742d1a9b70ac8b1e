//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Explicit `--config` path
//! 2. Unit directory: <unit>/config.toml
//! 3. Current directory: ./container-runner.toml
//! 4. User config: ~/.container-runner/config.toml
//! 5. System config: /etc/container-runner/config.toml
//! 6. Built-in defaults

use crate::config::{CharmConfig, ConfigError};
use crate::env;
use std::env as std_env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load the explicit override if given, otherwise discover through the
    /// hierarchy.
    pub fn load(
        config_override: Option<&Path>,
        unit_dir: &Path,
    ) -> Result<CharmConfig, ConfigError> {
        if let Some(path) = config_override {
            info!("Loading configuration override from: {:?}", path);
            return CharmConfig::from_toml_file(path);
        }

        Self::discover_config(unit_dir)
    }

    /// Discover and load configuration using the hierarchy
    pub fn discover_config(unit_dir: &Path) -> Result<CharmConfig, ConfigError> {
        if let Some(config_path) = Self::find_config_file(unit_dir) {
            info!("Loading configuration from: {:?}", config_path);
            return CharmConfig::from_toml_file(config_path);
        }

        info!("No configuration file found, using defaults");
        Ok(CharmConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file(unit_dir: &Path) -> Option<PathBuf> {
        for candidate in Self::get_config_candidates(unit_dir) {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    fn get_config_candidates(unit_dir: &Path) -> Vec<PathBuf> {
        let mut candidates = vec![env::unit_config_file_path(unit_dir)];

        if let Ok(current_dir) = std_env::current_dir() {
            candidates.push(env::local_config_file_path(&current_dir));
        }

        if let Some(home_dir) = Self::get_home_dir() {
            candidates.push(env::user_config_file_path(&home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/container-runner/config.toml"));

        candidates
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info(unit_dir: &Path) {
        println!("Configuration Discovery Hierarchy:");
        println!();

        let candidates = Self::get_config_candidates(unit_dir);
        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        match Self::find_config_file(unit_dir) {
            Some(found) => println!("Active configuration: {:?}", found),
            None => println!("Active configuration: Built-in defaults"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unit_config_is_first_candidate() {
        let dir = TempDir::new().unwrap();
        let candidates = ConfigDiscovery::get_config_candidates(dir.path());

        assert_eq!(candidates[0], dir.path().join("config.toml"));
    }

    #[test]
    fn test_discover_unit_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            env::unit_config_file_path(dir.path()),
            "container-image-uri = \"nginx\"\nhost-port = 8080\n",
        )
        .unwrap();

        let config = ConfigDiscovery::discover_config(dir.path()).unwrap();
        assert_eq!(config.container_image_uri, "nginx");
        assert_eq!(config.host_port, 8080);
        assert_eq!(config.container_port, 80);
    }

    #[test]
    fn test_override_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(env::unit_config_file_path(dir.path()), "host-port = 8080\n").unwrap();
        let override_path = dir.path().join("override.toml");
        std::fs::write(&override_path, "host-port = 9090\n").unwrap();

        let config = ConfigDiscovery::load(Some(&override_path), dir.path()).unwrap();
        assert_eq!(config.host_port, 9090);
    }

    #[test]
    fn test_missing_override_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");

        assert!(matches!(
            ConfigDiscovery::load(Some(&missing), dir.path()),
            Err(ConfigError::Io(_))
        ));
    }
}
