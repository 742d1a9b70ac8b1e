//! Container runtime installation.
//!
//! Installs the `docker.io` package on a fresh machine, writes the daemon's
//! proxy settings and waits until the daemon answers `docker info`.

use crate::container::{ContainerError, Result};
use crate::env;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Installer configuration.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Runtime CLI used for readiness checks
    pub docker_binary: String,
    /// Package providing the runtime
    pub package: String,
    /// Readiness attempts before giving up
    pub retries: u32,
    /// Delay between readiness attempts
    pub delay: Duration,
    /// Daemon configuration file receiving proxy settings
    pub daemon_config_path: PathBuf,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            docker_binary: "docker".to_string(),
            package: "docker.io".to_string(),
            retries: 10,
            delay: Duration::from_secs(3),
            daemon_config_path: PathBuf::from(env::container::DOCKER_DAEMON_CONFIG_PATH),
        }
    }
}

/// Installs and readies the container runtime.
#[derive(Debug, Clone, Default)]
pub struct RuntimeInstaller {
    config: InstallerConfig,
}

impl RuntimeInstaller {
    pub fn new(config: InstallerConfig) -> Self {
        Self { config }
    }

    /// Install the runtime if its CLI is missing, then wait for the daemon.
    ///
    /// # Errors
    ///
    /// Returns error if the package install fails or the daemon never
    /// becomes ready.
    pub async fn install(&self) -> Result<()> {
        if which::which(&self.config.docker_binary).is_ok() {
            info!(
                "{} already installed, skipping package install",
                self.config.docker_binary
            );
        } else {
            self.install_package().await?;
        }

        self.wait_for_daemon().await
    }

    async fn install_package(&self) -> Result<()> {
        info!("Installing {} via apt", self.config.package);

        run_apt(&["update"]).await?;
        run_apt(&["install", "-y", self.config.package.as_str()]).await?;

        info!("Installed {}", self.config.package);
        Ok(())
    }

    /// Poll `docker info` until it succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::InstallError`] once all attempts fail.
    pub async fn wait_for_daemon(&self) -> Result<()> {
        for attempt in 1..=self.config.retries {
            let ready = Command::new(&self.config.docker_binary)
                .arg("info")
                .output()
                .await
                .map(|output| output.status.success())
                .unwrap_or(false);

            if ready {
                info!("Container runtime daemon is ready");
                return Ok(());
            }

            warn!(
                "Container runtime daemon is not ready (attempt {}/{}), retrying...",
                attempt, self.config.retries
            );
            if attempt < self.config.retries {
                tokio::time::sleep(self.config.delay).await;
            }
        }

        Err(ContainerError::InstallError(
            "Docker daemon did not become ready in time".to_string(),
        ))
    }

    /// Write proxy settings to the daemon configuration file.
    ///
    /// # Errors
    ///
    /// Returns error if either proxy is empty or the file cannot be written.
    pub fn write_proxy_config(&self, http_proxy: &str, https_proxy: &str) -> Result<()> {
        write_proxy_config(&self.config.daemon_config_path, http_proxy, https_proxy)
    }
}

/// Write `{"proxies": {"http-proxy": .., "https-proxy": ..}}` to `path`.
pub fn write_proxy_config(path: &Path, http_proxy: &str, https_proxy: &str) -> Result<()> {
    if http_proxy.is_empty() {
        return Err(ContainerError::ConfigError(
            "http_proxy cannot be \"\"".to_string(),
        ));
    }
    if https_proxy.is_empty() {
        return Err(ContainerError::ConfigError(
            "https_proxy cannot be \"\"".to_string(),
        ));
    }

    let daemon_config = json!({
        "proxies": {
            "http-proxy": http_proxy,
            "https-proxy": https_proxy,
        }
    });

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(&daemon_config)
        .map_err(|e| ContainerError::Other(format!("Failed to encode daemon config: {}", e)))?;
    std::fs::write(path, content)?;

    debug!("Wrote proxy settings to {}", path.display());
    Ok(())
}

async fn run_apt(args: &[&str]) -> Result<()> {
    // Restart services automatically; the interactive prompt would block
    let output = Command::new("apt-get")
        .args(args)
        .env("NEEDRESTART_MODE", "a")
        .env("DEBIAN_FRONTEND", "noninteractive")
        .output()
        .await
        .map_err(|e| ContainerError::InstallError(format!("Failed to run apt-get: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("apt-get {} failed: {}", args.join(" "), stderr);
        return Err(ContainerError::InstallError(format!(
            "apt-get {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(())
}
