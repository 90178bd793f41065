/// Controller configuration
/// Loaded from shim-controller.toml, then overridden by command-line flags and env
use crate::error::{Error, Result};
use node_installer::config::{DEFAULT_ASSET_DIR, DEFAULT_HOST_ROOT, DEFAULT_INSTALL_ROOT};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_NAMESPACE: &str = "rcm-system";
pub const DEFAULT_FIELD_MANAGER: &str = "shim-controller";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Namespace the provisioning jobs run in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Image of the init container that fetches the shim
    #[serde(default)]
    pub downloader_image: String,

    /// Image running node-installer
    #[serde(default)]
    pub installer_image: String,

    /// ttlSecondsAfterFinished for install jobs; unset or non-positive keeps them
    #[serde(default)]
    pub job_ttl_seconds: Option<i32>,

    /// Where the job mounts the node's root filesystem
    #[serde(default = "default_host_mount_path")]
    pub host_mount_path: String,

    /// Shared volume the downloader writes into
    #[serde(default = "default_asset_mount_path")]
    pub asset_mount_path: String,

    /// Host path node-installer installs shims under
    #[serde(default = "default_install_root")]
    pub install_root: String,

    /// Server-side apply field manager
    #[serde(default = "default_field_manager")]
    pub field_manager: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_host_mount_path() -> String {
    DEFAULT_HOST_ROOT.to_string()
}

fn default_asset_mount_path() -> String {
    DEFAULT_ASSET_DIR.to_string()
}

fn default_install_root() -> String {
    DEFAULT_INSTALL_ROOT.to_string()
}

fn default_field_manager() -> String {
    DEFAULT_FIELD_MANAGER.to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            downloader_image: String::new(),
            installer_image: String::new(),
            job_ttl_seconds: None,
            host_mount_path: default_host_mount_path(),
            asset_mount_path: default_asset_mount_path(),
            install_root: default_install_root(),
            field_manager: default_field_manager(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from file, or defaults when the file does not exist.
    /// Not validated: flags may still fill in the images.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: ControllerConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        tracing::info!("Loaded controller config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("downloader_image", &self.downloader_image),
            ("installer_image", &self.installer_image),
            ("field_manager", &self.field_manager),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", field)));
            }
        }
        for (field, value) in [
            ("host_mount_path", &self.host_mount_path),
            ("asset_mount_path", &self.asset_mount_path),
            ("install_root", &self.install_root),
        ] {
            if !value.starts_with('/') {
                return Err(Error::Config(format!(
                    "{} must be an absolute path, got {}",
                    field, value
                )));
            }
        }
        Ok(())
    }

    /// Effective TTL for finished install jobs
    pub fn job_ttl(&self) -> Option<i32> {
        self.job_ttl_seconds.filter(|ttl| *ttl > 0)
    }
}
