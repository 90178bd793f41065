/// Installer configuration
/// Loaded from node-installer.toml, then overridden by command-line flags
use crate::error::{InstallerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST_ROOT: &str = "/mnt/node-root";
pub const DEFAULT_INSTALL_ROOT: &str = "/opt/rcm";
pub const DEFAULT_ASSET_DIR: &str = "/assets";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Where the node's root filesystem is mounted inside the installer container
    #[serde(default = "default_host_root")]
    pub host_root: PathBuf,

    /// Host path that receives shim binaries and the ledger
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// Container-local directory the fetch step downloads shims into
    #[serde(default = "default_asset_dir")]
    pub asset_dir: PathBuf,

    /// Explicit containerd config path (host path); detected when unset
    #[serde(default)]
    pub runtime_config_path: Option<PathBuf>,

    /// Restart the container runtime after a config change
    #[serde(default = "default_true")]
    pub restart: bool,
}

fn default_host_root() -> PathBuf {
    PathBuf::from(DEFAULT_HOST_ROOT)
}

fn default_install_root() -> PathBuf {
    PathBuf::from(DEFAULT_INSTALL_ROOT)
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ASSET_DIR)
}

fn default_true() -> bool {
    true
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            host_root: default_host_root(),
            install_root: default_install_root(),
            asset_dir: default_asset_dir(),
            runtime_config_path: None,
            restart: true,
        }
    }
}

impl InstallerConfig {
    /// Load configuration from file, or defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            InstallerError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: InstallerConfig = toml::from_str(&content).map_err(|e| {
            InstallerError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        tracing::info!("Loaded installer config from {:?}", path);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.install_root.is_absolute() {
            return Err(InstallerError::Config(format!(
                "install_root must be an absolute host path, got {}",
                self.install_root.display()
            )));
        }
        if let Some(path) = &self.runtime_config_path {
            if !path.is_absolute() {
                return Err(InstallerError::Config(format!(
                    "runtime_config_path must be an absolute host path, got {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
