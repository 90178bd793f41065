//! Installer error types
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InstallerError>;

#[derive(Debug, Error)]
pub enum InstallerError {
    /// None of the known containerd config locations exist on the host.
    #[error("failed to detect containerd config path: {}", .probes.join("; "))]
    DistroUndetectable { probes: Vec<String> },

    /// The runtime config must be provisioned by the container runtime itself.
    #[error("containerd config {} does not exist: {source}", .path.display())]
    ConfigMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {} does not contain a runtime config for '{runtime}'", .path.display())]
    RuntimeNotRegistered { path: PathBuf, runtime: String },

    #[error("runtime config for '{runtime}' in {} was modified outside the installer", .path.display())]
    RegistrationModified { path: PathBuf, runtime: String },

    #[error("shim '{0}' not installed")]
    ShimNotInstalled(String),

    #[error("shim asset not found at {}", .0.display())]
    AssetMissing(PathBuf),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Restart error: {0}")]
    Restart(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
