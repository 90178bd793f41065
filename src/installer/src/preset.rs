//! Distribution presets
//!
//! A preset captures what differs between Kubernetes distributions when it
//! comes to registering a containerd runtime: which file holds the config,
//! whether that file has to be materialised first, and which service to
//! restart afterwards.

use crate::error::Result;
use crate::host::HostFs;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/containerd/config.toml";
pub const MICROK8S_CONFIG_PATH: &str = "/var/snap/microk8s/current/args/containerd-template.toml";
pub const RKE2_CONFIG_PATH: &str = "/var/lib/rancher/rke2/agent/etc/containerd/config.toml.tmpl";
pub const K3S_CONFIG_PATH: &str = "/var/lib/rancher/k3s/agent/etc/containerd/config.toml.tmpl";
pub const K0S_CONFIG_PATH: &str = "/etc/k0s/containerd.d/config.toml";

/// Known Kubernetes distributions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distro {
    Default,
    MicroK8s,
    Rke2,
    K3s,
    K0s,
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::MicroK8s => write!(f, "microk8s"),
            Self::Rke2 => write!(f, "rke2"),
            Self::K3s => write!(f, "k3s"),
            Self::K0s => write!(f, "k0s"),
        }
    }
}

/// One-time preparation of the config file before it can be patched.
/// Every variant is idempotent and runs on each install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setup {
    None,
    /// Seed `<path>.tmpl` from the base `<path>` the distro generates, since
    /// the distro regenerates the base file from the template on start.
    CopyBaseToTemplate,
    /// Create an empty drop-in file.
    CreateEmpty,
}

/// Context handed to a preset's setup step
pub struct Env<'a> {
    pub host: &'a HostFs,
    pub config_path: &'a Path,
}

impl Setup {
    pub fn run(&self, env: &Env<'_>) -> Result<()> {
        match self {
            Setup::None => Ok(()),
            Setup::CopyBaseToTemplate => copy_base_to_template(env),
            Setup::CreateEmpty => create_empty(env),
        }
    }
}

fn copy_base_to_template(env: &Env<'_>) -> Result<()> {
    match env.host.exists(env.config_path) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let template = env.config_path.to_string_lossy();
    let base = PathBuf::from(template.strip_suffix(".tmpl").unwrap_or(&template));
    let contents = env.host.read(&base)?;
    env.host.write_atomic(env.config_path, &contents)?;

    tracing::info!(
        "[Preset] Seeded {} from {}",
        env.config_path.display(),
        base.display()
    );
    Ok(())
}

fn create_empty(env: &Env<'_>) -> Result<()> {
    match env.host.exists(env.config_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = env.config_path.parent() {
                env.host.create_dir_all(parent)?;
            }
            env.host.write_atomic(env.config_path, b"")?;
            tracing::info!("[Preset] Created empty {}", env.config_path.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Distribution-specific settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub distro: Distro,
    pub config_path: PathBuf,
    pub setup: Setup,
    /// Candidate service units hosting containerd, most specific first
    pub restart_units: &'static [&'static str],
}

impl Preset {
    pub fn default_preset() -> Self {
        Self {
            distro: Distro::Default,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            setup: Setup::None,
            restart_units: &["containerd"],
        }
    }

    pub fn microk8s() -> Self {
        Self {
            distro: Distro::MicroK8s,
            config_path: PathBuf::from(MICROK8S_CONFIG_PATH),
            setup: Setup::None,
            restart_units: &["snap.microk8s.daemon-containerd"],
        }
    }

    pub fn rke2() -> Self {
        Self {
            distro: Distro::Rke2,
            config_path: PathBuf::from(RKE2_CONFIG_PATH),
            setup: Setup::CopyBaseToTemplate,
            restart_units: &["rke2-server", "rke2-agent"],
        }
    }

    pub fn k3s() -> Self {
        Self {
            distro: Distro::K3s,
            config_path: PathBuf::from(K3S_CONFIG_PATH),
            setup: Setup::CopyBaseToTemplate,
            restart_units: &["k3s", "k3s-agent"],
        }
    }

    pub fn k0s() -> Self {
        Self {
            distro: Distro::K0s,
            config_path: PathBuf::from(K0S_CONFIG_PATH),
            setup: Setup::CreateEmpty,
            restart_units: &["k0sworker", "k0scontroller"],
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Run the one-time setup against the host.
    pub fn run_setup(&self, host: &HostFs) -> Result<()> {
        self.setup.run(&Env {
            host,
            config_path: &self.config_path,
        })
    }
}
