//! Shared fixtures: a temp directory standing in for the node's root filesystem.
#![allow(dead_code)]

use node_installer::{HostFs, Installer, InstallerConfig, InstallerError, Restarter, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const K3S_BASE_CONFIG: &str = "/var/lib/rancher/k3s/agent/etc/containerd/config.toml";
pub const RKE2_BASE_CONFIG: &str = "/var/lib/rancher/rke2/agent/etc/containerd/config.toml";
pub const MICROK8S_CONFIG: &str = "/var/snap/microk8s/current/args/containerd-template.toml";
pub const K0S_SIGNATURE: &str = "/etc/k0s/containerd.toml";
pub const DEFAULT_CONFIG: &str = "/etc/containerd/config.toml";

pub struct FixtureHost {
    pub root: TempDir,
    pub assets: TempDir,
}

impl FixtureHost {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("Failed to create host root"),
            assets: TempDir::new().expect("Failed to create asset dir"),
        }
    }

    /// Host with only the given files, each holding `version = 2`.
    pub fn with_files(files: &[&str]) -> Self {
        let fixture = Self::new();
        for file in files {
            fixture.write(file, "version = 2");
        }
        fixture
    }

    pub fn host(&self) -> HostFs {
        HostFs::new(self.root.path())
    }

    pub fn physical(&self, host_path: &str) -> PathBuf {
        self.host().resolve(Path::new(host_path))
    }

    pub fn write(&self, host_path: &str, contents: &str) {
        let path = self.physical(host_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    pub fn read(&self, host_path: &str) -> String {
        std::fs::read_to_string(self.physical(host_path)).unwrap()
    }

    pub fn exists(&self, host_path: &str) -> bool {
        self.physical(host_path).exists()
    }

    pub fn write_asset(&self, shim_name: &str, contents: &[u8]) {
        std::fs::write(self.assets.path().join(shim_name), contents).unwrap();
    }

    pub fn config(&self) -> InstallerConfig {
        InstallerConfig {
            host_root: self.root.path().to_path_buf(),
            install_root: PathBuf::from("/opt/rcm"),
            asset_dir: self.assets.path().to_path_buf(),
            runtime_config_path: None,
            restart: true,
        }
    }

    pub fn installer(&self, restarter: &RecordingRestarter) -> Installer {
        Installer::new(&self.config(), Box::new(restarter.clone()))
    }
}

/// Restarter that records which unit lists it was asked to restart.
#[derive(Clone, Default)]
pub struct RecordingRestarter {
    pub calls: Arc<Mutex<Vec<Vec<String>>>>,
    failures_left: Arc<Mutex<usize>>,
}

impl RecordingRestarter {
    /// Restarter whose first `failures` calls fail after being recorded.
    pub fn failing(failures: usize) -> Self {
        Self {
            failures_left: Arc::new(Mutex::new(failures)),
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Vec<String>> {
        self.calls.lock().unwrap().last().cloned()
    }
}

impl Restarter for RecordingRestarter {
    fn restart(&self, units: &[&str]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(units.iter().map(|u| u.to_string()).collect());

        let mut failures_left = self.failures_left.lock().unwrap();
        if *failures_left > 0 {
            *failures_left -= 1;
            return Err(InstallerError::Restart("systemctl unavailable".to_string()));
        }
        Ok(())
    }
}
