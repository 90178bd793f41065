//! Install / uninstall protocol
//!
//! Both operations are whole-unit and safe to re-run: the ledger decides
//! whether an install has anything to do, and every config change is paired
//! with the matching ledger change so the two never drift apart.
//!
//! An install is only recorded in the ledger once the runtime has been
//! restarted with the new registration, so a failed restart is retried by
//! the next run instead of being skipped as "unchanged".

use crate::config::InstallerConfig;
use crate::containerd::{AddOutcome, RuntimeConfig, SHIM_BINARY_PREFIX};
use crate::detect;
use crate::error::{InstallerError, Result};
use crate::host::HostFs;
use crate::ledger::{Ledger, ShimEntry};
use crate::preset::Preset;
use crate::restart::Restarter;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Host path of the installed binary
    pub shim_path: PathBuf,
    /// False when the binary was already recorded and registered, so the
    /// runtime was not restarted
    pub changed: bool,
}

pub struct Installer {
    host: HostFs,
    install_root: PathBuf,
    asset_dir: PathBuf,
    runtime_config_path: Option<PathBuf>,
    restarter: Box<dyn Restarter>,
}

impl Installer {
    pub fn new(config: &InstallerConfig, restarter: Box<dyn Restarter>) -> Self {
        Self {
            host: HostFs::new(&config.host_root),
            install_root: config.install_root.clone(),
            asset_dir: config.asset_dir.clone(),
            runtime_config_path: config.runtime_config_path.clone(),
            restarter,
        }
    }

    pub fn host(&self) -> &HostFs {
        &self.host
    }

    /// Host path a shim is installed to.
    pub fn shim_path(&self, shim_name: &str) -> PathBuf {
        self.install_root
            .join("bin")
            .join(format!("{}{}", SHIM_BINARY_PREFIX, shim_name))
    }

    pub fn resolve_preset(&self) -> Result<Preset> {
        detect::resolve(&self.host, self.runtime_config_path.as_deref())
    }

    /// Install the shim the fetch step left at `<asset_dir>/<shim_name>`.
    pub fn install(&self, shim_name: &str) -> Result<InstallOutcome> {
        let preset = self.resolve_preset()?;
        preset.run_setup(&self.host)?;

        let asset = self.asset_dir.join(shim_name);
        let binary = match std::fs::read(&asset) {
            Ok(binary) => binary,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InstallerError::AssetMissing(asset))
            }
            Err(e) => return Err(e.into()),
        };
        let sha256: [u8; 32] = Sha256::digest(&binary).into();

        let shim_path = self.shim_path(shim_name);
        let runtime_config = RuntimeConfig::new(&self.host, &preset.config_path)?;
        let mut ledger = Ledger::load(&self.host, &self.install_root)?;

        let binary_present = self.host.exists(&shim_path).is_ok();
        if binary_present && !ledger.changed(shim_name, &sha256, &shim_path) {
            // The config may have been regenerated since the last run.
            if matches!(runtime_config.add_runtime(&shim_path)?, AddOutcome::Added) {
                // Unrecorded until the runtime has picked the block up.
                ledger.remove(shim_name);
                ledger.write()?;
                self.restarter.restart(preset.restart_units)?;
                record(&mut ledger, shim_name, sha256, &shim_path)?;
                tracing::info!(
                    "[Installer] Shim {} unchanged, re-registered runtime in {}",
                    shim_name,
                    preset.config_path.display()
                );
                return Ok(InstallOutcome {
                    shim_path,
                    changed: true,
                });
            }
            tracing::info!(
                "[Installer] Shim {} unchanged (sha256 {}), nothing to do",
                shim_name,
                hex::encode(sha256)
            );
            return Ok(InstallOutcome {
                shim_path,
                changed: false,
            });
        }

        if let Some(parent) = shim_path.parent() {
            self.host.create_dir_all(parent)?;
        }
        self.host.write_atomic_with_mode(&shim_path, &binary, 0o755)?;
        tracing::info!(
            "[Installer] Copied {} to {}",
            asset.display(),
            shim_path.display()
        );

        runtime_config.add_runtime(&shim_path)?;
        self.restarter.restart(preset.restart_units)?;

        record(&mut ledger, shim_name, sha256, &shim_path)?;

        tracing::info!(
            "[Installer] Installed shim {} ({} preset, config {})",
            shim_name,
            preset.distro,
            preset.config_path.display()
        );
        Ok(InstallOutcome {
            shim_path,
            changed: true,
        })
    }

    /// Uninstall a shim recorded in the ledger. Returns the removed host path.
    pub fn uninstall(&self, shim_name: &str) -> Result<PathBuf> {
        let mut ledger = Ledger::load(&self.host, &self.install_root)?;
        let entry = ledger.get(shim_name).cloned().ok_or_else(|| {
            tracing::error!("[Installer] Shim {} not installed", shim_name);
            InstallerError::ShimNotInstalled(shim_name.to_string())
        })?;

        let preset = self.resolve_preset()?;
        RuntimeConfig::new(&self.host, &preset.config_path)?.remove_runtime(&entry.path)?;

        remove_binary(&self.host, &entry.path)?;

        ledger.remove(shim_name);
        ledger.write()?;

        self.restarter.restart(preset.restart_units)?;

        tracing::info!(
            "[Installer] Uninstalled shim {} from {}",
            shim_name,
            entry.path.display()
        );
        Ok(entry.path)
    }
}

fn record(ledger: &mut Ledger<'_>, shim_name: &str, sha256: [u8; 32], path: &Path) -> Result<()> {
    ledger.put(
        shim_name,
        ShimEntry {
            sha256,
            path: path.to_path_buf(),
        },
    );
    ledger.write()
}

fn remove_binary(host: &HostFs, path: &Path) -> Result<()> {
    match host.remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                "[Installer] Shim binary {} already gone, continuing",
                path.display()
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
