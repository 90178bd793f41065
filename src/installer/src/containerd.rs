//! containerd runtime config patching
//!
//! Runtimes are registered by appending a self-contained TOML block per shim
//! and de-registered by cutting that exact block back out. The file itself is
//! owned by the container runtime; the installer never creates it.

use crate::error::{InstallerError, Result};
use crate::host::HostFs;
use crate::templates::TemplateRenderer;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Filename prefix containerd expects for shim binaries
pub const SHIM_BINARY_PREFIX: &str = "containerd-shim-";

/// Runtime name derived from a shim binary's base filename.
pub fn runtime_name(shim_path: &Path) -> String {
    let base = shim_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.strip_prefix(SHIM_BINARY_PREFIX)
        .map(str::to_string)
        .unwrap_or(base)
}

/// Whether `config` already registers `runtime_name`.
pub fn is_registered(config: &str, runtime_name: &str) -> bool {
    config.contains(&format!("containerd.runtimes.{}]", runtime_name))
}

/// Whether a registration was added or was already present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

pub struct RuntimeConfig<'a> {
    host: &'a HostFs,
    config_path: PathBuf,
    templates: TemplateRenderer,
}

impl<'a> RuntimeConfig<'a> {
    pub fn new(host: &'a HostFs, config_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            host,
            config_path: config_path.into(),
            templates: TemplateRenderer::from_embedded()?,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn read_existing(&self) -> Result<String> {
        match self.host.read_to_string(&self.config_path) {
            Ok(data) => Ok(data),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(InstallerError::ConfigMissing {
                    path: self.config_path.clone(),
                    source,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Register the shim at `shim_path` (a host path).
    pub fn add_runtime(&self, shim_path: &Path) -> Result<AddOutcome> {
        let name = runtime_name(shim_path);
        let data = self.read_existing()?;

        if is_registered(&data, &name) {
            tracing::info!("[RuntimeConfig] Runtime '{}' already exists, skipping", name);
            return Ok(AddOutcome::AlreadyPresent);
        }

        let block = self
            .templates
            .render_runtime_block(&name, &shim_path.to_string_lossy())?;

        // Append only: the rest of the file is left byte-for-byte as it was.
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(self.host.resolve(&self.config_path))?;
        file.write_all(block.as_bytes())?;
        file.sync_all()?;

        tracing::info!(
            "[RuntimeConfig] Registered runtime '{}' in {}",
            name,
            self.config_path.display()
        );
        Ok(AddOutcome::Added)
    }

    /// Remove the registration previously added for `shim_path`.
    ///
    /// Unlike [`RuntimeConfig::add_runtime`], a missing registration is an
    /// error: the caller believed the shim was installed.
    pub fn remove_runtime(&self, shim_path: &Path) -> Result<()> {
        let name = runtime_name(shim_path);
        let data = self.read_existing()?;

        if !is_registered(&data, &name) {
            return Err(InstallerError::RuntimeNotRegistered {
                path: self.config_path.clone(),
                runtime: name,
            });
        }

        let block = self
            .templates
            .render_runtime_block(&name, &shim_path.to_string_lossy())?;
        if !data.contains(&block) {
            return Err(InstallerError::RegistrationModified {
                path: self.config_path.clone(),
                runtime: name,
            });
        }

        let modified = data.replace(&block, "");
        self.host.write_atomic(&self.config_path, modified.as_bytes())?;

        tracing::info!(
            "[RuntimeConfig] Removed runtime '{}' from {}",
            name,
            self.config_path.display()
        );
        Ok(())
    }
}
