//! Distribution detection
//!
//! Picks the [`Preset`] for this node, either from an explicit config path or
//! by probing the host for the files each distribution is known to create.

use crate::error::{InstallerError, Result};
use crate::host::HostFs;
use crate::preset::{Preset, DEFAULT_CONFIG_PATH};
use std::path::Path;

/// Signature files, in probe order. Distro-specific locations come before
/// the generic default because the default file can exist alongside them.
pub fn known_locations() -> Vec<(&'static str, Preset)> {
    vec![
        (
            "/var/snap/microk8s/current/args/containerd-template.toml",
            Preset::microk8s(),
        ),
        (
            "/var/lib/rancher/rke2/agent/etc/containerd/config.toml",
            Preset::rke2(),
        ),
        (
            "/var/lib/rancher/k3s/agent/etc/containerd/config.toml",
            Preset::k3s(),
        ),
        ("/etc/k0s/containerd.toml", Preset::k0s()),
    ]
}

/// Resolve the preset for this host.
///
/// An override path that matches a known signature yields that distro's
/// preset; any other override falls back to the default preset pointed at the
/// override, since custom setups are expected.
pub fn resolve(host: &HostFs, override_path: Option<&Path>) -> Result<Preset> {
    if let Some(path) = override_path {
        if let Some((_, preset)) = known_locations()
            .into_iter()
            .find(|(location, _)| Path::new(location) == path)
        {
            tracing::info!(
                "[Detect] Config override {} matches {}",
                path.display(),
                preset.distro
            );
            return Ok(preset);
        }

        tracing::warn!(
            "[Detect] Could not determine distro from containerd config {}, falling back to defaults",
            path.display()
        );
        return Ok(Preset::default_preset().with_config_path(path));
    }

    let mut probes = Vec::new();

    for (location, preset) in known_locations() {
        match host.exists(Path::new(location)) {
            Ok(()) => {
                tracing::info!("[Detect] Found {}, using {} preset", location, preset.distro);
                return Ok(preset);
            }
            Err(e) => probes.push(format!("{}: {}", location, e)),
        }
    }

    match host.exists(Path::new(DEFAULT_CONFIG_PATH)) {
        Ok(()) => {
            tracing::info!("[Detect] Found {}, using default preset", DEFAULT_CONFIG_PATH);
            Ok(Preset::default_preset())
        }
        Err(e) => {
            probes.push(format!("{}: {}", DEFAULT_CONFIG_PATH, e));
            Err(InstallerError::DistroUndetectable { probes })
        }
    }
}
