/// Restarting the host's container runtime after its config changed.
///
/// The installer runs in a privileged pod with `hostPID`, so it reaches the
/// host's service manager by entering PID 1's namespaces.
use crate::error::{InstallerError, Result};
use std::process::Command;

/// Restarts whichever service hosts containerd on this distribution.
pub trait Restarter: Send + Sync {
    /// `units` is the preset's candidate list, most specific first.
    fn restart(&self, units: &[&str]) -> Result<()>;
}

/// Restarts the first active systemd unit out of the candidates.
#[derive(Debug, Default, Clone)]
pub struct SystemdRestarter;

impl SystemdRestarter {
    fn host_command(args: &[&str]) -> Command {
        let mut cmd = Command::new("nsenter");
        cmd.args([
            "--target", "1", "--mount", "--uts", "--ipc", "--net", "--pid", "--",
        ]);
        cmd.args(args);
        cmd
    }

    fn is_active(unit: &str) -> bool {
        Self::host_command(&["systemctl", "is-active", "--quiet", unit])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Restarter for SystemdRestarter {
    fn restart(&self, units: &[&str]) -> Result<()> {
        let unit = units
            .iter()
            .copied()
            .find(|unit| Self::is_active(unit))
            .ok_or_else(|| {
                InstallerError::Restart(format!(
                    "none of the units [{}] is active on the host",
                    units.join(", ")
                ))
            })?;

        tracing::info!("[Restart] Restarting {} to pick up the new runtime config", unit);

        let output = Self::host_command(&["systemctl", "restart", unit])
            .output()
            .map_err(|e| InstallerError::Restart(format!("Failed to run nsenter: {}", e)))?;

        if !output.status.success() {
            return Err(InstallerError::Restart(format!(
                "systemctl restart {} failed: {}",
                unit,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

/// Leaves the runtime alone; used when restarts are disabled by configuration.
#[derive(Debug, Default, Clone)]
pub struct NoopRestarter;

impl Restarter for NoopRestarter {
    fn restart(&self, units: &[&str]) -> Result<()> {
        tracing::warn!(
            "[Restart] Restart disabled, skipping restart of [{}]",
            units.join(", ")
        );
        Ok(())
    }
}
