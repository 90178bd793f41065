//! Node-side shim installer
//!
//! Runs once per node inside a privileged job with the host root mounted.
//! Detects the Kubernetes distribution, registers (or removes) a containerd
//! shim in the runtime config, and keeps a ledger of installed shims so
//! re-runs are cheap no-ops.

pub mod config;
pub mod containerd;
pub mod detect;
pub mod error;
pub mod host;
pub mod ledger;
pub mod preset;
pub mod protocol;
pub mod restart;
pub mod templates;

pub use config::InstallerConfig;
pub use containerd::{runtime_name, AddOutcome, RuntimeConfig};
pub use error::{InstallerError, Result};
pub use host::HostFs;
pub use ledger::{Ledger, ShimEntry};
pub use preset::{Distro, Preset};
pub use protocol::{InstallOutcome, Installer};
pub use restart::{NoopRestarter, Restarter, SystemdRestarter};
