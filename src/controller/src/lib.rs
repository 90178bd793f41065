//! Shim rollout controller
//!
//! Reconciles `Shim` resources: labels qualifying nodes with their install
//! phase, dispatches node-installer jobs, keeps the matching RuntimeClass in
//! place and uninstalls from every labeled node before a Shim goes away.

pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod manifest;
pub mod node_status;
pub mod reconciler;
pub mod rollout;
pub mod status;

pub use client::{ClusterClient, KubeClusterClient};
pub use config::ControllerConfig;
pub use crd::{Shim, ShimSpec, ShimStatus};
pub use error::{Error, Result};
pub use manifest::{job_name, ManifestBuilder, Operation};
pub use node_status::{NodePhase, NodeStatusTracker};
pub use reconciler::{error_policy, reconcile, Context};
