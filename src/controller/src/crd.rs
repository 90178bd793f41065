//! Shim custom resource
//!
//! Cluster-scoped description of a shim to roll out: where to fetch it, which
//! nodes get it, the RuntimeClass that exposes it and how fast to roll.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Finalizer held while uninstall work may still be outstanding
pub const SHIM_FINALIZER: &str = "rcm.spinkube.dev/finalizer";

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "runtime.spinkube.dev",
    version = "v1alpha1",
    kind = "Shim",
    status = "ShimStatus",
    printcolumn = r#"{"name":"RuntimeClass","type":"string","jsonPath":".spec.runtimeClass.name"}"#,
    printcolumn = r#"{"name":"Ready","type":"integer","jsonPath":".status.nodesReady"}"#,
    printcolumn = r#"{"name":"Nodes","type":"integer","jsonPath":".status.nodes"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ShimSpec {
    /// Nodes to install on; every node when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    pub fetch_strategy: FetchStrategy,

    pub runtime_class: RuntimeClassSpec,

    #[serde(default)]
    pub rollout_strategy: RolloutStrategy,
}

/// Where the downloader fetches the shim from
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FetchStrategy {
    #[serde(rename = "type", default)]
    pub type_: String,

    pub anon_http: AnonHttpSpec,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct AnonHttpSpec {
    /// URL of the shim archive
    pub location: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RuntimeClassSpec {
    pub name: String,
    /// containerd runtime name the RuntimeClass points at
    pub handler: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RolloutStrategyType {
    /// Install on every qualifying node at once
    #[default]
    Recreate,
    /// Keep at most `maxUpdate` nodes pending
    Rolling,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStrategy {
    #[serde(rename = "type", default)]
    pub type_: RolloutStrategyType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling: Option<RollingSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RollingSpec {
    #[serde(default)]
    pub max_update: u32,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShimStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Qualifying nodes
    #[serde(rename = "nodes", default)]
    pub node_count: u32,

    /// Qualifying nodes labeled provisioned
    #[serde(rename = "nodesReady", default)]
    pub node_ready_count: u32,
}

impl ShimStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    pub reason: String,

    pub message: String,

    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
        }
    }
}

impl Shim {
    /// Whether the shim is being deleted
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == SHIM_FINALIZER))
    }

    /// `maxUpdate` of a rolling rollout, floored at 1
    pub fn max_update(&self) -> usize {
        self.spec
            .rollout_strategy
            .rolling
            .as_ref()
            .map(|r| r.max_update as usize)
            .unwrap_or(0)
            .max(1)
    }

    /// Whether the RuntimeClass handler names the containerd runtime the node
    /// installer registers, which is always the Shim's own name.
    pub fn handler_matches_runtime(&self) -> bool {
        self.metadata.name.as_deref() == Some(self.spec.runtime_class.handler.as_str())
    }

    /// Label selector for qualifying nodes; empty selects every node.
    pub fn node_label_selector(&self) -> String {
        self.spec
            .node_selector
            .as_ref()
            .map(|selector| {
                selector
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default()
    }
}
