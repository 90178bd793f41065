//! Per-node shim state
//!
//! Each node carries a label keyed by the shim name whose value is the node's
//! phase for that shim, plus an annotation recording when the phase last
//! changed. The controller is the only writer.

use crate::client::ClusterClient;
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    /// Install job dispatched, outcome not observed yet
    Pending,
    Provisioned,
    Failed,
}

impl NodePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Provisioned => "provisioned",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "provisioned" => Some(Self::Provisioned),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotation holding the RFC 3339 time of the last phase change
pub fn transition_annotation(shim: &str) -> String {
    format!("{}.runtime.spinkube.dev/transitioned-at", shim)
}

/// Phase recorded on `node` for `shim`. Unknown label values read as `None`.
pub fn phase_of(node: &Node, shim: &str) -> Option<NodePhase> {
    node.labels().get(shim).and_then(|v| NodePhase::parse(v))
}

/// Whether the node carries the shim label at all, whatever its value
pub fn is_labeled(node: &Node, shim: &str) -> bool {
    node.labels().contains_key(shim)
}

/// Merge patch that sets (or, for `None`, removes) the phase label and its
/// timestamp annotation.
pub fn phase_patch(shim: &str, phase: Option<NodePhase>, now: DateTime<Utc>) -> serde_json::Value {
    let annotation = transition_annotation(shim);
    match phase {
        Some(phase) => serde_json::json!({
            "metadata": {
                "labels": { shim: phase.as_str() },
                "annotations": { annotation: now.to_rfc3339_opts(SecondsFormat::Secs, true) },
            }
        }),
        None => serde_json::json!({
            "metadata": {
                "labels": { shim: null },
                "annotations": { annotation: null },
            }
        }),
    }
}

/// Apply a phase to a local copy so later steps of the same pass see it.
pub fn set_local_phase(node: &mut Node, shim: &str, phase: Option<NodePhase>) {
    let labels = node.labels_mut();
    match phase {
        Some(phase) => {
            labels.insert(shim.to_string(), phase.as_str().to_string());
        }
        None => {
            labels.remove(shim);
        }
    }
}

/// Last seen label set per node, so node watch events that only touch status
/// (kubelet heartbeats) do not re-queue every Shim.
#[derive(Debug, Default)]
pub struct NodeLabelCache {
    seen: Mutex<HashMap<String, u64>>,
}

impl NodeLabelCache {
    /// True the first time a node is seen and whenever its labels differ
    /// from the previous call.
    pub fn labels_changed(&self, node: &Node) -> bool {
        let mut hasher = DefaultHasher::new();
        node.labels().hash(&mut hasher);
        let digest = hasher.finish();

        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.insert(node.name_any(), digest) != Some(digest)
    }
}

/// Observed state of a provisioning job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Missing,
    Running,
    Succeeded,
    Failed,
}

impl JobOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

pub fn job_outcome(job: Option<&Job>) -> JobOutcome {
    let Some(job) = job else {
        return JobOutcome::Missing;
    };
    let Some(status) = job.status.as_ref() else {
        return JobOutcome::Running;
    };

    let finished_as = |type_: &str| {
        status
            .conditions
            .as_ref()
            .is_some_and(|cs| cs.iter().any(|c| c.type_ == type_ && c.status == "True"))
    };

    if finished_as("Complete") || status.succeeded.unwrap_or(0) > 0 {
        JobOutcome::Succeeded
    } else if finished_as("Failed") {
        JobOutcome::Failed
    } else {
        JobOutcome::Running
    }
}

/// Phase a pending node moves to given its install job. `None` keeps it pending.
pub fn settle_pending(outcome: JobOutcome) -> Option<NodePhase> {
    match outcome {
        JobOutcome::Succeeded => Some(NodePhase::Provisioned),
        JobOutcome::Failed | JobOutcome::Missing => Some(NodePhase::Failed),
        JobOutcome::Running => None,
    }
}

/// Writes node phases for one shim
pub struct NodeStatusTracker<'a> {
    client: &'a dyn ClusterClient,
    shim: &'a str,
}

impl<'a> NodeStatusTracker<'a> {
    pub fn new(client: &'a dyn ClusterClient, shim: &'a str) -> Self {
        Self { client, shim }
    }

    pub async fn mark_pending(&self, node: &str) -> Result<()> {
        self.write(node, Some(NodePhase::Pending)).await
    }

    pub async fn mark_provisioned(&self, node: &str) -> Result<()> {
        self.write(node, Some(NodePhase::Provisioned)).await
    }

    pub async fn mark_failed(&self, node: &str) -> Result<()> {
        self.write(node, Some(NodePhase::Failed)).await
    }

    /// Drop the label once the shim no longer concerns the node
    pub async fn clear(&self, node: &str) -> Result<()> {
        self.write(node, None).await
    }

    pub async fn write(&self, node: &str, phase: Option<NodePhase>) -> Result<()> {
        tracing::debug!(
            shim = %self.shim,
            node = %node,
            phase = phase.map(|p| p.as_str()).unwrap_or("absent"),
            "updating node phase"
        );
        self.client.set_node_phase(node, self.shim, phase).await
    }
}
