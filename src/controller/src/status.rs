//! Aggregate Shim status
use crate::crd::{Condition, ConditionStatus, ShimStatus};
use crate::node_status::{phase_of, NodePhase};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;

pub const READY_CONDITION: &str = "Ready";

/// Status derived from the qualifying nodes' labels.
///
/// `Ready` is true iff every qualifying node is provisioned, which includes
/// the empty set. The previous transition time is kept while the condition
/// status does not change.
pub fn aggregate(
    shim: &str,
    nodes: &[Node],
    previous: Option<&ShimStatus>,
    now: DateTime<Utc>,
) -> ShimStatus {
    let node_count = nodes.len() as u32;
    let node_ready_count = nodes
        .iter()
        .filter(|n| phase_of(n, shim) == Some(NodePhase::Provisioned))
        .count() as u32;

    let (status, reason, message) = if node_ready_count == node_count {
        (ConditionStatus::True, "ShimReady", "Shim is ready".to_string())
    } else {
        (
            ConditionStatus::False,
            "ShimNotReady",
            format!(
                "Shim is not ready. Ready nodes: {}, Total nodes: {}",
                node_ready_count, node_count
            ),
        )
    };

    let last_transition_time = previous
        .and_then(|p| p.condition(READY_CONDITION))
        .filter(|c| c.status == status)
        .map(|c| c.last_transition_time)
        .unwrap_or(now);

    ShimStatus {
        conditions: vec![Condition::new(
            READY_CONDITION,
            status,
            reason,
            message,
            last_transition_time,
        )],
        node_count,
        node_ready_count,
    }
}

/// Whether `next` differs from what is already recorded
pub fn needs_update(previous: Option<&ShimStatus>, next: &ShimStatus) -> bool {
    match previous {
        None => true,
        Some(previous) => previous != next,
    }
}
