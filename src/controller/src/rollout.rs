//! Rollout strategies: which qualifying nodes get an install job this pass.

use crate::crd::{RolloutStrategyType, Shim};
use crate::node_status::{phase_of, NodePhase};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

/// A node needs an install unless it is already pending or provisioned.
pub fn needs_install(node: &Node, shim: &str) -> bool {
    !matches!(
        phase_of(node, shim),
        Some(NodePhase::Pending) | Some(NodePhase::Provisioned)
    )
}

/// Nodes currently pending for `shim`
pub fn in_flight(nodes: &[Node], shim: &str) -> usize {
    nodes
        .iter()
        .filter(|n| phase_of(n, shim) == Some(NodePhase::Pending))
        .count()
}

/// Select the nodes to dispatch installs to.
///
/// `Recreate` takes every node that needs an install. `Rolling` keeps the
/// number of pending nodes at or below `maxUpdate` (at least one), picking
/// nodes in name order so successive passes walk the fleet predictably.
pub fn select_for_install<'a>(shim: &Shim, nodes: &'a [Node]) -> Vec<&'a Node> {
    let shim_name = shim.name_any();
    let candidates = nodes.iter().filter(|n| needs_install(n, &shim_name));

    match shim.spec.rollout_strategy.type_ {
        RolloutStrategyType::Recreate => candidates.collect(),
        RolloutStrategyType::Rolling => {
            let budget = shim
                .max_update()
                .saturating_sub(in_flight(nodes, &shim_name));
            let mut candidates: Vec<&Node> = candidates.collect();
            candidates.sort_by_key(|n| n.name_any());
            candidates.truncate(budget);
            candidates
        }
    }
}
