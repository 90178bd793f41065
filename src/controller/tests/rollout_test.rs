//! Tests for rollout node selection

mod common;

use common::*;
use kube::ResourceExt;
use shim_controller::rollout::{in_flight, needs_install, select_for_install};

fn names(nodes: Vec<&k8s_openapi::api::core::v1::Node>) -> Vec<String> {
    nodes.into_iter().map(|n| n.name_any()).collect()
}

#[test]
fn test_needs_install_by_phase() {
    assert!(needs_install(&node("a", None), SHIM));
    assert!(needs_install(&node("a", Some("failed")), SHIM));
    assert!(needs_install(&node("a", Some("garbage")), SHIM));
    assert!(!needs_install(&node("a", Some("pending")), SHIM));
    assert!(!needs_install(&node("a", Some("provisioned")), SHIM));
}

#[test]
fn test_recreate_selects_every_node_needing_install() {
    let nodes = vec![
        node("node-a", None),
        node("node-b", Some("failed")),
        node("node-c", Some("provisioned")),
        node("node-d", Some("pending")),
    ];

    assert_eq!(
        names(select_for_install(&shim(), &nodes)),
        vec!["node-a", "node-b"]
    );
}

#[test]
fn test_rolling_bounds_pending_nodes() {
    let nodes = vec![
        node("node-c", None),
        node("node-a", None),
        node("node-b", None),
    ];

    assert_eq!(
        names(select_for_install(&rolling_shim(2), &nodes)),
        vec!["node-a", "node-b"]
    );
}

#[test]
fn test_rolling_counts_in_flight_nodes() {
    let nodes = vec![
        node("node-a", Some("pending")),
        node("node-b", Some("pending")),
        node("node-c", None),
    ];
    assert_eq!(in_flight(&nodes, SHIM), 2);
    assert!(select_for_install(&rolling_shim(2), &nodes).is_empty());
    assert_eq!(names(select_for_install(&rolling_shim(3), &nodes)), vec!["node-c"]);
}

#[test]
fn test_rolling_zero_max_update_still_progresses() {
    let nodes = vec![node("node-b", None), node("node-a", None)];
    assert_eq!(names(select_for_install(&rolling_shim(0), &nodes)), vec!["node-a"]);
}
