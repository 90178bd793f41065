//! Tests for aggregate status and node phases

mod common;

use chrono::{Duration, Utc};
use common::*;
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use shim_controller::crd::ConditionStatus;
use shim_controller::node_status::{
    job_outcome, phase_of, phase_patch, settle_pending, transition_annotation, JobOutcome,
    NodeLabelCache,
};
use shim_controller::status::{aggregate, needs_update, READY_CONDITION};
use shim_controller::NodePhase;

fn job_with(condition: Option<&str>, succeeded: Option<i32>) -> Job {
    Job {
        status: Some(JobStatus {
            conditions: condition.map(|c| {
                vec![JobCondition {
                    type_: c.to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]
            }),
            succeeded,
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn test_ready_when_all_nodes_provisioned() {
    let nodes = vec![node("a", Some("provisioned")), node("b", Some("provisioned"))];
    let status = aggregate(SHIM, &nodes, None, Utc::now());

    assert_eq!(status.node_count, 2);
    assert_eq!(status.node_ready_count, 2);
    let ready = status.condition(READY_CONDITION).unwrap();
    assert_eq!(ready.status, ConditionStatus::True);
}

#[test]
fn test_not_ready_with_pending_nodes() {
    let nodes = vec![node("a", Some("provisioned")), node("b", Some("pending"))];
    let status = aggregate(SHIM, &nodes, None, Utc::now());

    let ready = status.condition(READY_CONDITION).unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert!(ready.message.contains("Ready nodes: 1, Total nodes: 2"));
}

#[test]
fn test_no_nodes_is_ready() {
    let status = aggregate(SHIM, &[], None, Utc::now());
    assert_eq!(status.node_count, 0);
    assert_eq!(
        status.condition(READY_CONDITION).unwrap().status,
        ConditionStatus::True
    );
}

#[test]
fn test_transition_time_kept_while_status_unchanged() {
    let earlier = Utc::now() - Duration::hours(1);
    let nodes = vec![node("a", Some("pending"))];
    let first = aggregate(SHIM, &nodes, None, earlier);

    let second = aggregate(SHIM, &nodes, Some(&first), Utc::now());
    assert_eq!(
        second.condition(READY_CONDITION).unwrap().last_transition_time,
        earlier
    );
    assert!(!needs_update(Some(&first), &second));

    let provisioned = vec![node("a", Some("provisioned"))];
    let third = aggregate(SHIM, &provisioned, Some(&second), Utc::now());
    assert!(third.condition(READY_CONDITION).unwrap().last_transition_time > earlier);
    assert!(needs_update(Some(&second), &third));
}

#[test]
fn test_phase_of_reads_label() {
    assert_eq!(phase_of(&node("a", Some("pending")), SHIM), Some(NodePhase::Pending));
    assert_eq!(phase_of(&node("a", Some("provisioned")), SHIM), Some(NodePhase::Provisioned));
    assert_eq!(phase_of(&node("a", Some("unknown")), SHIM), None);
    assert_eq!(phase_of(&node("a", None), SHIM), None);
}

#[test]
fn test_phase_patch_sets_label_and_timestamp() {
    let now = Utc::now();
    let patch = phase_patch(SHIM, Some(NodePhase::Pending), now);

    assert_eq!(patch["metadata"]["labels"][SHIM], "pending");
    let stamp = patch["metadata"]["annotations"][transition_annotation(SHIM).as_str()]
        .as_str()
        .unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
}

#[test]
fn test_phase_patch_removal_nulls_keys() {
    let patch = phase_patch(SHIM, None, Utc::now());
    assert!(patch["metadata"]["labels"][SHIM].is_null());
    assert!(patch["metadata"]["labels"]
        .as_object()
        .unwrap()
        .contains_key(SHIM));
}

#[test]
fn test_job_outcomes() {
    assert_eq!(job_outcome(None), JobOutcome::Missing);
    assert_eq!(job_outcome(Some(&Job::default())), JobOutcome::Running);
    assert_eq!(job_outcome(Some(&job_with(Some("Complete"), None))), JobOutcome::Succeeded);
    assert_eq!(job_outcome(Some(&job_with(None, Some(1)))), JobOutcome::Succeeded);
    assert_eq!(job_outcome(Some(&job_with(Some("Failed"), None))), JobOutcome::Failed);
    assert_eq!(job_outcome(Some(&job_with(None, None))), JobOutcome::Running);
}

#[test]
fn test_settle_pending_transitions() {
    assert_eq!(settle_pending(JobOutcome::Succeeded), Some(NodePhase::Provisioned));
    assert_eq!(settle_pending(JobOutcome::Failed), Some(NodePhase::Failed));
    assert_eq!(settle_pending(JobOutcome::Missing), Some(NodePhase::Failed));
    assert_eq!(settle_pending(JobOutcome::Running), None);
}

#[test]
fn test_node_label_cache_ignores_status_only_updates() {
    let cache = NodeLabelCache::default();
    let mut worker = node("worker-1", None);
    assert!(cache.labels_changed(&worker));

    // heartbeat: annotations and status move, labels do not
    worker.metadata.annotations = Some(
        [("node.alpha.kubernetes.io/ttl".to_string(), "0".to_string())].into(),
    );
    worker.metadata.resource_version = Some("42".to_string());
    assert!(!cache.labels_changed(&worker));

    worker
        .metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert("spin".to_string(), "true".to_string());
    assert!(cache.labels_changed(&worker));
    assert!(!cache.labels_changed(&worker));

    // same labels on another node is still a first sighting
    assert!(cache.labels_changed(&node("worker-2", None)));
}
