/// Controller runtime wiring
///
/// Watches Shims, the install jobs they own, and nodes. A node whose labels
/// changed re-queues every known Shim since it may have moved in or out of
/// any selector. Other node updates are dropped; node removal is picked up by
/// the periodic resync.
use crate::config::ControllerConfig;
use crate::crd::Shim;
use crate::manifest::JOB_LABEL;
use crate::node_status::NodeLabelCache;
use crate::reconciler::{error_policy, reconcile, Context};
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use std::sync::Arc;

pub async fn run(client: Client, config: ControllerConfig) -> anyhow::Result<()> {
    let shims: Api<Shim> = Api::all(client.clone());
    let jobs: Api<Job> = Api::namespaced(client.clone(), &config.namespace);
    let nodes: Api<Node> = Api::all(client.clone());

    // Fail fast when the CRD is not installed
    shims
        .list(&kube::api::ListParams::default().limit(1))
        .await
        .map_err(|e| anyhow::anyhow!("Shim CRD not queryable, is it installed? {}", e))?;

    let ctx = Arc::new(Context::new(client, config));

    let controller = Controller::new(shims, watcher::Config::default());
    let store = controller.store();
    let node_labels = NodeLabelCache::default();

    tracing::info!("starting shim controller");
    controller
        .owns(jobs, watcher::Config::default().labels(&format!("{}=true", JOB_LABEL)))
        .watches(nodes, watcher::Config::default(), move |node| {
            if !node_labels.labels_changed(&node) {
                return Vec::new();
            }
            store
                .state()
                .into_iter()
                .map(|shim| ObjectRef::from_obj(shim.as_ref()))
                .collect::<Vec<_>>()
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((shim, _)) => tracing::debug!(shim = %shim.name, "reconciled"),
                Err(e) => tracing::warn!(error = %e, "reconcile loop error"),
            }
        })
        .await;

    tracing::info!("shim controller stopped");
    Ok(())
}
