//! Shim reconciliation
//!
//! Level-triggered: every pass recomputes the qualifying node set and the
//! per-node phases from the API server and converges towards the Shim's spec.
//! Nothing learned in one pass is trusted in the next.

use crate::client::{ClusterClient, KubeClusterClient};
use crate::config::ControllerConfig;
use crate::crd::{Shim, SHIM_FINALIZER};
use crate::error::{Error, Result};
use crate::manifest::{job_name, ManifestBuilder, Operation};
use crate::node_status::{
    is_labeled, job_outcome, phase_of, set_local_phase, settle_pending, NodePhase,
    NodeStatusTracker,
};
use crate::rollout::{in_flight, select_for_install};
use crate::status;
use chrono::Utc;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Requeue while installs are in flight, to observe their jobs
pub const PENDING_REQUEUE: Duration = Duration::from_secs(30);
/// Requeue after deleting a finished job that blocks a re-dispatch
pub const RECYCLE_REQUEUE: Duration = Duration::from_secs(5);
/// Periodic resync once everything is settled
pub const IDLE_REQUEUE: Duration = Duration::from_secs(300);
pub const ERROR_REQUEUE: Duration = Duration::from_secs(5);
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Shared state handed to every reconcile
pub struct Context {
    pub client: Arc<dyn ClusterClient>,
    pub manifests: ManifestBuilder,
}

impl Context {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let field_manager = config.field_manager.clone();
        Self {
            client: Arc::new(KubeClusterClient::new(client, field_manager)),
            manifests: ManifestBuilder::new(config),
        }
    }

    /// Context over a mock client
    #[cfg(test)]
    pub fn for_testing(client: Arc<dyn ClusterClient>, config: ControllerConfig) -> Self {
        Self {
            client,
            manifests: ManifestBuilder::new(config),
        }
    }

    fn namespace(&self) -> &str {
        &self.manifests.config().namespace
    }

    fn tracker<'a>(&'a self, shim: &'a str) -> NodeStatusTracker<'a> {
        NodeStatusTracker::new(self.client.as_ref(), shim)
    }
}

/// What happened when a job was requested for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Applied,
    /// A finished job with the same name was deleted; retry next pass
    Recycled,
}

#[instrument(skip(shim, ctx), fields(shim = %shim.name_any()))]
pub async fn reconcile(shim: Arc<Shim>, ctx: Arc<Context>) -> Result<Action> {
    let name = shim.name_any();

    // The watch cache may lag behind our own writes
    let Some(mut shim) = ctx.client.get_shim(&name).await? else {
        debug!("shim no longer exists");
        return Ok(Action::await_change());
    };

    let mut nodes = ctx
        .client
        .list_nodes(&shim.node_label_selector())
        .await?;

    if !shim.is_deleting() {
        if !shim.has_finalizer() {
            info!("adding finalizer");
            let mut finalizers = shim.finalizers().to_vec();
            finalizers.push(SHIM_FINALIZER.to_string());
            ctx.client.set_finalizers(&shim, finalizers).await?;
            return Ok(Action::requeue(CONFLICT_REQUEUE));
        }
        settle_pending_nodes(&name, &mut nodes, &ctx).await?;
    }

    if update_status(&shim, &nodes, &ctx).await? {
        match ctx.client.get_shim(&name).await? {
            Some(fresh) => shim = fresh,
            None => return Ok(Action::await_change()),
        }
    }

    if shim.is_deleting() {
        return handle_deletion(&shim, &ctx).await;
    }

    ensure_runtime_class(&shim, &ctx).await?;

    if nodes.is_empty() {
        info!("no qualifying nodes");
        return Ok(Action::requeue(IDLE_REQUEUE));
    }

    let (dispatched, recycled) = rollout(&shim, &nodes, &ctx).await?;

    if recycled > 0 {
        Ok(Action::requeue(RECYCLE_REQUEUE))
    } else if dispatched > 0 || in_flight(&nodes, &name) > 0 {
        Ok(Action::requeue(PENDING_REQUEUE))
    } else {
        Ok(Action::requeue(IDLE_REQUEUE))
    }
}

pub fn error_policy(shim: Arc<Shim>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        debug!(shim = %shim.name_any(), %error, "stale write, retrying");
        return Action::requeue(CONFLICT_REQUEUE);
    }
    error!(?error, shim = %shim.name_any(), "reconciliation failed");
    Action::requeue(ERROR_REQUEUE)
}

/// Move pending nodes on according to their install job.
async fn settle_pending_nodes(shim: &str, nodes: &mut [Node], ctx: &Context) -> Result<()> {
    let tracker = ctx.tracker(shim);

    for node in nodes.iter_mut() {
        if phase_of(node, shim) != Some(NodePhase::Pending) {
            continue;
        }
        let node_name = node.name_any();
        let job = ctx
            .client
            .get_job(ctx.namespace(), &job_name(&node_name, shim, Operation::Install))
            .await?;
        let outcome = job_outcome(job.as_ref());

        if let Some(phase) = settle_pending(outcome) {
            info!(node = %node_name, ?outcome, %phase, "install job settled");
            tracker.write(&node_name, Some(phase)).await?;
            set_local_phase(node, shim, Some(phase));
        }
    }
    Ok(())
}

/// Patch status if it changed. Returns whether a write happened.
async fn update_status(shim: &Shim, nodes: &[Node], ctx: &Context) -> Result<bool> {
    let next = status::aggregate(&shim.name_any(), nodes, shim.status.as_ref(), Utc::now());
    if !status::needs_update(shim.status.as_ref(), &next) {
        return Ok(false);
    }

    debug!(
        nodes = next.node_count,
        ready = next.node_ready_count,
        "updating status"
    );
    ctx.client.patch_shim_status(shim, &next).await?;
    Ok(true)
}

async fn ensure_runtime_class(shim: &Shim, ctx: &Context) -> Result<()> {
    let spec = &shim.spec.runtime_class;
    if spec.name.is_empty() {
        warn!("runtimeClass name not set, skipping RuntimeClass");
        return Ok(());
    }
    if !shim.handler_matches_runtime() {
        warn!(
            handler = %spec.handler,
            runtime = %shim.name_any(),
            "RuntimeClass handler does not match the runtime registered on nodes, pods using it will not start"
        );
    }
    if ctx.client.runtime_class_exists(&spec.name).await? {
        return Ok(());
    }

    info!(runtime_class = %spec.name, handler = %spec.handler, "creating RuntimeClass");
    let runtime_class = ctx.manifests.runtime_class(shim)?;
    ctx.client.apply_runtime_class(&runtime_class).await
}

/// Dispatch installs to the nodes the rollout strategy picks. Returns the
/// number of jobs applied and of jobs recycled.
async fn rollout(shim: &Shim, nodes: &[Node], ctx: &Context) -> Result<(usize, usize)> {
    let selected = select_for_install(shim, nodes);
    debug!(
        strategy = ?shim.spec.rollout_strategy.type_,
        selected = selected.len(),
        qualifying = nodes.len(),
        "rollout"
    );

    let mut failures = Vec::new();
    let mut dispatched = 0;
    let mut recycled = 0;

    for node in selected {
        let node_name = node.name_any();
        match install_on_node(shim, &node_name, ctx).await {
            Ok(Dispatch::Applied) => dispatched += 1,
            Ok(Dispatch::Recycled) => recycled += 1,
            Err(e) => {
                error!(node = %node_name, error = %e, "install dispatch failed");
                failures.push(format!("{}: {}", node_name, e));
            }
        }
    }

    if !failures.is_empty() {
        return Err(Error::Dispatch(failures));
    }
    if dispatched > 0 {
        info!(dispatched, "install jobs dispatched");
    }
    Ok((dispatched, recycled))
}

async fn install_on_node(shim: &Shim, node: &str, ctx: &Context) -> Result<Dispatch> {
    let shim_name = shim.name_any();
    if recycle_finished_job(ctx, node, &shim_name, Operation::Install).await? {
        return Ok(Dispatch::Recycled);
    }

    let job = ctx.manifests.job(shim, node, Operation::Install)?;
    let tracker = ctx.tracker(&shim_name);

    tracker.mark_pending(node).await?;
    if let Err(e) = ctx.client.apply_job(&job).await {
        if let Err(label_err) = tracker.mark_failed(node).await {
            warn!(node = %node, error = %label_err, "could not mark node failed");
        }
        return Err(e);
    }
    Ok(Dispatch::Applied)
}

/// Delete a finished job holding the deterministic name. Jobs are immutable,
/// so a new run needs the old one gone first.
async fn recycle_finished_job(
    ctx: &Context,
    node: &str,
    shim: &str,
    operation: Operation,
) -> Result<bool> {
    let name = job_name(node, shim, operation);
    let existing = ctx.client.get_job(ctx.namespace(), &name).await?;
    if !job_outcome(existing.as_ref()).is_finished() {
        return Ok(false);
    }

    info!(job = %name, node = %node, "deleting finished job before re-dispatch");
    ctx.client.delete_job(ctx.namespace(), &name).await?;
    Ok(true)
}

/// Uninstall from every node carrying the shim label, then release the Shim.
async fn handle_deletion(shim: &Shim, ctx: &Context) -> Result<Action> {
    if !shim.has_finalizer() {
        return Ok(Action::await_change());
    }
    let shim_name = shim.name_any();
    let tracker = ctx.tracker(&shim_name);

    // Label existence, independent of the current node selector
    let labeled = ctx.client.list_nodes(&shim_name).await?;

    let mut failures = Vec::new();
    let mut recycled = 0;

    for node in labeled.iter().filter(|n| is_labeled(n, &shim_name)) {
        let node_name = node.name_any();
        let result = match uninstall_on_node(shim, &node_name, ctx).await {
            Ok(Dispatch::Applied) => tracker.clear(&node_name).await,
            Ok(Dispatch::Recycled) => {
                recycled += 1;
                Ok(())
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(node = %node_name, error = %e, "uninstall dispatch failed");
            failures.push(format!("{}: {}", node_name, e));
        }
    }

    if !failures.is_empty() {
        return Err(Error::Dispatch(failures));
    }
    if recycled > 0 {
        return Ok(Action::requeue(RECYCLE_REQUEUE));
    }

    info!("uninstall dispatched to all labeled nodes, removing finalizer");
    let finalizers = shim
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != SHIM_FINALIZER)
        .cloned()
        .collect();
    ctx.client.set_finalizers(shim, finalizers).await?;
    Ok(Action::await_change())
}

async fn uninstall_on_node(shim: &Shim, node: &str, ctx: &Context) -> Result<Dispatch> {
    if recycle_finished_job(ctx, node, &shim.name_any(), Operation::Uninstall).await? {
        return Ok(Dispatch::Recycled);
    }
    let job = ctx.manifests.job(shim, node, Operation::Uninstall)?;
    ctx.client.apply_job(&job).await?;
    info!(node = %node, "uninstall job dispatched");
    Ok(Dispatch::Applied)
}
