//! Cluster API seam
//!
//! The reconciler talks to the API server only through [`ClusterClient`], so
//! tests can drive it with a mock.

use crate::crd::{Shim, ShimStatus};
use crate::error::{Error, Result};
use crate::node_status::{phase_patch, NodePhase};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::node::v1::RuntimeClass;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Current copy of a Shim, `None` once it is gone
    async fn get_shim(&self, name: &str) -> Result<Option<Shim>>;

    /// Nodes matching a label selector; an empty selector lists every node
    async fn list_nodes(&self, selector: &str) -> Result<Vec<Node>>;

    /// Write status, guarded by the Shim's resourceVersion
    async fn patch_shim_status(&self, shim: &Shim, status: &ShimStatus) -> Result<()>;

    /// Replace the Shim's finalizer list, guarded by its resourceVersion
    async fn set_finalizers(&self, shim: &Shim, finalizers: Vec<String>) -> Result<()>;

    async fn runtime_class_exists(&self, name: &str) -> Result<bool>;

    async fn apply_runtime_class(&self, runtime_class: &RuntimeClass) -> Result<()>;

    async fn apply_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>>;

    /// Delete a job and its pods; a missing job is not an error
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()>;

    /// Set or, for `None`, remove the node's phase label for `shim`
    async fn set_node_phase(&self, node: &str, shim: &str, phase: Option<NodePhase>)
        -> Result<()>;
}

/// [`ClusterClient`] backed by the API server
pub struct KubeClusterClient {
    client: Client,
    field_manager: String,
}

impl KubeClusterClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn apply_params(&self) -> PatchParams {
        PatchParams::apply(&self.field_manager).force()
    }
}

fn conflict_or(name: &str, e: kube::Error) -> Error {
    match e {
        kube::Error::Api(ae) if ae.code == 409 => Error::Conflict(name.to_string()),
        e => Error::Kube(e),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_shim(&self, name: &str) -> Result<Option<Shim>> {
        let api: Api<Shim> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(shim) => Ok(Some(shim)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_nodes(&self, selector: &str) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let params = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(selector)
        };
        Ok(api.list(&params).await?.items)
    }

    async fn patch_shim_status(&self, shim: &Shim, status: &ShimStatus) -> Result<()> {
        let name = shim.name_any();
        let api: Api<Shim> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": shim.resource_version() },
            "status": status,
        });

        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| conflict_or(&name, e))?;
        Ok(())
    }

    async fn set_finalizers(&self, shim: &Shim, finalizers: Vec<String>) -> Result<()> {
        let name = shim.name_any();
        let api: Api<Shim> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": shim.resource_version(),
                "finalizers": finalizers,
            }
        });

        match api
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            // Already gone once the last finalizer was dropped elsewhere
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(conflict_or(&name, e)),
        }
    }

    async fn runtime_class_exists(&self, name: &str) -> Result<bool> {
        let api: Api<RuntimeClass> = Api::all(self.client.clone());
        match api.get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_runtime_class(&self, runtime_class: &RuntimeClass) -> Result<()> {
        let name = runtime_class.name_any();
        let api: Api<RuntimeClass> = Api::all(self.client.clone());
        api.patch(&name, &self.apply_params(), &Patch::Apply(runtime_class))
            .await?;
        Ok(())
    }

    async fn apply_job(&self, job: &Job) -> Result<()> {
        let name = job.name_any();
        let namespace = job
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let api: Api<Job> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(&name, &self.apply_params(), &Patch::Apply(job))
            .await?;
        Ok(())
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(job) => Ok(Some(job)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_node_phase(
        &self,
        node: &str,
        shim: &str,
        phase: Option<NodePhase>,
    ) -> Result<()> {
        let api: Api<Node> = Api::all(self.client.clone());
        let patch = phase_patch(shim, phase, Utc::now());
        api.patch(node, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
