//! Job and RuntimeClass manifests
//!
//! Everything here is pure: a Shim and a node name in, an object ready for
//! server-side apply out.

use crate::config::ControllerConfig;
use crate::crd::Shim;
use crate::error::{Error, Result};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, HostPathVolumeSource, PodSpec, PodTemplateSpec,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::api::node::v1::{RuntimeClass, Scheduling};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

pub const K8S_NAME_MAX_LENGTH: usize = 63;
const NAME_HASH_LEN: usize = 10;

pub const JOB_LABEL: &str = "runtime.spinkube.dev/job";
pub const SHIM_NAME_LABEL: &str = "runtime.spinkube.dev/shimName";
pub const OPERATION_LABEL: &str = "runtime.spinkube.dev/operation";
pub const NODE_NAME_ANNOTATION: &str = "runtime.spinkube.dev/nodeName";

const SHIM_DOWNLOAD_VOLUME: &str = "shim-download";
const ROOT_MOUNT_VOLUME: &str = "root-mount";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Uninstall,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic job name for a (node, shim, operation) tuple.
///
/// Names longer than a Kubernetes object name allows are cut and suffixed
/// with a digest of the full name, so two long tuples sharing a prefix still
/// get distinct jobs.
pub fn job_name(node: &str, shim: &str, operation: Operation) -> String {
    let full = format!("{}-{}-{}", node, shim, operation);
    if full.len() <= K8S_NAME_MAX_LENGTH {
        return full;
    }

    let digest = hex::encode(Sha256::digest(full.as_bytes()));
    let suffix = &digest[..NAME_HASH_LEN];
    let mut keep = K8S_NAME_MAX_LENGTH - NAME_HASH_LEN - 1;
    while !full.is_char_boundary(keep) {
        keep -= 1;
    }
    let prefix = full[..keep].trim_end_matches(['-', '.']);
    format!("{}-{}", prefix, suffix)
}

pub struct ManifestBuilder {
    config: ControllerConfig,
}

impl ManifestBuilder {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Provisioning job running `operation` for `shim` on `node`.
    ///
    /// Install jobs fetch the shim first and are owned by the Shim. Uninstall
    /// jobs have no owner so they survive the Shim's deletion.
    pub fn job(&self, shim: &Shim, node: &str, operation: Operation) -> Result<Job> {
        let shim_name = shim
            .meta()
            .name
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;
        let name = job_name(node, &shim_name, operation);

        let owner_references = match operation {
            Operation::Install => Some(vec![shim
                .controller_owner_ref(&())
                .ok_or(Error::MissingObjectKey(".metadata.uid"))?]),
            Operation::Uninstall => None,
        };

        let init_containers = match operation {
            Operation::Install => Some(vec![self.downloader(shim, &shim_name)]),
            Operation::Uninstall => None,
        };

        let ttl_seconds_after_finished = match operation {
            Operation::Install => self.config.job_ttl(),
            Operation::Uninstall => None,
        };

        Ok(Job {
            metadata: ObjectMeta {
                name: Some(name),
                namespace: Some(self.config.namespace.clone()),
                labels: Some(BTreeMap::from([
                    (JOB_LABEL.to_string(), "true".to_string()),
                    (SHIM_NAME_LABEL.to_string(), shim_name.clone()),
                    (OPERATION_LABEL.to_string(), operation.to_string()),
                ])),
                annotations: Some(BTreeMap::from([(
                    NODE_NAME_ANNOTATION.to_string(),
                    node.to_string(),
                )])),
                owner_references,
                ..Default::default()
            },
            spec: Some(JobSpec {
                ttl_seconds_after_finished,
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        node_name: Some(node.to_string()),
                        host_pid: Some(true),
                        restart_policy: Some("Never".to_string()),
                        volumes: Some(vec![
                            Volume {
                                name: SHIM_DOWNLOAD_VOLUME.to_string(),
                                empty_dir: Some(EmptyDirVolumeSource::default()),
                                ..Default::default()
                            },
                            Volume {
                                name: ROOT_MOUNT_VOLUME.to_string(),
                                host_path: Some(HostPathVolumeSource {
                                    path: "/".to_string(),
                                    type_: None,
                                }),
                                ..Default::default()
                            },
                        ]),
                        init_containers,
                        containers: vec![self.provisioner(&shim_name, operation)],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        })
    }

    fn downloader(&self, shim: &Shim, shim_name: &str) -> Container {
        Container {
            name: "downloader".to_string(),
            image: Some(self.config.downloader_image.clone()),
            security_context: Some(privileged()),
            env: Some(vec![
                env_var("SHIM_NAME", shim_name),
                env_var("SHIM_LOCATION", &shim.spec.fetch_strategy.anon_http.location),
            ]),
            volume_mounts: Some(vec![VolumeMount {
                name: SHIM_DOWNLOAD_VOLUME.to_string(),
                mount_path: self.config.asset_mount_path.clone(),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    fn provisioner(&self, shim_name: &str, operation: Operation) -> Container {
        Container {
            name: "provisioner".to_string(),
            image: Some(self.config.installer_image.clone()),
            args: Some(vec![
                operation.to_string(),
                "--host-root".to_string(),
                self.config.host_mount_path.clone(),
                "--install-root".to_string(),
                self.config.install_root.clone(),
                "--asset-dir".to_string(),
                self.config.asset_mount_path.clone(),
                shim_name.to_string(),
            ]),
            security_context: Some(privileged()),
            env: Some(vec![env_var("HOST_ROOT", &self.config.host_mount_path)]),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: ROOT_MOUNT_VOLUME.to_string(),
                    mount_path: self.config.host_mount_path.clone(),
                    ..Default::default()
                },
                VolumeMount {
                    name: SHIM_DOWNLOAD_VOLUME.to_string(),
                    mount_path: self.config.asset_mount_path.clone(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }
    }

    /// RuntimeClass exposing the shim's handler on the shim's nodes
    pub fn runtime_class(&self, shim: &Shim) -> Result<RuntimeClass> {
        let spec = &shim.spec.runtime_class;
        let owner = shim
            .controller_owner_ref(&())
            .ok_or(Error::MissingObjectKey(".metadata.uid"))?;

        Ok(RuntimeClass {
            metadata: ObjectMeta {
                name: Some(spec.name.clone()),
                labels: Some(BTreeMap::from([(
                    SHIM_NAME_LABEL.to_string(),
                    shim.name_any(),
                )])),
                owner_references: Some(vec![owner]),
                ..Default::default()
            },
            handler: spec.handler.clone(),
            scheduling: Some(Scheduling {
                node_selector: Some(shim.spec.node_selector.clone().unwrap_or_default()),
                tolerations: None,
            }),
            overhead: None,
        })
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

fn privileged() -> SecurityContext {
    SecurityContext {
        privileged: Some(true),
        ..Default::default()
    }
}
