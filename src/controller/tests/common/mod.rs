//! Shared builders for controller tests
#![allow(dead_code)]

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use shim_controller::crd::{
    AnonHttpSpec, FetchStrategy, RollingSpec, RolloutStrategy, RolloutStrategyType,
    RuntimeClassSpec, ShimSpec,
};
use shim_controller::{ControllerConfig, Shim};
use std::collections::BTreeMap;

pub const SHIM: &str = "spin-v2";

pub fn config() -> ControllerConfig {
    ControllerConfig {
        namespace: "rcm-system".to_string(),
        downloader_image: "registry.local/shim-downloader:test".to_string(),
        installer_image: "registry.local/node-installer:test".to_string(),
        ..Default::default()
    }
}

pub fn shim() -> Shim {
    let mut shim = Shim::new(
        SHIM,
        ShimSpec {
            node_selector: Some(BTreeMap::from([("spin".to_string(), "true".to_string())])),
            fetch_strategy: FetchStrategy {
                type_: "anonymousHttp".to_string(),
                anon_http: AnonHttpSpec {
                    location: "https://example.com/containerd-shim-spin-v2.tar.gz".to_string(),
                },
            },
            runtime_class: RuntimeClassSpec {
                name: "wasmtime-spin-v2".to_string(),
                handler: SHIM.to_string(),
            },
            rollout_strategy: RolloutStrategy::default(),
        },
    );
    shim.metadata.uid = Some("4c1d6f0e-0000-4000-8000-000000000001".to_string());
    shim
}

pub fn rolling_shim(max_update: u32) -> Shim {
    let mut shim = shim();
    shim.spec.rollout_strategy = RolloutStrategy {
        type_: RolloutStrategyType::Rolling,
        rolling: Some(RollingSpec { max_update }),
    };
    shim
}

/// Node with an optional phase label for [`SHIM`]
pub fn node(name: &str, phase: Option<&str>) -> Node {
    let labels = phase
        .map(|p| BTreeMap::from([(SHIM.to_string(), p.to_string())]))
        .unwrap_or_default();
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}
