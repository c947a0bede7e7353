//! Typed views over the raw Kubernetes JSON objects the handlers act on.
//!
//! Kept deliberately partial: only the fields the handlers actually read
//! are named, everything else round-trips through `serde(flatten)` so a
//! driver that wants the rest of `targetRef` (namespace, uid, ...) still
//! gets it. There is no dependency on a generated OpenAPI model
//! (`kuryr-k8s-client` is intentionally untyped JSON), so these are
//! hand-written to pick fields out of a raw Kubernetes object rather than
//! generated from a client model.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The subset of `ObjectMeta` the handlers need.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default, rename = "selfLink")]
    pub self_link: Option<String>,
    #[serde(default, rename = "resourceVersion")]
    pub resource_version: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// A Kubernetes Service, as much as the spec handler reads of it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceView {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceSpec {
    /// `"ClusterIP"`, `"NodePort"`, `"LoadBalancer"`, `"ExternalName"`.
    /// Absent is treated as `"ClusterIP"`, the Kubernetes API default.
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    /// The allocated cluster IP, or the literal string `"None"` for a
    /// headless Service, or absent for `ExternalName`.
    #[serde(default, rename = "clusterIP")]
    pub cluster_ip: Option<String>,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServicePort {
    #[serde(default)]
    pub name: Option<String>,
    /// Absent means `"TCP"`, the Kubernetes API default.
    #[serde(default)]
    pub protocol: Option<String>,
    pub port: u16,
}

/// A Kubernetes Endpoints resource, as much as the load balancer handler
/// reads of it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointsView {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub subsets: Vec<EndpointSubset>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointSubset {
    #[serde(default)]
    pub addresses: Vec<EndpointAddress>,
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointAddress {
    pub ip: IpAddr,
    #[serde(default, rename = "targetRef")]
    pub target_ref: Option<ObjectReference>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointPort {
    #[serde(default)]
    pub name: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub protocol: Option<String>,
}

/// A `targetRef`, preserved whole (via `flatten`) so a driver can read
/// fields this view doesn't name (e.g. `uid`, `namespace`) from the
/// [`Value`] handed to `ensure_member`/`release_member`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectReference {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl ObjectReference {
    /// `true` when this reference points at a Pod.
    pub fn is_pod(&self) -> bool {
        self.kind.as_deref() == Some(kuryr_k8s_core::KIND_POD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_a_minimal_service() {
        let value = json!({
            "metadata": {
                "name": "web",
                "namespace": "ns",
                "selfLink": "/api/v1/namespaces/ns/services/web",
                "resourceVersion": "10",
            },
            "spec": {
                "type": "ClusterIP",
                "clusterIP": "10.0.0.5",
                "ports": [{"name": "http", "port": 80, "protocol": "TCP"}],
            }
        });
        let service: ServiceView = serde_json::from_value(value).unwrap();
        assert_eq!(service.spec.cluster_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(service.spec.ports.len(), 1);
    }

    #[test]
    fn decodes_endpoints_with_pod_target_ref() {
        let value = json!({
            "metadata": {"name": "web", "namespace": "ns"},
            "subsets": [{
                "addresses": [{"ip": "10.1.0.7", "targetRef": {"kind": "Pod", "name": "web-0", "uid": "abc"}}],
                "ports": [{"name": "http", "port": 8080, "protocol": "TCP"}],
            }]
        });
        let endpoints: EndpointsView = serde_json::from_value(value).unwrap();
        let addr = &endpoints.subsets[0].addresses[0];
        assert!(addr.target_ref.as_ref().unwrap().is_pod());
        assert_eq!(addr.ip, "10.1.0.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn endpoints_with_no_subsets_decodes_to_empty_vec() {
        let value = json!({"metadata": {"name": "web"}});
        let endpoints: EndpointsView = serde_json::from_value(value).unwrap();
        assert!(endpoints.subsets.is_empty());
    }
}
