//! `LBaaSSpecHandler` (C5): reacts to Service events,
//! computes the desired [`LBaaSServiceSpec`], and publishes it on the twin
//! Endpoints resource and on the Service itself.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use kuryr_drivers::{ProjectDriver, SecurityGroupsDriver, SubnetsDriver};
use kuryr_k8s_client::Client;
use kuryr_k8s_core::{
    HandlerError, LBaaSPortSpec, LBaaSServiceSpec, Protocol, ANNOTATION_LBAAS_SPEC, KIND_SERVICE,
};
use kuryr_runtime::ResourceHandler;
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::k8s_types::ServiceView;
use crate::selflink::endpoints_selflink;

/// Implements C5: one instance is shared across every Service watch
/// invocation, so its driver handles must be `Send + Sync`.
pub struct LBaaSSpecHandler {
    client: Arc<Client>,
    project: Arc<dyn ProjectDriver>,
    subnets: Arc<dyn SubnetsDriver>,
    security_groups: Arc<dyn SecurityGroupsDriver>,
}

impl LBaaSSpecHandler {
    /// Builds a handler from the Kubernetes client and the project/subnet/
    /// security-group drivers it needs to compute a spec.
    pub fn new(
        client: Arc<Client>,
        project: Arc<dyn ProjectDriver>,
        subnets: Arc<dyn SubnetsDriver>,
        security_groups: Arc<dyn SecurityGroupsDriver>,
    ) -> Self {
        Self {
            client,
            project,
            subnets,
            security_groups,
        }
    }

    /// Resolves the single subnet whose CIDR contains `ip`, failing with
    /// `IntegrityError` unless exactly one matches.
    async fn subnet_containing(
        &self,
        object: &Value,
        project_id: &str,
        ip: IpAddr,
    ) -> Result<Uuid, HandlerError> {
        let networks = self
            .subnets
            .get_subnets(object, project_id)
            .await
            .map_err(HandlerError::driver)?;

        let matches: Vec<Uuid> = networks
            .values()
            .flat_map(|network| &network.subnets)
            .filter(|subnet| subnet.cidr.contains(&ip))
            .map(|subnet| subnet.id)
            .collect();

        match matches.as_slice() {
            [only] => Ok(*only),
            [] => Err(HandlerError::integrity(format!(
                "ip {ip} is not contained by any subnet reachable from this Service"
            ))),
            _ => Err(HandlerError::integrity(format!(
                "ip {ip} is contained by {} subnets, expected exactly one",
                matches.len()
            ))),
        }
    }
}

#[async_trait]
impl ResourceHandler for LBaaSSpecHandler {
    fn object_kind(&self) -> &str {
        KIND_SERVICE
    }

    #[instrument(skip_all, name = "lbaas_spec", fields(service))]
    async fn on_present(&self, object: &Value) -> Result<(), HandlerError> {
        let service: ServiceView = serde_json::from_value(object.clone())
            .map_err(|e| HandlerError::integrity(format!("decoding Service: {e}")))?;
        tracing::Span::current().record(
            "service",
            tracing::field::display(service.metadata.name.as_deref().unwrap_or("?")),
        );

        let self_link = service.metadata.self_link.clone().ok_or_else(|| {
            HandlerError::integrity("Service is missing metadata.selfLink")
        })?;

        let current_spec = current_spec(&service)?;
        let desired_ip = desired_ip(&service)?;
        let desired_ports = desired_ports(&service);

        if !needs_update(current_spec.as_ref(), desired_ip, &desired_ports) {
            debug!("service spec unchanged, nothing to publish");
            return Ok(());
        }

        let project_id = self
            .project
            .get_project(object)
            .await
            .map_err(HandlerError::driver)?;
        let security_groups_ids = self
            .security_groups
            .get_security_groups(object, &project_id)
            .await
            .map_err(HandlerError::driver)?;
        let subnet_id = match desired_ip {
            Some(ip) => Some(self.subnet_containing(object, &project_id, ip).await?),
            None => None,
        };

        let spec = LBaaSServiceSpec::new(
            desired_ip,
            project_id,
            subnet_id,
            desired_ports,
            security_groups_ids,
        );
        spec.validate().map_err(HandlerError::integrity)?;

        let text = spec
            .to_annotation()
            .map_err(|e| HandlerError::integrity(format!("serializing LBaaSServiceSpec: {e}")))?;
        let mut annotations = BTreeMap::new();
        annotations.insert(
            ANNOTATION_LBAAS_SPEC.to_string(),
            Some(Value::String(text)),
        );

        let endpoints_path = endpoints_selflink(&self_link)?;

        // The twin Endpoints resource may not exist yet (it's created by
        // the API server slightly after the Service); a failure here is
        // reclassified as `ResourceNotReady` so the retry wrapper (C3)
        // re-drives this handler rather than propagating.
        self.client
            .annotate(&endpoints_path, &annotations, None)
            .await
            .map_err(|err| {
                debug!(error = %err, endpoints_path, "endpoints not ready for spec annotation yet");
                HandlerError::resource_not_ready(endpoints_path.clone())
            })?;
        info!(endpoints_path, "published LBaaSServiceSpec on Endpoints");

        self.client
            .annotate(
                &self_link,
                &annotations,
                service.metadata.resource_version.as_deref(),
            )
            .await?;
        info!(service = %self_link, "published LBaaSServiceSpec on Service");

        Ok(())
    }

    async fn on_deleted(&self, _object: &Value) -> Result<(), HandlerError> {
        // The Endpoints resource for a deleted Service is deleted by the API
        // server too; `LoadBalancerHandler::on_deleted` tears down the LBaaS
        // state from that event. There is nothing left for the spec handler
        // to do.
        Ok(())
    }
}

fn current_spec(service: &ServiceView) -> Result<Option<LBaaSServiceSpec>, HandlerError> {
    match service.metadata.annotations.get(ANNOTATION_LBAAS_SPEC) {
        None => Ok(None),
        Some(text) => LBaaSServiceSpec::from_annotation(text)
            .map(Some)
            .map_err(|e| HandlerError::integrity(format!("decoding current LBaaSServiceSpec: {e}"))),
    }
}

/// The Service's cluster IP iff its type is `ClusterIP` (the API default
/// when `spec.type` is absent) and it was actually allocated one (headless
/// Services carry the literal string `"None"`).
fn desired_ip(service: &ServiceView) -> Result<Option<IpAddr>, HandlerError> {
    let is_cluster_ip = service
        .spec
        .type_
        .as_deref()
        .map(|t| t == "ClusterIP")
        .unwrap_or(true);
    if !is_cluster_ip {
        return Ok(None);
    }
    match service.spec.cluster_ip.as_deref() {
        None | Some("None") | Some("") => Ok(None),
        Some(ip) => ip
            .parse()
            .map(Some)
            .map_err(|e| HandlerError::integrity(format!("Service clusterIP {ip:?} is not a valid IP: {e}"))),
    }
}

fn desired_ports(service: &ServiceView) -> Vec<LBaaSPortSpec> {
    service
        .spec
        .ports
        .iter()
        .map(|p| LBaaSPortSpec {
            name: p.name.clone(),
            protocol: p
                .protocol
                .as_deref()
                .unwrap_or("TCP")
                .parse()
                .unwrap_or(Protocol::DEFAULT),
            port: p.port,
        })
        .collect()
}

/// Whether the IP or the port set (as a set of `(name, protocol, port)`)
/// differs from what's currently published.
fn needs_update(
    current: Option<&LBaaSServiceSpec>,
    desired_ip: Option<IpAddr>,
    desired_ports: &[LBaaSPortSpec],
) -> bool {
    let Some(current) = current else {
        return true;
    };
    if current.ip != desired_ip {
        return true;
    }
    let current_set: BTreeSet<(Option<&str>, &Protocol, u16)> = current
        .ports
        .iter()
        .map(|p| (p.name.as_deref(), &p.protocol, p.port))
        .collect();
    let desired_set: BTreeSet<(Option<&str>, &Protocol, u16)> = desired_ports
        .iter()
        .map(|p| (p.name.as_deref(), &p.protocol, p.port))
        .collect();
    current_set != desired_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(cluster_ip: &str, ports: Value) -> ServiceView {
        serde_json::from_value(json!({
            "metadata": {
                "name": "web",
                "namespace": "ns",
                "selfLink": "/api/v1/namespaces/ns/services/web",
                "resourceVersion": "5",
            },
            "spec": {
                "type": "ClusterIP",
                "clusterIP": cluster_ip,
                "ports": ports,
            }
        }))
        .unwrap()
    }

    #[test]
    fn headless_service_has_no_desired_ip() {
        let svc = service("None", json!([]));
        assert_eq!(desired_ip(&svc).unwrap(), None);
    }

    #[test]
    fn cluster_ip_service_parses_the_ip() {
        let svc = service("10.0.0.5", json!([]));
        assert_eq!(desired_ip(&svc).unwrap(), Some("10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn ports_default_to_tcp_when_protocol_absent() {
        let svc = service("10.0.0.5", json!([{"name": "http", "port": 80}]));
        let ports = desired_ports(&svc);
        assert_eq!(ports[0].protocol, Protocol::Tcp);
    }

    #[test]
    fn needs_update_is_true_with_no_current_spec() {
        assert!(needs_update(None, Some("10.0.0.5".parse().unwrap()), &[]));
    }

    #[test]
    fn needs_update_is_false_when_ip_and_ports_match() {
        let current = LBaaSServiceSpec::new(
            Some("10.0.0.5".parse().unwrap()),
            "proj".to_string(),
            None,
            vec![LBaaSPortSpec {
                name: Some("http".to_string()),
                protocol: Protocol::Tcp,
                port: 80,
            }],
            vec![],
        );
        let desired = vec![LBaaSPortSpec {
            name: Some("http".to_string()),
            protocol: Protocol::Tcp,
            port: 80,
        }];
        assert!(!needs_update(
            Some(&current),
            Some("10.0.0.5".parse().unwrap()),
            &desired
        ));
    }

    #[test]
    fn needs_update_is_true_when_ip_changes() {
        let current = LBaaSServiceSpec::new(
            Some("10.0.0.5".parse().unwrap()),
            "proj".to_string(),
            None,
            vec![],
            vec![],
        );
        assert!(needs_update(
            Some(&current),
            Some("10.0.0.6".parse().unwrap()),
            &[]
        ));
    }

    #[test]
    fn needs_update_is_true_when_port_set_changes() {
        let current = LBaaSServiceSpec::new(
            Some("10.0.0.5".parse().unwrap()),
            "proj".to_string(),
            None,
            vec![LBaaSPortSpec {
                name: Some("http".to_string()),
                protocol: Protocol::Tcp,
                port: 80,
            }],
            vec![],
        );
        let desired = vec![LBaaSPortSpec {
            name: Some("http".to_string()),
            protocol: Protocol::Tcp,
            port: 8080,
        }];
        assert!(needs_update(
            Some(&current),
            Some("10.0.0.5".parse().unwrap()),
            &desired
        ));
    }
}
