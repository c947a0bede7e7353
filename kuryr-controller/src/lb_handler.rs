//! `LoadBalancerHandler` (C6): reacts to Endpoints events and
//! drives the real LBaaS entities (load balancer, listeners, pools,
//! members) towards the published [`LBaaSServiceSpec`] and the Endpoints'
//! live addresses, persisting the result as [`LBaaSState`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use kuryr_drivers::{LBaaSDriver, SubnetsDriver};
use kuryr_k8s_client::Client;
use kuryr_k8s_core::{
    HandlerError, LBaaSServiceSpec, LBaaSState, Listener, LoadBalancer, Member, Pool, Protocol,
    ANNOTATION_LBAAS_SPEC, ANNOTATION_LBAAS_STATE, KIND_ENDPOINTS,
};
use kuryr_runtime::ResourceHandler;
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::k8s_types::EndpointsView;

/// Implements C6. Shared across every Endpoints watch invocation.
pub struct LoadBalancerHandler {
    client: Arc<Client>,
    pod_subnets: Arc<dyn SubnetsDriver>,
    lbaas: Arc<dyn LBaaSDriver>,
}

impl LoadBalancerHandler {
    /// Builds a handler from the Kubernetes client, the driver that
    /// resolves a pod IP's subnet, and the LBaaS driver that realizes the
    /// remote entities.
    pub fn new(client: Arc<Client>, pod_subnets: Arc<dyn SubnetsDriver>, lbaas: Arc<dyn LBaaSDriver>) -> Self {
        Self {
            client,
            pod_subnets,
            lbaas,
        }
    }

    /// Decides whether this Endpoints event carries nothing this handler
    /// should act on yet.
    fn should_ignore(endpoints: &EndpointsView, spec: &LBaaSServiceSpec) -> bool {
        if !has_pod_backed_address(endpoints) {
            debug!("ignoring: no address with a Pod targetRef");
            return true;
        }
        let live_port_names: HashSet<Option<&str>> = endpoints
            .subsets
            .iter()
            .flat_map(|s| &s.ports)
            .map(|p| p.name.as_deref())
            .collect();
        let spec_port_names: HashSet<Option<&str>> =
            spec.ports.iter().map(|p| p.name.as_deref()).collect();
        if live_port_names != spec_port_names {
            debug!(
                ?live_port_names,
                ?spec_port_names,
                "ignoring: live port names don't match spec yet"
            );
            return true;
        }
        false
    }

    /// The live `(ip, port)` pairs for addresses backed by a Pod whose
    /// subset port name appears in `spec.ports`.
    fn live_target_set(endpoints: &EndpointsView, spec: &LBaaSServiceSpec) -> HashSet<(IpAddr, u16)> {
        let spec_port_names: HashSet<Option<&str>> =
            spec.ports.iter().map(|p| p.name.as_deref()).collect();
        let mut targets = HashSet::new();
        for subset in &endpoints.subsets {
            let pod_ips = subset
                .addresses
                .iter()
                .filter(|a| a.target_ref.as_ref().is_some_and(|r| r.is_pod()))
                .map(|a| a.ip);
            let matching_ports: Vec<u16> = subset
                .ports
                .iter()
                .filter(|p| spec_port_names.contains(&p.name.as_deref()))
                .map(|p| p.port)
                .collect();
            for ip in pod_ips {
                for &port in &matching_ports {
                    targets.insert((ip, port));
                }
            }
        }
        targets
    }

    /// For each address backed by a Pod, the `(ip, target_ref, port)`
    /// triples whose port name is one the spec recognizes, for member
    /// creation.
    fn live_pod_ports(endpoints: &EndpointsView, spec: &LBaaSServiceSpec) -> Vec<(IpAddr, Value, Option<String>, u16)> {
        let spec_port_names: HashSet<Option<&str>> =
            spec.ports.iter().map(|p| p.name.as_deref()).collect();
        let mut out = Vec::new();
        for subset in &endpoints.subsets {
            for addr in &subset.addresses {
                let Some(target_ref) = &addr.target_ref else {
                    continue;
                };
                if !target_ref.is_pod() {
                    continue;
                }
                let target_ref_value = serde_json::to_value(target_ref)
                    .unwrap_or(Value::Null);
                for port in &subset.ports {
                    if !spec_port_names.contains(&port.name.as_deref()) {
                        continue;
                    }
                    out.push((addr.ip, target_ref_value.clone(), port.name.clone(), port.port));
                }
            }
        }
        out
    }

    /// Resolves *any* subnet reachable from `object` whose CIDR contains
    /// `ip`. Unlike `LBaaSSpecHandler::subnet_containing`, uniqueness is
    /// not required here: several pod subnets may legitimately contain the
    /// same address.
    async fn pod_subnet_containing(
        &self,
        object: &Value,
        project_id: &str,
        ip: IpAddr,
    ) -> Result<Uuid, HandlerError> {
        let networks = self
            .pod_subnets
            .get_subnets(object, project_id)
            .await
            .map_err(HandlerError::driver)?;
        networks
            .values()
            .flat_map(|network| &network.subnets)
            .find(|subnet| subnet.cidr.contains(&ip))
            .map(|subnet| subnet.id)
            .ok_or_else(|| HandlerError::integrity(format!("no subnet reachable from pod ip {ip}")))
    }

    /// The core reconciliation steps (prune, reconcile the load balancer,
    /// then add what's missing), shared by `on_present` (against the
    /// published spec) and `on_deleted` (against an empty spec, for full
    /// teardown).
    async fn reconcile(
        &self,
        endpoints_value: &Value,
        spec: &LBaaSServiceSpec,
        live_targets: &HashSet<(IpAddr, u16)>,
        mut state: LBaaSState,
    ) -> Result<(LBaaSState, bool), HandlerError> {
        let mut changed = false;

        // Step 1: prune stale members.
        let mut retained_members = Vec::with_capacity(state.members.len());
        for member in state.members {
            if live_targets.contains(&(member.ip, member.port)) {
                retained_members.push(member);
                continue;
            }
            let lb = lb_or_integrity(&state.loadbalancer)?;
            self.lbaas
                .release_member(endpoints_value, lb, &member)
                .await
                .map_err(HandlerError::driver)?;
            changed = true;
        }
        state.members = retained_members;

        // Step 2: prune stale pools (no surviving member references them).
        let referenced_pool_ids: HashSet<Uuid> = state.members.iter().map(|m| m.pool_id).collect();
        let mut retained_pools = Vec::with_capacity(state.pools.len());
        for pool in state.pools {
            if referenced_pool_ids.contains(&pool.id) {
                retained_pools.push(pool);
                continue;
            }
            let lb = lb_or_integrity(&state.loadbalancer)?;
            self.lbaas
                .release_pool(endpoints_value, lb, &pool)
                .await
                .map_err(HandlerError::driver)?;
            changed = true;
        }
        state.pools = retained_pools;

        // Step 3: prune stale listeners (no surviving pool references them).
        let referenced_listener_ids: HashSet<Uuid> = state.pools.iter().map(|p| p.listener_id).collect();
        let mut retained_listeners = Vec::with_capacity(state.listeners.len());
        for listener in state.listeners {
            if referenced_listener_ids.contains(&listener.id) {
                retained_listeners.push(listener);
                continue;
            }
            let lb = lb_or_integrity(&state.loadbalancer)?;
            self.lbaas
                .release_listener(endpoints_value, lb, &listener)
                .await
                .map_err(HandlerError::driver)?;
            changed = true;
        }
        state.listeners = retained_listeners;

        // Step 4: reconcile the load balancer itself.
        if let Some(existing) = state.loadbalancer.clone() {
            if Some(existing.ip) != spec.ip {
                self.lbaas
                    .release_loadbalancer(endpoints_value, &existing)
                    .await
                    .map_err(HandlerError::driver)?;
                // Clears transitively rather than waiting for the next pass
                // to prune them.
                state.listeners.clear();
                state.pools.clear();
                state.members.clear();
                state.loadbalancer = None;
                changed = true;
            }
        }
        if state.loadbalancer.is_none() {
            if let Some(ip) = spec.ip {
                let subnet_id = spec
                    .subnet_id
                    .ok_or_else(|| HandlerError::integrity("spec has an ip but no subnet_id"))?;
                let lb = self
                    .lbaas
                    .ensure_loadbalancer(endpoints_value, &spec.project_id, subnet_id, ip, &spec.security_groups_ids)
                    .await
                    .map_err(HandlerError::driver)?;
                state.loadbalancer = Some(lb);
                changed = true;
            }
        }

        // Step 5: add missing listeners.
        if let Some(lb) = state.loadbalancer.clone() {
            for port_spec in &spec.ports {
                let exists = state
                    .listeners
                    .iter()
                    .any(|l| l.protocol == port_spec.protocol && l.port == port_spec.port);
                if exists {
                    continue;
                }
                let listener = self
                    .lbaas
                    .ensure_listener(endpoints_value, &lb, &port_spec.protocol, port_spec.port)
                    .await
                    .map_err(HandlerError::driver)?;
                state.listeners.push(listener);
                changed = true;
            }
        }

        // Step 6: add missing pools.
        if let Some(lb) = state.loadbalancer.clone() {
            let pooled_listener_ids: HashSet<Uuid> = state.pools.iter().map(|p| p.listener_id).collect();
            for listener in state.listeners.clone() {
                if pooled_listener_ids.contains(&listener.id) {
                    continue;
                }
                let pool = self
                    .lbaas
                    .ensure_pool(endpoints_value, &lb, &listener)
                    .await
                    .map_err(HandlerError::driver)?;
                state.pools.push(pool);
                changed = true;
            }
        }

        // Step 7: add missing members.
        if let Some(lb) = state.loadbalancer.clone() {
            let pool_by_name = pool_by_spec_port_name(spec, &state.listeners, &state.pools);
            for (ip, target_ref, name, port) in live_pod_ports_for(endpoints_value, spec)? {
                if state.members.iter().any(|m| m.ip == ip && m.port == port) {
                    continue;
                }
                let Some(pool) = pool_by_name.get(&name.as_deref()) else {
                    continue;
                };
                let subnet_id = self
                    .pod_subnet_containing(endpoints_value, &spec.project_id, ip)
                    .await?;
                let member = self
                    .lbaas
                    .ensure_member(endpoints_value, &lb, pool, subnet_id, ip, port, &target_ref)
                    .await
                    .map_err(HandlerError::driver)?;
                state.members.push(member);
                changed = true;
            }
        }

        Ok((state, changed))
    }
}

fn lb_or_integrity(lb: &Option<LoadBalancer>) -> Result<&LoadBalancer, HandlerError> {
    lb.as_ref().ok_or_else(|| {
        HandlerError::integrity("state references a listener/pool/member without a loadbalancer")
    })
}

fn has_pod_backed_address(endpoints: &EndpointsView) -> bool {
    endpoints
        .subsets
        .iter()
        .flat_map(|s| &s.addresses)
        .any(|a| a.target_ref.as_ref().is_some_and(|r| r.is_pod()))
}

fn pool_by_spec_port_name<'a>(
    spec: &'a LBaaSServiceSpec,
    listeners: &'a [Listener],
    pools: &'a [Pool],
) -> HashMap<Option<&'a str>, &'a Pool> {
    let mut map = HashMap::new();
    for port_spec in &spec.ports {
        let Some(listener) = listeners
            .iter()
            .find(|l| l.protocol == port_spec.protocol && l.port == port_spec.port)
        else {
            continue;
        };
        let Some(pool) = pools.iter().find(|p| p.listener_id == listener.id) else {
            continue;
        };
        map.insert(port_spec.name.as_deref(), pool);
    }
    map
}

/// Re-decodes `endpoints_value` and collects `(ip, target_ref, name, port)`
/// for every Pod-backed address/port the spec recognizes. Kept independent
/// of the typed view already produced by the
/// caller so `reconcile` can be driven directly from a raw `Value` too (as
/// `on_deleted` does, with a synthesized empty spec).
fn live_pod_ports_for(
    endpoints_value: &Value,
    spec: &LBaaSServiceSpec,
) -> Result<Vec<(IpAddr, Value, Option<String>, u16)>, HandlerError> {
    let endpoints: EndpointsView = serde_json::from_value(endpoints_value.clone())
        .map_err(|e| HandlerError::integrity(format!("decoding Endpoints: {e}")))?;
    Ok(LoadBalancerHandler::live_pod_ports(&endpoints, spec))
}

fn load_state(endpoints: &EndpointsView) -> Result<LBaaSState, HandlerError> {
    match endpoints.metadata.annotations.get(ANNOTATION_LBAAS_STATE) {
        None => Ok(LBaaSState::default()),
        Some(text) => LBaaSState::from_annotation(text)
            .map_err(|e| HandlerError::integrity(format!("decoding current LBaaSState: {e}"))),
    }
}

#[async_trait]
impl ResourceHandler for LoadBalancerHandler {
    fn object_kind(&self) -> &str {
        KIND_ENDPOINTS
    }

    #[instrument(skip_all, name = "lbaas_state", fields(endpoints))]
    async fn on_present(&self, object: &Value) -> Result<(), HandlerError> {
        let endpoints: EndpointsView = serde_json::from_value(object.clone())
            .map_err(|e| HandlerError::integrity(format!("decoding Endpoints: {e}")))?;
        tracing::Span::current().record(
            "endpoints",
            tracing::field::display(endpoints.metadata.name.as_deref().unwrap_or("?")),
        );

        let Some(spec_text) = endpoints.metadata.annotations.get(ANNOTATION_LBAAS_SPEC) else {
            debug!("ignoring: no LBaaSServiceSpec annotation yet");
            return Ok(());
        };
        let spec = LBaaSServiceSpec::from_annotation(spec_text)
            .map_err(|e| HandlerError::integrity(format!("decoding LBaaSServiceSpec: {e}")))?;

        if Self::should_ignore(&endpoints, &spec) {
            return Ok(());
        }

        let self_link = endpoints.metadata.self_link.clone().ok_or_else(|| {
            HandlerError::integrity("Endpoints is missing metadata.selfLink")
        })?;
        let state = load_state(&endpoints)?;
        let live_targets = Self::live_target_set(&endpoints, &spec);

        let (new_state, changed) = self.reconcile(object, &spec, &live_targets, state).await?;

        if changed {
            persist(&self.client, &self_link, &endpoints, &new_state).await?;
        } else {
            debug!("reconciliation converged, nothing changed");
        }
        Ok(())
    }

    #[instrument(skip_all, name = "lbaas_state_teardown", fields(endpoints))]
    async fn on_deleted(&self, object: &Value) -> Result<(), HandlerError> {
        let endpoints: EndpointsView = serde_json::from_value(object.clone())
            .map_err(|e| HandlerError::integrity(format!("decoding Endpoints: {e}")))?;
        tracing::Span::current().record(
            "endpoints",
            tracing::field::display(endpoints.metadata.name.as_deref().unwrap_or("?")),
        );

        let mut state = load_state(&endpoints)?;
        if state.loadbalancer.is_none() && state.listeners.is_empty() && state.pools.is_empty() && state.members.is_empty() {
            return Ok(());
        }
        state.members.clear();

        let empty_spec = LBaaSServiceSpec::new(None, String::new(), None, Vec::new(), Vec::new());
        let (new_state, changed) = self
            .reconcile(object, &empty_spec, &HashSet::new(), state)
            .await?;

        if changed {
            // The Endpoints resource itself is already gone from the API
            // server's point of view by the time DELETED is observed; we
            // still try to clear the annotation in case a finalizer or a
            // slow informer hands us a resource that still exists, but a
            // failure here is not retried (there is nothing left to retry
            // against).
            if let Some(self_link) = endpoints.metadata.self_link.clone() {
                if let Err(err) = persist(&self.client, &self_link, &endpoints, &new_state).await {
                    debug!(error = %err, "could not persist teardown state, resource is likely already gone");
                }
            }
        }
        Ok(())
    }
}

async fn persist(
    client: &Client,
    self_link: &str,
    endpoints: &EndpointsView,
    state: &LBaaSState,
) -> Result<(), HandlerError> {
    let text = state
        .to_annotation()
        .map_err(|e| HandlerError::integrity(format!("serializing LBaaSState: {e}")))?;
    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_LBAAS_STATE.to_string(), Some(Value::String(text)));
    client
        .annotate(self_link, &annotations, endpoints.metadata.resource_version.as_deref())
        .await?;
    info!(endpoints = self_link, "persisted LBaaSState");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kuryr_drivers::{DriverError, Network, Subnet};
    use serde_json::json;
    use std::sync::Mutex;

    struct StubSubnets {
        subnet: Subnet,
        network_id: Uuid,
    }

    #[async_trait]
    impl SubnetsDriver for StubSubnets {
        async fn get_subnets(
            &self,
            _object: &Value,
            _project_id: &str,
        ) -> Result<BTreeMap<Uuid, Network>, DriverError> {
            let mut map = BTreeMap::new();
            map.insert(
                self.subnet.id,
                Network {
                    id: self.network_id,
                    subnets: vec![self.subnet.clone()],
                },
            );
            Ok(map)
        }
    }

    #[derive(Default)]
    struct StubLBaaS {
        released_members: Mutex<Vec<Uuid>>,
        released_pools: Mutex<Vec<Uuid>>,
        released_listeners: Mutex<Vec<Uuid>>,
        released_lbs: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl LBaaSDriver for StubLBaaS {
        async fn ensure_loadbalancer(
            &self,
            _endpoints: &Value,
            project_id: &str,
            subnet_id: Uuid,
            ip: IpAddr,
            _security_groups_ids: &[Uuid],
        ) -> Result<LoadBalancer, DriverError> {
            Ok(LoadBalancer {
                id: Uuid::new_v4(),
                project_id: project_id.to_string(),
                name: "lb".to_string(),
                ip,
                subnet_id,
            })
        }

        async fn release_loadbalancer(&self, _endpoints: &Value, lb: &LoadBalancer) -> Result<(), DriverError> {
            self.released_lbs.lock().unwrap().push(lb.id);
            Ok(())
        }

        async fn ensure_listener(
            &self,
            _endpoints: &Value,
            lb: &LoadBalancer,
            protocol: &Protocol,
            port: u16,
        ) -> Result<Listener, DriverError> {
            Ok(Listener {
                id: Uuid::new_v4(),
                project_id: lb.project_id.clone(),
                name: "listener".to_string(),
                loadbalancer_id: lb.id,
                protocol: protocol.clone(),
                port,
            })
        }

        async fn release_listener(&self, _endpoints: &Value, _lb: &LoadBalancer, listener: &Listener) -> Result<(), DriverError> {
            self.released_listeners.lock().unwrap().push(listener.id);
            Ok(())
        }

        async fn ensure_pool(&self, _endpoints: &Value, lb: &LoadBalancer, listener: &Listener) -> Result<Pool, DriverError> {
            Ok(Pool {
                id: Uuid::new_v4(),
                project_id: lb.project_id.clone(),
                name: "pool".to_string(),
                loadbalancer_id: lb.id,
                listener_id: listener.id,
                protocol: listener.protocol.clone(),
            })
        }

        async fn release_pool(&self, _endpoints: &Value, _lb: &LoadBalancer, pool: &Pool) -> Result<(), DriverError> {
            self.released_pools.lock().unwrap().push(pool.id);
            Ok(())
        }

        async fn ensure_member(
            &self,
            _endpoints: &Value,
            _lb: &LoadBalancer,
            pool: &Pool,
            subnet_id: Uuid,
            ip: IpAddr,
            port: u16,
            _target_ref: &Value,
        ) -> Result<Member, DriverError> {
            Ok(Member {
                id: Uuid::new_v4(),
                project_id: pool.project_id.clone(),
                name: "member".to_string(),
                pool_id: pool.id,
                subnet_id,
                ip,
                port,
            })
        }

        async fn release_member(&self, _endpoints: &Value, _lb: &LoadBalancer, member: &Member) -> Result<(), DriverError> {
            self.released_members.lock().unwrap().push(member.id);
            Ok(())
        }
    }

    fn spec(ip: &str, port_name: &str, port: u16) -> LBaaSServiceSpec {
        LBaaSServiceSpec::new(
            Some(ip.parse().unwrap()),
            "proj-1".to_string(),
            Some(Uuid::new_v4()),
            vec![kuryr_k8s_core::LBaaSPortSpec {
                name: Some(port_name.to_string()),
                protocol: Protocol::Tcp,
                port,
            }],
            vec![],
        )
    }

    fn endpoints_json(pod_ip: &str, port_name: &str, port: u16) -> Value {
        json!({
            "metadata": {"name": "web", "namespace": "ns"},
            "subsets": [{
                "addresses": [{"ip": pod_ip, "targetRef": {"kind": "Pod", "name": "web-0"}}],
                "ports": [{"name": port_name, "port": port, "protocol": "TCP"}],
            }]
        })
    }

    fn handler() -> (LoadBalancerHandler, Arc<StubLBaaS>) {
        let subnet_id = Uuid::new_v4();
        let subnets = Arc::new(StubSubnets {
            subnet: Subnet {
                id: subnet_id,
                cidr: "10.1.0.0/24".parse().unwrap(),
            },
            network_id: Uuid::new_v4(),
        });
        let lbaas = Arc::new(StubLBaaS::default());
        let client = Arc::new(
            Client::new(kuryr_k8s_client::Config::new(
                "http://127.0.0.1:1".parse().unwrap(),
                kuryr_k8s_client::AuthConfig::Bearer {
                    token_file: std::path::PathBuf::from("/dev/null"),
                },
            ))
            .unwrap(),
        );
        (LoadBalancerHandler::new(client, subnets, Arc::clone(&lbaas) as Arc<dyn LBaaSDriver>), lbaas)
    }

    #[tokio::test]
    async fn reconcile_creates_lb_listener_pool_and_member_from_empty_state() {
        let (handler, _lbaas) = handler();
        let spec = spec("10.0.0.5", "http", 80);
        let endpoints_value = endpoints_json("10.1.0.7", "http", 8080);
        let endpoints: EndpointsView = serde_json::from_value(endpoints_value.clone()).unwrap();
        let live_targets = LoadBalancerHandler::live_target_set(&endpoints, &spec);
        assert_eq!(live_targets.len(), 1);

        let (state, changed) = handler
            .reconcile(&endpoints_value, &spec, &live_targets, LBaaSState::default())
            .await
            .unwrap();

        assert!(changed);
        assert!(state.loadbalancer.is_some());
        assert_eq!(state.listeners.len(), 1);
        assert_eq!(state.pools.len(), 1);
        assert_eq!(state.members.len(), 1);
        assert_eq!(state.members[0].ip, "10.1.0.7".parse::<IpAddr>().unwrap());
        assert_eq!(state.members[0].port, 8080);
        state.validate().unwrap();
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_on_unchanged_input() {
        let (handler, _lbaas) = handler();
        let spec = spec("10.0.0.5", "http", 80);
        let endpoints_value = endpoints_json("10.1.0.7", "http", 8080);
        let endpoints: EndpointsView = serde_json::from_value(endpoints_value.clone()).unwrap();
        let live_targets = LoadBalancerHandler::live_target_set(&endpoints, &spec);

        let (state, _) = handler
            .reconcile(&endpoints_value, &spec, &live_targets, LBaaSState::default())
            .await
            .unwrap();
        let (state2, changed2) = handler
            .reconcile(&endpoints_value, &spec, &live_targets, state.clone())
            .await
            .unwrap();

        assert!(!changed2);
        assert_eq!(state, state2);
    }

    #[tokio::test]
    async fn reconcile_prunes_member_pool_and_listener_when_target_disappears() {
        let (handler, lbaas) = handler();
        let spec = spec("10.0.0.5", "http", 80);
        let endpoints_value = endpoints_json("10.1.0.7", "http", 8080);
        let endpoints: EndpointsView = serde_json::from_value(endpoints_value.clone()).unwrap();
        let live_targets = LoadBalancerHandler::live_target_set(&endpoints, &spec);
        let (state, _) = handler
            .reconcile(&endpoints_value, &spec, &live_targets, LBaaSState::default())
            .await
            .unwrap();

        // Spec drops the port entirely (Service deleted its only port):
        // listener must be pruned too.
        let empty_spec = LBaaSServiceSpec::new(Some("10.0.0.5".parse().unwrap()), "proj-1".to_string(), spec.subnet_id, vec![], vec![]);
        let (state2, changed2) = handler
            .reconcile(&endpoints_value, &empty_spec, &HashSet::new(), state)
            .await
            .unwrap();

        assert!(changed2);
        assert!(state2.members.is_empty());
        assert!(state2.pools.is_empty());
        assert!(state2.listeners.is_empty());
        assert!(state2.loadbalancer.is_some());
        assert_eq!(lbaas.released_members.lock().unwrap().len(), 1);
        assert_eq!(lbaas.released_pools.lock().unwrap().len(), 1);
        assert_eq!(lbaas.released_listeners.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reconcile_releases_lb_when_ip_changes() {
        let (handler, lbaas) = handler();
        let spec = spec("10.0.0.5", "http", 80);
        let endpoints_value = endpoints_json("10.1.0.7", "http", 8080);
        let endpoints: EndpointsView = serde_json::from_value(endpoints_value.clone()).unwrap();
        let live_targets = LoadBalancerHandler::live_target_set(&endpoints, &spec);
        let (state, _) = handler
            .reconcile(&endpoints_value, &spec, &live_targets, LBaaSState::default())
            .await
            .unwrap();
        let old_lb_id = state.loadbalancer.as_ref().unwrap().id;

        let new_spec = spec_with_ip("10.0.0.6", "http", 80);
        let (state2, changed2) = handler
            .reconcile(&endpoints_value, &new_spec, &live_targets, state)
            .await
            .unwrap();

        assert!(changed2);
        assert!(lbaas.released_lbs.lock().unwrap().contains(&old_lb_id));
        let new_lb = state2.loadbalancer.unwrap();
        assert_ne!(new_lb.id, old_lb_id);
        assert_eq!(new_lb.ip, "10.0.0.6".parse::<IpAddr>().unwrap());
    }

    fn spec_with_ip(ip: &str, port_name: &str, port: u16) -> LBaaSServiceSpec {
        spec(ip, port_name, port)
    }

    #[test]
    fn should_ignore_when_spec_port_names_not_yet_reflected() {
        let spec = spec("10.0.0.5", "http", 80);
        let endpoints_value = endpoints_json("10.1.0.7", "grpc", 8080);
        let endpoints: EndpointsView = serde_json::from_value(endpoints_value).unwrap();
        assert!(LoadBalancerHandler::should_ignore(&endpoints, &spec));
    }

    #[test]
    fn should_ignore_when_no_pod_backed_address() {
        let spec = spec("10.0.0.5", "http", 80);
        let endpoints_value = json!({
            "metadata": {"name": "web"},
            "subsets": [{
                "addresses": [{"ip": "10.1.0.7"}],
                "ports": [{"name": "http", "port": 8080}],
            }]
        });
        let endpoints: EndpointsView = serde_json::from_value(endpoints_value).unwrap();
        assert!(LoadBalancerHandler::should_ignore(&endpoints, &spec));
    }
}
