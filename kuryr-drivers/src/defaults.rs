//! Configuration-driven driver implementations that don't call out to
//! OpenStack at all: they return a subnet id, project id, or security-group
//! list read once from configuration rather than discovering anything
//! dynamically. The project and security-group drivers follow the same
//! shape as the subnet ones.
//!
//! Real OpenStack-backed drivers (looking up a namespace's project via
//! Keystone, or a Service's security groups via some external policy) are
//! out of scope for the controller core and are injected as `Arc<dyn
//! Trait>` the same way these configured ones are.

use std::collections::BTreeMap;
use std::net::IpAddr;

use async_trait::async_trait;
use kuryr_k8s_core::state::{Listener, LoadBalancer, Member, Pool};
use kuryr_k8s_core::Protocol;
use serde_json::Value;
use uuid::Uuid;

use crate::error::DriverError;
use crate::network::{Network, Subnet};
use crate::traits::{LBaaSDriver, ProjectDriver, SecurityGroupsDriver, SubnetsDriver};

/// Returns the same configured OpenStack project id for every object,
/// mirroring a single-tenant deployment where all Kuryr-managed resources
/// live in one project.
#[derive(Debug, Clone)]
pub struct ConfiguredProjectDriver {
    project_id: String,
}

impl ConfiguredProjectDriver {
    /// Builds a driver that always answers with `project_id`.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }
}

#[async_trait]
impl ProjectDriver for ConfiguredProjectDriver {
    async fn get_project(&self, _object: &Value) -> Result<String, DriverError> {
        Ok(self.project_id.clone())
    }
}

/// Returns the same configured subnet for every object, mirroring
/// `DefaultPodSubnetDriver`/`DefaultServiceSubnetDriver`: a single subnet id
/// and CIDR read once from configuration rather than discovered per-object.
#[derive(Debug, Clone)]
pub struct ConfiguredSubnetsDriver {
    subnet: Subnet,
    network_id: Uuid,
}

impl ConfiguredSubnetsDriver {
    /// Builds a driver that always answers with one subnet, `subnet`, on
    /// network `network_id`.
    pub fn new(network_id: Uuid, subnet: Subnet) -> Self {
        Self { subnet, network_id }
    }
}

#[async_trait]
impl SubnetsDriver for ConfiguredSubnetsDriver {
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

/// Returns the same configured security group ids for every object.
#[derive(Debug, Clone)]
pub struct ConfiguredSecurityGroupsDriver {
    security_groups_ids: Vec<Uuid>,
}

impl ConfiguredSecurityGroupsDriver {
    /// Builds a driver that always answers with `security_groups_ids`.
    pub fn new(security_groups_ids: Vec<Uuid>) -> Self {
        Self { security_groups_ids }
    }
}

#[async_trait]
impl SecurityGroupsDriver for ConfiguredSecurityGroupsDriver {
    async fn get_security_groups(
        &self,
        _object: &Value,
        _project_id: &str,
    ) -> Result<Vec<Uuid>, DriverError> {
        Ok(self.security_groups_ids.clone())
    }
}

/// A namespace for deriving stable entity ids from their logical identity,
/// so the same `(loadbalancer, listener)` pair always maps to the same
/// `Uuid` without needing to remember anything across calls.
const ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x75, 0x72, 0x79, 0x72, 0x2d, 0x6c, 0x62, 0x61, 0x61, 0x73, 0x2d, 0x76, 0x31, 0x00, 0x00,
]);

fn derive_id(kind: &str, parts: &[&str]) -> Uuid {
    let name = format!("{kind}:{}", parts.join(":"));
    Uuid::new_v5(&ID_NAMESPACE, name.as_bytes())
}

/// A load-balancer driver that never calls out to OpenStack: every
/// `ensure_*` derives a deterministic id from its logical identity (so
/// calling it again with the same arguments is a no-op, satisfying the
/// idempotency contract in [`LBaaSDriver`]'s docs) and every `release_*`
/// succeeds unconditionally. Real Neutron/Octavia calls are out of scope
/// for the controller core; this is the stand-in that lets the rest of the
/// pipeline (C5/C6, the watcher, the client) run end to end against it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLBaaSDriver;

impl InMemoryLBaaSDriver {
    /// Builds a driver with no state of its own.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LBaaSDriver for InMemoryLBaaSDriver {
    async fn ensure_loadbalancer(
        &self,
        _endpoints: &Value,
        project_id: &str,
        subnet_id: Uuid,
        ip: IpAddr,
        _security_groups_ids: &[Uuid],
    ) -> Result<LoadBalancer, DriverError> {
        let id = derive_id("loadbalancer", &[project_id, &subnet_id.to_string(), &ip.to_string()]);
        Ok(LoadBalancer {
            id,
            project_id: project_id.to_string(),
            name: format!("kuryr-lb-{id}"),
            ip,
            subnet_id,
        })
    }

    async fn release_loadbalancer(
        &self,
        _endpoints: &Value,
        _loadbalancer: &LoadBalancer,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn ensure_listener(
        &self,
        _endpoints: &Value,
        loadbalancer: &LoadBalancer,
        protocol: &Protocol,
        port: u16,
    ) -> Result<Listener, DriverError> {
        let id = derive_id(
            "listener",
            &[&loadbalancer.id.to_string(), &protocol.to_string(), &port.to_string()],
        );
        Ok(Listener {
            id,
            project_id: loadbalancer.project_id.clone(),
            name: format!("kuryr-listener-{id}"),
            loadbalancer_id: loadbalancer.id,
            protocol: protocol.clone(),
            port,
        })
    }

    async fn release_listener(
        &self,
        _endpoints: &Value,
        _loadbalancer: &LoadBalancer,
        _listener: &Listener,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn ensure_pool(
        &self,
        _endpoints: &Value,
        loadbalancer: &LoadBalancer,
        listener: &Listener,
    ) -> Result<Pool, DriverError> {
        let id = derive_id("pool", &[&loadbalancer.id.to_string(), &listener.id.to_string()]);
        Ok(Pool {
            id,
            project_id: loadbalancer.project_id.clone(),
            name: format!("kuryr-pool-{id}"),
            loadbalancer_id: loadbalancer.id,
            listener_id: listener.id,
            protocol: listener.protocol.clone(),
        })
    }

    async fn release_pool(
        &self,
        _endpoints: &Value,
        _loadbalancer: &LoadBalancer,
        _pool: &Pool,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn ensure_member(
        &self,
        _endpoints: &Value,
        _loadbalancer: &LoadBalancer,
        pool: &Pool,
        subnet_id: Uuid,
        ip: IpAddr,
        port: u16,
        _target_ref: &Value,
    ) -> Result<Member, DriverError> {
        let id = derive_id("member", &[&pool.id.to_string(), &ip.to_string(), &port.to_string()]);
        Ok(Member {
            id,
            project_id: pool.project_id.clone(),
            name: format!("kuryr-member-{id}"),
            pool_id: pool.id,
            subnet_id,
            ip,
            port,
        })
    }

    async fn release_member(
        &self,
        _endpoints: &Value,
        _loadbalancer: &LoadBalancer,
        _member: &Member,
    ) -> Result<(), DriverError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn configured_project_driver_ignores_its_input() {
        let driver = ConfiguredProjectDriver::new("proj-1");
        assert_eq!(driver.get_project(&json!({})).await.unwrap(), "proj-1");
    }

    #[tokio::test]
    async fn configured_subnets_driver_returns_the_one_configured_subnet() {
        let subnet_id = Uuid::new_v4();
        let network_id = Uuid::new_v4();
        let driver = ConfiguredSubnetsDriver::new(
            network_id,
            Subnet {
                id: subnet_id,
                cidr: "10.0.0.0/24".parse().unwrap(),
            },
        );
        let subnets = driver.get_subnets(&json!({}), "proj-1").await.unwrap();
        assert_eq!(subnets.len(), 1);
        assert_eq!(subnets[&subnet_id].id, network_id);
    }

    #[tokio::test]
    async fn configured_security_groups_driver_returns_the_configured_list() {
        let sg = Uuid::new_v4();
        let driver = ConfiguredSecurityGroupsDriver::new(vec![sg]);
        let sgs = driver.get_security_groups(&json!({}), "proj-1").await.unwrap();
        assert_eq!(sgs, vec![sg]);
    }

    #[tokio::test]
    async fn in_memory_lbaas_driver_ensure_loadbalancer_is_idempotent() {
        let driver = InMemoryLBaaSDriver::new();
        let subnet_id = Uuid::new_v4();
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        let first = driver
            .ensure_loadbalancer(&json!({}), "proj-1", subnet_id, ip, &[])
            .await
            .unwrap();
        let second = driver
            .ensure_loadbalancer(&json!({}), "proj-1", subnet_id, ip, &[])
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn in_memory_lbaas_driver_derives_distinct_ids_for_distinct_listeners() {
        let driver = InMemoryLBaaSDriver::new();
        let lb = LoadBalancer {
            id: Uuid::new_v4(),
            project_id: "proj-1".to_string(),
            name: "lb".to_string(),
            ip: "10.0.0.5".parse().unwrap(),
            subnet_id: Uuid::new_v4(),
        };
        let tcp_80 = driver
            .ensure_listener(&json!({}), &lb, &Protocol::Tcp, 80)
            .await
            .unwrap();
        let tcp_443 = driver
            .ensure_listener(&json!({}), &lb, &Protocol::Tcp, 443)
            .await
            .unwrap();
        assert_ne!(tcp_80.id, tcp_443.id);
    }

    #[tokio::test]
    async fn in_memory_lbaas_driver_release_calls_always_succeed() {
        let driver = InMemoryLBaaSDriver::new();
        let lb = LoadBalancer {
            id: Uuid::new_v4(),
            project_id: "proj-1".to_string(),
            name: "lb".to_string(),
            ip: "10.0.0.5".parse().unwrap(),
            subnet_id: Uuid::new_v4(),
        };
        assert!(driver.release_loadbalancer(&json!({}), &lb).await.is_ok());
    }
}
