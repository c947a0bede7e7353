//! Driver capability contracts (C7): `ProjectDriver`, `SubnetsDriver`,
//! `SecurityGroupsDriver`, `LBaaSDriver`. Kept thin and language-neutral:
//! each trait takes the raw Kubernetes object as `serde_json::Value` rather
//! than a typed Service/Pod, since this crate has no dependency on a
//! generated Kubernetes type model.
//!
//! `Send + Sync` object-safe so the registry can hold them as `Arc<dyn
//! Trait>`.

use std::collections::BTreeMap;
use std::net::IpAddr;

use async_trait::async_trait;
use kuryr_k8s_core::state::{Listener, LoadBalancer, Member, Pool};
use kuryr_k8s_core::Protocol;
use serde_json::Value;
use uuid::Uuid;

use crate::error::DriverError;
use crate::network::Network;

/// Resolves the OpenStack project a Kubernetes object's load-balanced
/// resources belong to.
#[async_trait]
pub trait ProjectDriver: Send + Sync {
    /// Returns the project id owning `object`'s OpenStack resources.
    async fn get_project(&self, object: &Value) -> Result<String, DriverError>;
}

/// Resolves the subnets reachable from a Kubernetes object (a Service's
/// cluster IP, or a Pod's IP).
#[async_trait]
pub trait SubnetsDriver: Send + Sync {
    /// Returns the subnets (grouped by the network they're on) that
    /// `object` may be reachable from, keyed by subnet id.
    async fn get_subnets(
        &self,
        object: &Value,
        project_id: &str,
    ) -> Result<BTreeMap<Uuid, Network>, DriverError>;
}

/// Resolves the security groups that should be attached to a Service's
/// load balancer.
#[async_trait]
pub trait SecurityGroupsDriver: Send + Sync {
    /// Returns the security group ids for `object`.
    async fn get_security_groups(
        &self,
        object: &Value,
        project_id: &str,
    ) -> Result<Vec<Uuid>, DriverError>;
}

/// Manages the remote Octavia/Neutron LBaaS entities. Every `ensure_*` is
/// idempotent: called again with the same logical arguments it returns the
/// existing entity rather than creating a duplicate. Every `release_*`
/// tolerates the entity already being gone.
#[async_trait]
pub trait LBaaSDriver: Send + Sync {
    /// Ensures a load balancer with the given VIP exists, creating one if
    /// needed.
    async fn ensure_loadbalancer(
        &self,
        endpoints: &Value,
        project_id: &str,
        subnet_id: Uuid,
        ip: IpAddr,
        security_groups_ids: &[Uuid],
    ) -> Result<LoadBalancer, DriverError>;

    /// Releases a load balancer and everything on it.
    async fn release_loadbalancer(
        &self,
        endpoints: &Value,
        loadbalancer: &LoadBalancer,
    ) -> Result<(), DriverError>;

    /// Ensures a listener for `(protocol, port)` exists on `loadbalancer`.
    async fn ensure_listener(
        &self,
        endpoints: &Value,
        loadbalancer: &LoadBalancer,
        protocol: &Protocol,
        port: u16,
    ) -> Result<Listener, DriverError>;

    /// Releases a listener.
    async fn release_listener(
        &self,
        endpoints: &Value,
        loadbalancer: &LoadBalancer,
        listener: &Listener,
    ) -> Result<(), DriverError>;

    /// Ensures a pool behind `listener` exists.
    async fn ensure_pool(
        &self,
        endpoints: &Value,
        loadbalancer: &LoadBalancer,
        listener: &Listener,
    ) -> Result<Pool, DriverError>;

    /// Releases a pool.
    async fn release_pool(
        &self,
        endpoints: &Value,
        loadbalancer: &LoadBalancer,
        pool: &Pool,
    ) -> Result<(), DriverError>;

    /// Ensures a member `(ip, port)` exists in `pool`. `target_ref` is the
    /// Endpoints address's `targetRef` object, passed through unparsed for
    /// drivers that tag the remote member with it.
    #[allow(clippy::too_many_arguments)]
    async fn ensure_member(
        &self,
        endpoints: &Value,
        loadbalancer: &LoadBalancer,
        pool: &Pool,
        subnet_id: Uuid,
        ip: IpAddr,
        port: u16,
        target_ref: &Value,
    ) -> Result<Member, DriverError>;

    /// Releases a member.
    async fn release_member(
        &self,
        endpoints: &Value,
        loadbalancer: &LoadBalancer,
        member: &Member,
    ) -> Result<(), DriverError>;
}
