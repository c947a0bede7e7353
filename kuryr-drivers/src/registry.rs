//! Explicit compiled-in driver registry: a build-time table of driver
//! aliases this binary actually links against, in place of string-based
//! plugin discovery. The operator still selects a driver by name (see
//! [`DriverNames`]), but resolution happens against [`KNOWN_DRIVERS`] at
//! registry construction time instead of a runtime plugin namespace scan.

use std::sync::Arc;

use uuid::Uuid;

use crate::defaults::{ConfiguredProjectDriver, ConfiguredSecurityGroupsDriver, ConfiguredSubnetsDriver};
use crate::network::Subnet;
use crate::traits::{LBaaSDriver, ProjectDriver, SecurityGroupsDriver, SubnetsDriver};

/// The one project/subnet/security-group driver alias this build ships:
/// a value read once from configuration.
///
/// Real OpenStack-backed drivers (discovering a namespace's project via
/// Keystone, say) are out of scope for the controller core and would be
/// added to this table by a downstream binary linking in its own
/// implementations, not by this crate.
pub const KNOWN_DRIVERS: &[&str] = &["configured"];

/// The driver alias configured for each capability.
#[derive(Debug, Clone)]
pub struct DriverNames {
    /// Alias for the Service project driver.
    pub service_project: String,
    /// Alias for the Pod project driver.
    pub pod_project: String,
    /// Alias for the Service subnets driver.
    pub service_subnets: String,
    /// Alias for the Pod subnets driver.
    pub pod_subnets: String,
    /// Alias for the Service security-groups driver.
    pub security_groups: String,
}

impl Default for DriverNames {
    /// The only alias every capability resolves today: `"configured"`.
    fn default() -> Self {
        Self {
            service_project: "configured".to_string(),
            pod_project: "configured".to_string(),
            service_subnets: "configured".to_string(),
            pod_subnets: "configured".to_string(),
            security_groups: "configured".to_string(),
        }
    }
}

/// The configuration values the `"configured"` driver alias needs.
#[derive(Debug, Clone)]
pub struct ConfiguredValues {
    /// OpenStack project id used by both the Service and Pod project
    /// drivers.
    pub project_id: String,
    /// Network id and subnet Service VIPs are allocated from.
    pub service_network_id: Uuid,
    /// Subnet Service VIPs are allocated from.
    pub service_subnet: Subnet,
    /// Network id and subnet Pods are allocated from.
    pub pod_network_id: Uuid,
    /// Subnet Pods are allocated from.
    pub pod_subnet: Subnet,
    /// Security groups attached to every Service load balancer.
    pub security_groups_ids: Vec<Uuid>,
}

/// Failure resolving a configured driver alias against [`KNOWN_DRIVERS`].
#[derive(Debug, thiserror::Error)]
#[error("unknown driver alias {alias:?} for capability {capability}, known aliases: {known:?}")]
pub struct RegistryBuildError {
    /// Which capability the unresolvable alias was configured for.
    pub capability: &'static str,
    /// The alias that did not resolve.
    pub alias: String,
    /// The aliases this build actually links.
    pub known: &'static [&'static str],
}

/// The constructed capability objects a handler is built from, injected
/// once at startup and never mutated afterwards.
pub struct Registry {
    /// Resolves the project a Service's load balancer belongs to.
    pub service_project: Arc<dyn ProjectDriver>,
    /// Resolves the project a Pod's pool member belongs to.
    pub pod_project: Arc<dyn ProjectDriver>,
    /// Resolves the subnet a Service's VIP is allocated from.
    pub service_subnets: Arc<dyn SubnetsDriver>,
    /// Resolves the subnet a Pod's address is reachable from.
    pub pod_subnets: Arc<dyn SubnetsDriver>,
    /// Resolves the security groups attached to a Service's load balancer.
    pub security_groups: Arc<dyn SecurityGroupsDriver>,
    /// Manages the remote Octavia/Neutron LBaaS entities. Unlike the other
    /// capabilities, this has no compiled-in default: calling the real
    /// OpenStack backend is out of scope for the controller core, so the
    /// caller supplies it directly.
    pub lbaas: Arc<dyn LBaaSDriver>,
}

impl Registry {
    /// Resolves `names` against [`KNOWN_DRIVERS`] and constructs each
    /// driver from `values`, injecting the caller-supplied `lbaas` driver
    /// unchanged.
    pub fn build(
        names: &DriverNames,
        values: &ConfiguredValues,
        lbaas: Arc<dyn LBaaSDriver>,
    ) -> Result<Self, RegistryBuildError> {
        resolve("service_project", &names.service_project)?;
        resolve("pod_project", &names.pod_project)?;
        resolve("service_subnets", &names.service_subnets)?;
        resolve("pod_subnets", &names.pod_subnets)?;
        resolve("security_groups", &names.security_groups)?;

        Ok(Self {
            service_project: Arc::new(ConfiguredProjectDriver::new(values.project_id.clone())),
            pod_project: Arc::new(ConfiguredProjectDriver::new(values.project_id.clone())),
            service_subnets: Arc::new(ConfiguredSubnetsDriver::new(
                values.service_network_id,
                values.service_subnet.clone(),
            )),
            pod_subnets: Arc::new(ConfiguredSubnetsDriver::new(
                values.pod_network_id,
                values.pod_subnet.clone(),
            )),
            security_groups: Arc::new(ConfiguredSecurityGroupsDriver::new(
                values.security_groups_ids.clone(),
            )),
            lbaas,
        })
    }
}

fn resolve(capability: &'static str, alias: &str) -> Result<(), RegistryBuildError> {
    if KNOWN_DRIVERS.contains(&alias) {
        Ok(())
    } else {
        Err(RegistryBuildError {
            capability,
            alias: alias.to_string(),
            known: KNOWN_DRIVERS,
        })
    }
}
