//! `LBaaSState` — the observed/realized load-balancer shape, persisted on
//! the Endpoints annotation.

use std::collections::HashSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UnsupportedSchemaVersion;
use crate::protocol::Protocol;

/// Current `schema_version` this build writes and accepts.
pub const SCHEMA_VERSION: u32 = 1;

/// A realized Octavia/Neutron load balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    /// Neutron/Octavia id.
    pub id: Uuid,
    /// Owning OpenStack project.
    pub project_id: String,
    /// Human-readable name.
    pub name: String,
    /// VIP address.
    pub ip: IpAddr,
    /// Subnet the VIP was allocated from.
    pub subnet_id: Uuid,
}

/// A realized listener bound to a load balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    /// Neutron/Octavia id.
    pub id: Uuid,
    /// Owning OpenStack project.
    pub project_id: String,
    /// Human-readable name.
    pub name: String,
    /// The load balancer this listener belongs to.
    pub loadbalancer_id: Uuid,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Port the listener accepts traffic on.
    pub port: u16,
}

/// A realized pool bound to a listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    /// Neutron/Octavia id.
    pub id: Uuid,
    /// Owning OpenStack project.
    pub project_id: String,
    /// Human-readable name.
    pub name: String,
    /// The load balancer this pool belongs to.
    pub loadbalancer_id: Uuid,
    /// The listener that routes to this pool.
    pub listener_id: Uuid,
    /// Transport protocol.
    pub protocol: Protocol,
}

/// A realized pool member: one live pod address backing a Service port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Neutron/Octavia id.
    pub id: Uuid,
    /// Owning OpenStack project.
    pub project_id: String,
    /// Human-readable name.
    pub name: String,
    /// The pool this member belongs to.
    pub pool_id: Uuid,
    /// Subnet the member's IP belongs to.
    pub subnet_id: Uuid,
    /// Pod IP address.
    pub ip: IpAddr,
    /// Container port.
    pub port: u16,
}

/// The observed/realized LBaaS state for one Endpoints resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LBaaSState {
    /// Schema version this value was encoded with.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// The load balancer, if one has been created.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub loadbalancer: Option<LoadBalancer>,
    /// Realized listeners.
    #[serde(default)]
    pub listeners: Vec<Listener>,
    /// Realized pools.
    #[serde(default)]
    pub pools: Vec<Pool>,
    /// Realized members.
    #[serde(default)]
    pub members: Vec<Member>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl LBaaSState {
    /// Deserializes from the canonical JSON text stored in an annotation,
    /// rejecting an unrecognized major `schema_version`.
    pub fn from_annotation(text: &str) -> Result<Self, StateDecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(SCHEMA_VERSION);
        if found != SCHEMA_VERSION {
            return Err(StateDecodeError::UnsupportedVersion(UnsupportedSchemaVersion {
                found,
                expected: SCHEMA_VERSION,
            }));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Serializes to the canonical (key-sorted) JSON text this state is
    /// stored as in an annotation.
    pub fn to_annotation(&self) -> serde_json::Result<String> {
        crate::canonical_json::to_canonical_string(self)
    }

    /// Checks the referential invariants required of any state
    /// reached by the reconciler. Intended for tests and debug assertions,
    /// not the hot reconciliation path.
    pub fn validate(&self) -> Result<(), String> {
        let lb_id = self.loadbalancer.as_ref().map(|lb| lb.id);

        for listener in &self.listeners {
            if Some(listener.loadbalancer_id) != lb_id {
                return Err(format!(
                    "listener {} references loadbalancer_id {} but state has {:?}",
                    listener.id, listener.loadbalancer_id, lb_id
                ));
            }
        }

        let listener_ids: HashSet<Uuid> = self.listeners.iter().map(|l| l.id).collect();
        for pool in &self.pools {
            if !listener_ids.contains(&pool.listener_id) {
                return Err(format!(
                    "pool {} references unknown listener_id {}",
                    pool.id, pool.listener_id
                ));
            }
            if Some(pool.loadbalancer_id) != lb_id {
                return Err(format!(
                    "pool {} references loadbalancer_id {} but state has {:?}",
                    pool.id, pool.loadbalancer_id, lb_id
                ));
            }
        }

        let pool_ids: HashSet<Uuid> = self.pools.iter().map(|p| p.id).collect();
        for member in &self.members {
            if !pool_ids.contains(&member.pool_id) {
                return Err(format!(
                    "member {} references unknown pool_id {}",
                    member.id, member.pool_id
                ));
            }
        }

        let mut listener_keys = HashSet::new();
        for listener in &self.listeners {
            if !listener_keys.insert((listener.protocol.clone(), listener.port)) {
                return Err(format!(
                    "duplicate listener for (protocol, port) = ({}, {})",
                    listener.protocol, listener.port
                ));
            }
        }

        let mut member_keys = HashSet::new();
        for member in &self.members {
            if !member_keys.insert((member.pool_id, member.ip, member.port)) {
                return Err(format!(
                    "duplicate member for (pool_id, ip, port) = ({}, {}, {})",
                    member.pool_id, member.ip, member.port
                ));
            }
        }

        Ok(())
    }
}

/// Failure decoding an `LBaaSState` annotation.
#[derive(Debug, thiserror::Error)]
pub enum StateDecodeError {
    /// The annotation text wasn't valid JSON, or didn't match the expected
    /// shape.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The annotation's `schema_version` is not one this build understands.
    #[error(transparent)]
    UnsupportedVersion(#[from] UnsupportedSchemaVersion),
}
