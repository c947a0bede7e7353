//! `LBaaSServiceSpec` — the declarative desired state published on a
//! Service and its twin Endpoints.

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UnsupportedSchemaVersion;
use crate::protocol::Protocol;

/// Current `schema_version` this build writes and accepts.
pub const SCHEMA_VERSION: u32 = 1;

/// One entry of `LBaaSServiceSpec.ports`.
///
/// `name` may only be absent when the spec it belongs to has exactly one
/// port; that rule is enforced by
/// [`LBaaSServiceSpec::validate`], not by this type alone, since it's a
/// property of the whole port list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LBaaSPortSpec {
    /// The Service port name, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Port number.
    pub port: u16,
}

impl LBaaSPortSpec {
    /// The `(name, protocol, port)` tuple used for set-equality comparisons
    /// against a live Service's port list.
    fn identity(&self) -> (Option<&str>, &Protocol, u16) {
        (self.name.as_deref(), &self.protocol, self.port)
    }
}

/// The desired shape of a Service's load balancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LBaaSServiceSpec {
    /// Schema version this value was encoded with.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// The load balancer's VIP. Absent means no load balancer should exist
    /// for this Service.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ip: Option<IpAddr>,
    /// OpenStack project the load balancer belongs to.
    pub project_id: String,
    /// Subnet the VIP belongs to. Only meaningful when `ip` is set.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subnet_id: Option<Uuid>,
    /// Ordered port list.
    #[serde(default)]
    pub ports: Vec<LBaaSPortSpec>,
    /// Stable-sorted, deduplicated security group ids.
    #[serde(default)]
    pub security_groups_ids: Vec<Uuid>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl LBaaSServiceSpec {
    /// Builds a spec, normalizing `security_groups_ids` into a stable
    /// sorted, deduplicated list.
    pub fn new(
        ip: Option<IpAddr>,
        project_id: String,
        subnet_id: Option<Uuid>,
        ports: Vec<LBaaSPortSpec>,
        mut security_groups_ids: Vec<Uuid>,
    ) -> Self {
        security_groups_ids.sort_unstable();
        security_groups_ids.dedup();
        Self {
            schema_version: SCHEMA_VERSION,
            ip,
            project_id,
            subnet_id,
            ports,
            security_groups_ids,
        }
    }

    /// Checks the invariant that a port's `name` may only be absent when
    /// this is the spec's sole port.
    pub fn validate(&self) -> Result<(), String> {
        if self.ports.len() > 1 {
            if let Some(unnamed) = self.ports.iter().find(|p| p.name.is_none()) {
                return Err(format!(
                    "port {} has no name, but {} ports are declared",
                    unnamed.port,
                    self.ports.len()
                ));
            }
        }
        Ok(())
    }

    /// Deserializes from the canonical JSON text stored in an annotation,
    /// rejecting an unrecognized major `schema_version`.
    pub fn from_annotation(text: &str) -> Result<Self, SpecDecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(SCHEMA_VERSION);
        if found != SCHEMA_VERSION {
            return Err(SpecDecodeError::UnsupportedVersion(UnsupportedSchemaVersion {
                found,
                expected: SCHEMA_VERSION,
            }));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Serializes to the canonical (key-sorted) JSON text this spec is
    /// stored as in an annotation.
    pub fn to_annotation(&self) -> serde_json::Result<String> {
        crate::canonical_json::to_canonical_string(self)
    }

    /// The port set `{(name, protocol, port)}`, used to detect whether a
    /// live Service's ports have diverged from this spec.
    pub fn port_identity_set(&self) -> BTreeSet<(Option<&str>, &Protocol, u16)> {
        self.ports.iter().map(LBaaSPortSpec::identity).collect()
    }
}

/// Failure decoding an `LBaaSServiceSpec` annotation.
#[derive(Debug, thiserror::Error)]
pub enum SpecDecodeError {
    /// The annotation text wasn't valid JSON, or didn't match the expected
    /// shape.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// The annotation's `schema_version` is not one this build understands.
    #[error(transparent)]
    UnsupportedVersion(#[from] UnsupportedSchemaVersion),
}
