//! Shared data model and error taxonomy for the kuryr-kubernetes LBaaS
//! controller core.
//!
//! This crate has no knowledge of HTTP, Kubernetes wire formats, or Neutron
//! APIs: it only describes the declarative [`spec::LBaaSServiceSpec`] and the
//! observed [`state::LBaaSState`], the canonical JSON encoding both are
//! persisted with, and the error types that flow between the other crates in
//! the workspace.

pub mod canonical_json;
pub mod error;
pub mod protocol;
pub mod spec;
pub mod state;

pub use error::HandlerError;
pub use protocol::Protocol;
pub use spec::{LBaaSPortSpec, LBaaSServiceSpec};
pub use state::{LBaaSState, Listener, LoadBalancer, Member, Pool};

/// Annotation publishing the declarative [`LBaaSServiceSpec`] on a Service
/// and its twin Endpoints. A JSON `null` value clears it.
pub const ANNOTATION_LBAAS_SPEC: &str = "openstack.org/kuryr-service-spec";

/// Annotation publishing the realized [`LBaaSState`] on an Endpoints
/// resource. A JSON `null` value clears it.
pub const ANNOTATION_LBAAS_STATE: &str = "openstack.org/kuryr-lbaas-state";

/// The `kind` value of a Kubernetes Service object.
pub const KIND_SERVICE: &str = "Service";

/// The `kind` value of a Kubernetes Endpoints object.
pub const KIND_ENDPOINTS: &str = "Endpoints";

/// The `kind` value of a Kubernetes Pod object, as it appears in a
/// `targetRef`.
pub const KIND_POD: &str = "Pod";
