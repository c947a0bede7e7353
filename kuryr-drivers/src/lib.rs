//! Driver capability traits (C7) and an explicit compiled-in registry
//! resolving driver aliases to constructors, rather than string-based
//! plugin discovery.
//!
//! The concrete OpenStack-backed implementations of these traits (actually
//! calling Neutron/Octavia) are out of scope for the controller core; it
//! only needs driver behavior injected as capability objects. This crate
//! ships the trait contracts, the registry mechanism, and a handful of
//! "configured value" driver implementations (`ConfiguredProjectDriver` and
//! friends) which don't talk to OpenStack at all: they return a value read
//! once from configuration.

mod defaults;
mod error;
mod network;
mod registry;
mod traits;

pub use defaults::{
    ConfiguredProjectDriver, ConfiguredSecurityGroupsDriver, ConfiguredSubnetsDriver, InMemoryLBaaSDriver,
};
pub use error::DriverError;
pub use network::{Network, Subnet};
pub use registry::{DriverNames, Registry, RegistryBuildError};
pub use traits::{LBaaSDriver, ProjectDriver, SecurityGroupsDriver, SubnetsDriver};
