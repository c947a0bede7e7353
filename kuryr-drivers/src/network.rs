//! The shape `SubnetsDriver` returns: a mapping from subnet id to the
//! network it belongs to, each network carrying enough of its subnets'
//! CIDRs to let callers do containment checks without a second driver
//! round-trip.

use ipnet::IpNet;
use uuid::Uuid;

/// One subnet, as much as callers in this crate need of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    /// Neutron subnet id.
    pub id: Uuid,
    /// The subnet's CIDR.
    pub cidr: IpNet,
}

/// A network and the subnets on it that were returned for this lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    /// Neutron network id.
    pub id: Uuid,
    /// The subnets on this network relevant to the lookup.
    pub subnets: Vec<Subnet>,
}
