//! The transport protocol carried by a Service port / listener / pool.
//!
//! Modeled as a closed enum rather than a bare `String` since the set of
//! values Kubernetes accepts on `Service.spec.ports[].protocol` is fixed,
//! but kept forgiving of unrecognized values via [`Protocol::Other`] so a
//! Service with an exotic protocol string never fails to parse.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A Service/listener/pool protocol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    /// `TCP`, the default when a Service port omits `protocol`.
    Tcp,
    /// `UDP`.
    Udp,
    /// `SCTP`.
    Sctp,
    /// Anything else, preserved verbatim.
    Other(String),
}

impl Protocol {
    /// The default protocol Kubernetes assumes when a Service port doesn't
    /// specify one.
    pub const DEFAULT: Protocol = Protocol::Tcp;

    fn as_wire_str(&self) -> &str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Sctp => "SCTP",
            Protocol::Other(s) => s,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

impl FromStr for Protocol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "TCP" => Protocol::Tcp,
            "UDP" => Protocol::Udp,
            "SCTP" => Protocol::Sctp,
            _ => Protocol::Other(s.to_string()),
        })
    }
}

impl Serialize for Protocol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_wire_str())
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().expect("Protocol::from_str is infallible"))
    }
}
