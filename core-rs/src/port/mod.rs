/**
 * port module
 * Port probing, reservation and random allocation
 */

pub mod allocator;
pub mod interfaces;
pub mod keeper;
pub mod prober;
pub mod rng;
pub mod service;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{PortError, Result};

pub use allocator::{PortProbe, RandomPortAllocator};
pub use interfaces::{InterfaceAddress, InterfaceSource, StaticInterfaces, SystemInterfaces, WILDCARD};
pub use keeper::Keeper;
pub use prober::{PortProber, ProbeOptions};
pub use rng::PortRng;
pub use service::AvailablePort;

/// How a port is tested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// TCP: a listening bind must succeed
    Stream,
    /// UDP multicast: nobody may answer a ping sent to the group
    Multicast,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Stream => "socket",
            Protocol::Multicast => "multicast",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "socket" | "tcp" | "stream" => Ok(Protocol::Stream),
            "jgroups" | "javagroups" | "multicast" | "udp" => Ok(Protocol::Multicast),
            _ => Err(PortError::InvalidArgument(format!("Unknown protocol: {}", s))),
        }
    }
}

/// Closed port interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Build a range, rejecting port 0 and inverted bounds
    pub fn new(start: u16, end: u16) -> Result<Self> {
        let range = PortRange { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start == 0 {
            return Err(PortError::InvalidArgument(
                "Port range must not include port 0".to_string(),
            ));
        }
        if self.start > self.end {
            return Err(PortError::InvalidArgument(format!(
                "Port range {} is inverted",
                self
            )));
        }
        Ok(())
    }

    /// Check if port is within this range
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Number of ports in the range, both bounds included
    pub fn port_count(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for PortRange {
    type Err = PortError;

    /// Parses `"lower-upper"`, whitespace around either bound allowed
    fn from_str(s: &str) -> Result<Self> {
        let (lower, upper) = s
            .split_once('-')
            .ok_or_else(|| PortError::InvalidArgument(format!("Malformed port range: {}", s)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u16>()
                .map_err(|_| PortError::InvalidArgument(format!("Malformed port range: {}", s)))
        };
        PortRange::new(parse(lower)?, parse(upper)?)
    }
}
