//! Local interface address enumeration
//!
//! The all-interfaces probe needs every address bound on the host, because
//! some systems let a wildcard bind coexist with another process already bound
//! to one specific interface.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV6};

use crate::errors::Result;
#[cfg(not(unix))]
use crate::errors::PortError;

/// The "any interface" bind target
pub const WILDCARD: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// One address bound to a local network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    /// Interface name as the OS reports it (e.g. `lo`, `eth0`)
    pub name: String,
    pub addr: IpAddr,
    /// IPv6 scope id, required to bind link-local addresses. Zero for IPv4.
    pub scope_id: u32,
}

impl InterfaceAddress {
    pub fn new(name: impl Into<String>, addr: IpAddr) -> Self {
        InterfaceAddress {
            name: name.into(),
            addr,
            scope_id: 0,
        }
    }

    /// Socket address for binding `port` on this interface address
    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        match self.addr {
            IpAddr::V4(v4) => SocketAddr::new(IpAddr::V4(v4), port),
            IpAddr::V6(v6) => SocketAddr::V6(SocketAddrV6::new(v6, port, 0, self.scope_id)),
        }
    }
}

/// Source of local interface addresses
///
/// A failure here must be surfaced: without the full address list a prober
/// cannot claim a port is free on every interface.
pub trait InterfaceSource: Send + Sync {
    fn addresses(&self) -> Result<Vec<InterfaceAddress>>;
}

/// Reads the addresses from the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

#[cfg(unix)]
impl InterfaceSource for SystemInterfaces {
    fn addresses(&self) -> Result<Vec<InterfaceAddress>> {
        use crate::errors::PortError;

        let ifaddrs = nix::ifaddrs::getifaddrs()
            .map_err(|e| PortError::InterfaceEnumeration(e.to_string()))?;

        let mut addresses = Vec::new();
        for ifaddr in ifaddrs {
            let Some(storage) = ifaddr.address else {
                continue;
            };

            if let Some(sin) = storage.as_sockaddr_in() {
                let v4 = std::net::SocketAddrV4::from(*sin);
                addresses.push(InterfaceAddress::new(
                    ifaddr.interface_name.clone(),
                    IpAddr::V4(*v4.ip()),
                ));
            } else if let Some(sin6) = storage.as_sockaddr_in6() {
                let v6 = SocketAddrV6::from(*sin6);
                addresses.push(InterfaceAddress {
                    name: ifaddr.interface_name.clone(),
                    addr: IpAddr::V6(*v6.ip()),
                    scope_id: v6.scope_id(),
                });
            }
            // link-layer and other families carry no bindable address
        }

        tracing::debug!(count = addresses.len(), "enumerated local interface addresses");
        Ok(addresses)
    }
}

#[cfg(not(unix))]
impl InterfaceSource for SystemInterfaces {
    fn addresses(&self) -> Result<Vec<InterfaceAddress>> {
        Err(PortError::InterfaceEnumeration(
            "interface enumeration is not supported on this platform".to_string(),
        ))
    }
}

/// Fixed address list, for callers that already know which interfaces matter
#[derive(Debug, Default, Clone)]
pub struct StaticInterfaces(pub Vec<InterfaceAddress>);

impl InterfaceSource for StaticInterfaces {
    fn addresses(&self) -> Result<Vec<InterfaceAddress>> {
        Ok(self.0.clone())
    }
}

/// True for IPv6 link-local unicast addresses (`fe80::/10`)
pub fn is_ipv6_link_local(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
        IpAddr::V4(_) => false,
    }
}
