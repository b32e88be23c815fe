//! Port prober
//!
//! Answers "is this port free?" with a transient bind (stream) or a
//! join-and-ping (multicast). The stream path can also hand the final bind
//! over as a [`Keeper`] instead of closing it.

use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{PortConfig, DEFAULT_MCAST_ADDRESS, DEFAULT_PROBE_TIMEOUT_MS};
use crate::errors::{PortError, Result};
use crate::port::allocator::PortProbe;
use crate::port::interfaces::{is_ipv6_link_local, InterfaceSource, SystemInterfaces, WILDCARD};
use crate::port::keeper::Keeper;
use crate::port::Protocol;

/// Payload sent to the multicast group
const PING: &[u8; 4] = b"ping";

const LISTEN_BACKLOG: i32 = 50;

/// Knobs for a [`PortProber`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOptions {
    /// Group used when a multicast probe names none
    pub mcast_address: IpAddr,
    /// How long a multicast probe waits for an answer
    pub timeout: Duration,
    /// Treat failed binds on IPv6 link-local addresses as available
    pub link_local_workaround: bool,
    /// Outgoing interface for IPv4 multicast; the OS picks when unset
    pub multicast_interface: Option<Ipv4Addr>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptions {
            mcast_address: DEFAULT_MCAST_ADDRESS,
            timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            link_local_workaround: true,
            multicast_interface: None,
        }
    }
}

impl From<&PortConfig> for ProbeOptions {
    fn from(config: &PortConfig) -> Self {
        ProbeOptions {
            mcast_address: config.mcast_address.unwrap_or(DEFAULT_MCAST_ADDRESS),
            timeout: config.probe_timeout(),
            link_local_workaround: config.link_local_workaround,
            multicast_interface: config.multicast_interface,
        }
    }
}

/// Checks and claims ports on the local host
#[derive(Clone)]
pub struct PortProber {
    options: ProbeOptions,
    interfaces: Arc<dyn InterfaceSource>,
}

impl PortProber {
    /// Prober that enumerates the host's real interfaces
    pub fn new(options: ProbeOptions) -> Self {
        Self::with_interfaces(options, Arc::new(SystemInterfaces))
    }

    pub fn with_interfaces(options: ProbeOptions, interfaces: Arc<dyn InterfaceSource>) -> Self {
        PortProber {
            options,
            interfaces,
        }
    }

    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    /// Returns whether `port` is unused on the local host
    ///
    /// # Arguments
    /// * `port` - Port to check
    /// * `protocol` - `Stream` binds a listener, `Multicast` pings a group
    /// * `addr` - Bind address (stream) or group (multicast). `None` checks every
    ///   interface for streams and uses the default group for multicast.
    ///
    /// # Errors
    /// - `NetworkUnreachable` when the host cannot reach the network at all
    /// - `InterfaceEnumeration` when the all-interfaces check cannot list addresses
    /// - `InvalidArgument` for a multicast probe on a non-multicast address
    pub fn is_port_available(
        &self,
        port: u16,
        protocol: Protocol,
        addr: Option<IpAddr>,
    ) -> Result<bool> {
        match protocol {
            Protocol::Stream => match addr {
                None => self.test_all_interfaces(port),
                Some(addr) => self.test_one_interface(SocketAddr::new(addr, port)),
            },
            Protocol::Multicast => self.probe_multicast(port, addr),
        }
    }

    /// Like [`is_port_available`](Self::is_port_available), but a free port stays
    /// bound and is returned as a [`Keeper`]
    ///
    /// Returns `Ok(None)` when the port is in use. Multicast ports cannot be kept.
    pub fn keep_port(
        &self,
        port: u16,
        protocol: Protocol,
        addr: Option<IpAddr>,
    ) -> Result<Option<Keeper>> {
        match protocol {
            Protocol::Stream => match addr {
                None => self.keep_all_interfaces(port),
                Some(addr) => self.keep_one_interface(SocketAddr::new(addr, port)),
            },
            Protocol::Multicast => Err(PortError::InvalidArgument(
                "multicast ports cannot be kept".to_string(),
            )),
        }
    }

    fn test_one_interface(&self, target: SocketAddr) -> Result<bool> {
        match self.keep_one_interface(target)? {
            Some(mut keeper) => {
                keeper.release();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn keep_one_interface(&self, target: SocketAddr) -> Result<Option<Keeper>> {
        let port = target.port();
        match bind_listener(target) {
            Ok(listener) => {
                tracing::debug!(%target, "bind succeeded");
                Ok(Some(Keeper::new(port, Some(listener))))
            }
            Err(e) if is_network_unreachable(&e) => Err(PortError::NetworkUnreachable {
                addr: target,
                source: e,
            }),
            Err(e) if self.options.link_local_workaround && is_ipv6_link_local(&target.ip()) => {
                tracing::warn!(
                    %target,
                    error = %e,
                    "bind failed on IPv6 link-local address, assuming available"
                );
                Ok(Some(Keeper::new(port, None)))
            }
            Err(e) => {
                tracing::debug!(%target, error = %e, "bind failed");
                Ok(None)
            }
        }
    }

    fn test_all_interfaces(&self, port: u16) -> Result<bool> {
        match self.keep_all_interfaces(port)? {
            Some(mut keeper) => {
                keeper.release();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Wildcard bind first, then every interface address, then a kept wildcard bind.
    ///
    /// The wildcard check alone is not enough: on some systems it succeeds while
    /// another process holds the port on one specific interface. The per-address
    /// checks alone are not enough either, since some systems allow a specific bind
    /// next to someone else's wildcard bind.
    fn keep_all_interfaces(&self, port: u16) -> Result<Option<Keeper>> {
        let wildcard = SocketAddr::new(WILDCARD, port);
        if !self.test_one_interface(wildcard)? {
            return Ok(None);
        }

        for ifaddr in self.interfaces.addresses()? {
            if !self.test_one_interface(ifaddr.socket_addr(port))? {
                tracing::debug!(port, interface = %ifaddr.name, addr = %ifaddr.addr, "port in use on interface");
                return Ok(None);
            }
        }

        self.keep_one_interface(wildcard)
    }

    fn probe_multicast(&self, port: u16, addr: Option<IpAddr>) -> Result<bool> {
        let group = addr.unwrap_or(self.options.mcast_address);
        if !group.is_multicast() {
            return Err(PortError::InvalidArgument(format!(
                "{} is not a multicast address",
                group
            )));
        }

        let target = SocketAddr::new(group, port);
        match self.ping_group(target) {
            Ok(occupied) => {
                tracing::debug!(%target, occupied, "multicast probe finished");
                Ok(!occupied)
            }
            Err(e) if is_network_unreachable(&e) => Err(PortError::NetworkUnreachable {
                addr: target,
                source: e,
            }),
            Err(e) => {
                tracing::warn!(%target, error = %e, "multicast probe failed, reporting port in use");
                Ok(false)
            }
        }
    }

    /// Join `target`'s group, ping it and wait for anyone to answer.
    ///
    /// Returns `Ok(true)` when the port must be considered in use. The socket is
    /// closed when this returns, whichever way.
    fn ping_group(&self, target: SocketAddr) -> io::Result<bool> {
        let socket = Socket::new(
            Domain::for_address(target),
            Type::DGRAM,
            Some(SockProtocol::UDP),
        )?;
        socket.set_reuse_address(true)?;
        socket.set_read_timeout(Some(self.options.timeout))?;

        match target.ip() {
            IpAddr::V4(group) => {
                socket.bind(&SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0).into())?;
                let interface = self
                    .options
                    .multicast_interface
                    .unwrap_or(Ipv4Addr::UNSPECIFIED);
                if !interface.is_unspecified() {
                    socket.set_multicast_if_v4(&interface)?;
                }
                socket.join_multicast_v4(&group, &interface)?;
            }
            IpAddr::V6(group) => {
                socket.bind(&SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0).into())?;
                socket.join_multicast_v6(&group, 0)?;
            }
        }

        let socket: UdpSocket = socket.into();
        socket.send_to(PING, target)?;

        let mut buf = [0u8; 64];
        match socket.recv_from(&mut buf) {
            Ok((_, from)) => {
                tracing::debug!(%target, %from, "multicast group answered");
                Ok(true)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(%target, error = %e, "multicast receive failed");
                Ok(true)
            }
        }
    }
}

impl PortProbe for PortProber {
    fn is_port_available(&self, port: u16, protocol: Protocol, addr: Option<IpAddr>) -> Result<bool> {
        PortProber::is_port_available(self, port, protocol, addr)
    }

    fn keep_port(&self, port: u16, protocol: Protocol, addr: Option<IpAddr>) -> Result<Option<Keeper>> {
        PortProber::keep_port(self, port, protocol, addr)
    }
}

impl Default for PortProber {
    fn default() -> Self {
        Self::new(ProbeOptions::default())
    }
}

/// Bind a listening stream socket with address reuse enabled
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(SockProtocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

fn is_network_unreachable(err: &io::Error) -> bool {
    err.raw_os_error().map_or(false, is_unreachable_code)
        || matches!(
            err.kind(),
            io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable
        )
}

#[cfg(unix)]
fn is_unreachable_code(code: i32) -> bool {
    code == libc::ENETUNREACH || code == libc::EHOSTUNREACH
}

#[cfg(not(unix))]
fn is_unreachable_code(_code: i32) -> bool {
    false
}
