//! `AvailablePort`: configuration, prober and allocator behind one value

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::PortConfig;
use crate::errors::Result;
use crate::port::allocator::RandomPortAllocator;
use crate::port::keeper::Keeper;
use crate::port::prober::{PortProber, ProbeOptions};
use crate::port::rng::PortRng;
use crate::port::Protocol;

/// Port availability service
///
/// # Example
/// ```no_run
/// use avail_port::{AvailablePort, PortConfig, Protocol};
///
/// let ports = AvailablePort::new(PortConfig::from_env()?)?;
/// let mut keeper = ports.random_keepable_port(Protocol::Stream, None, false)?;
/// println!("holding port {}", keeper.port());
/// keeper.release();
/// # Ok::<(), avail_port::PortError>(())
/// ```
pub struct AvailablePort {
    config: PortConfig,
    allocator: RandomPortAllocator<PortProber>,
}

impl AvailablePort {
    /// Service using the process-wide random source chosen by `config.fast_random`
    pub fn new(config: PortConfig) -> Result<Self> {
        let rng = PortRng::global(config.fast_random);
        Self::with_rng(config, rng)
    }

    /// Service with an explicitly injected random source
    pub fn with_rng(config: PortConfig, rng: Arc<PortRng>) -> Result<Self> {
        let prober = PortProber::new(ProbeOptions::from(&config));
        Self::with_prober(config, prober, rng)
    }

    /// Service around a prepared prober, e.g. one with a fixed interface list
    pub fn with_prober(config: PortConfig, prober: PortProber, rng: Arc<PortRng>) -> Result<Self> {
        config.validate()?;
        let allocator = RandomPortAllocator::new(prober, rng, &config);
        Ok(AvailablePort { config, allocator })
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn prober(&self) -> &PortProber {
        self.allocator.probe()
    }

    /// Whether `port` is free for `protocol` on `addr` (`None`: all interfaces /
    /// default group)
    pub fn is_port_available(&self, port: u16, protocol: Protocol, addr: Option<IpAddr>) -> Result<bool> {
        self.prober().is_port_available(port, protocol, addr)
    }

    /// Same as [`is_port_available`](Self::is_port_available) with the configured
    /// default address for `protocol`
    pub fn is_port_available_default(&self, port: u16, protocol: Protocol) -> Result<bool> {
        self.is_port_available(port, protocol, self.config.address_for(protocol))
    }

    /// Claim `port` if it is free. `Ok(None)` means it is in use.
    pub fn keep_port(&self, port: u16, protocol: Protocol, addr: Option<IpAddr>) -> Result<Option<Keeper>> {
        self.prober().keep_port(port, protocol, addr)
    }

    pub fn random_available_port(
        &self,
        protocol: Protocol,
        addr: Option<IpAddr>,
        use_membership_range: bool,
    ) -> Result<u16> {
        self.allocator
            .random_available_port(protocol, addr, use_membership_range)
    }

    /// Random port from the general range, probed on the configured default address
    pub fn random_available_port_default(&self, protocol: Protocol) -> Result<u16> {
        self.random_available_port(protocol, self.config.address_for(protocol), false)
    }

    pub fn random_keepable_port(
        &self,
        protocol: Protocol,
        addr: Option<IpAddr>,
        use_membership_range: bool,
    ) -> Result<Keeper> {
        self.allocator
            .random_keepable_port(protocol, addr, use_membership_range)
    }

    /// Bounded search in `[lower, upper]`, probing on the configured default address
    pub fn random_available_port_in_range(
        &self,
        lower: u16,
        upper: u16,
        protocol: Protocol,
    ) -> Result<Option<u16>> {
        self.allocator.random_available_port_in_range(
            lower,
            upper,
            protocol,
            self.config.address_for(protocol),
        )
    }
}
