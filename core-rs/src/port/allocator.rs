//! Random port allocation
//!
//! Draws candidates uniformly from a range and probes them until one is free.

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::PortConfig;
use crate::errors::{PortError, Result};
use crate::port::keeper::Keeper;
use crate::port::prober::PortProber;
use crate::port::rng::PortRng;
use crate::port::{PortRange, Protocol};

/// Draws per port for the bounded search, so every port in the range gets a
/// fair chance of being picked at least once
pub const RANGE_ATTEMPT_FACTOR: u32 = 5;

/// Port checks the allocator relies on
pub trait PortProbe: Send + Sync {
    /// Whether `port` is currently free
    fn is_port_available(&self, port: u16, protocol: Protocol, addr: Option<IpAddr>) -> Result<bool>;

    /// Claim `port` if it is free
    fn keep_port(&self, port: u16, protocol: Protocol, addr: Option<IpAddr>) -> Result<Option<Keeper>>;
}

impl<P: PortProbe + ?Sized> PortProbe for Arc<P> {
    fn is_port_available(&self, port: u16, protocol: Protocol, addr: Option<IpAddr>) -> Result<bool> {
        (**self).is_port_available(port, protocol, addr)
    }

    fn keep_port(&self, port: u16, protocol: Protocol, addr: Option<IpAddr>) -> Result<Option<Keeper>> {
        (**self).keep_port(port, protocol, addr)
    }
}

/// Picks random free ports from the general or membership range
pub struct RandomPortAllocator<P = PortProber> {
    probe: P,
    rng: Arc<PortRng>,
    range: PortRange,
    membership_range: PortRange,
    attempt_limit: Option<u64>,
}

impl<P: PortProbe> RandomPortAllocator<P> {
    pub fn new(probe: P, rng: Arc<PortRng>, config: &PortConfig) -> Self {
        RandomPortAllocator {
            probe,
            rng,
            range: config.range,
            membership_range: config.membership_range,
            attempt_limit: config.random_attempt_limit,
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn rng(&self) -> &Arc<PortRng> {
        &self.rng
    }

    pub fn range_for(&self, use_membership_range: bool) -> PortRange {
        if use_membership_range {
            self.membership_range
        } else {
            self.range
        }
    }

    /// Returns a random port from the configured range that is free right now
    ///
    /// Retries until a free port turns up. Without a configured attempt limit
    /// this only returns once it succeeds or a probe fails fatally.
    pub fn random_available_port(
        &self,
        protocol: Protocol,
        addr: Option<IpAddr>,
        use_membership_range: bool,
    ) -> Result<u16> {
        let range = self.range_for(use_membership_range);
        let mut attempts: u64 = 0;

        loop {
            self.check_attempt_limit(attempts)?;
            attempts += 1;

            let port = self.rng.gen_port(range);
            if self.probe.is_port_available(port, protocol, addr)? {
                tracing::info!(port, %protocol, attempts, "randomly selected available port");
                return Ok(port);
            }
            tracing::debug!(port, attempts, "candidate port in use");
        }
    }

    /// Like [`random_available_port`](Self::random_available_port), but the port
    /// comes back already claimed
    pub fn random_keepable_port(
        &self,
        protocol: Protocol,
        addr: Option<IpAddr>,
        use_membership_range: bool,
    ) -> Result<Keeper> {
        let range = self.range_for(use_membership_range);
        let mut attempts: u64 = 0;

        loop {
            self.check_attempt_limit(attempts)?;
            attempts += 1;

            let port = self.rng.gen_port(range);
            if let Some(keeper) = self.probe.keep_port(port, protocol, addr)? {
                tracing::info!(port, %protocol, attempts, "randomly selected and kept port");
                return Ok(keeper);
            }
        }
    }

    /// Returns a random free port in `[lower, upper]`, or `None` if
    /// `5 × (upper − lower)` draws found nothing
    pub fn random_available_port_in_range(
        &self,
        lower: u16,
        upper: u16,
        protocol: Protocol,
        addr: Option<IpAddr>,
    ) -> Result<Option<u16>> {
        let range = PortRange::new(lower, upper)?;
        let budget = RANGE_ATTEMPT_FACTOR * u32::from(upper - lower);

        for attempt in 1..=budget {
            let port = self.rng.gen_port(range);
            if self.probe.is_port_available(port, protocol, addr)? {
                tracing::info!(port, %protocol, attempt, "selected available port in range");
                return Ok(Some(port));
            }
        }

        tracing::debug!(%range, budget, "no available port found in range");
        Ok(None)
    }

    fn check_attempt_limit(&self, attempts: u64) -> Result<()> {
        match self.attempt_limit {
            Some(limit) if attempts >= limit => Err(PortError::Exhausted { attempts }),
            _ => Ok(()),
        }
    }
}
