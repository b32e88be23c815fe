/**
 * config.rs
 * Port service configuration
 *
 * Sources, later ones overriding earlier ones:
 * - built-in defaults
 * - a YAML file (`PortConfig::load`)
 * - AVAILABLE_PORT_* environment variables (`PortConfig::with_env`)
 *
 * Format:
 * ```yaml
 * range: { start: 20001, end: 29999 }
 * membershipRange: { start: 41000, end: 61000 }
 * mcastAddress: 239.192.81.1
 * bindAddress: 127.0.0.1
 * timeoutMs: 2000
 * fastRandom: false
 * linkLocalWorkaround: true
 * ```
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use crate::errors::{PortError, Result};
use crate::port::{PortRange, Protocol};

/// 20000/udp is securid
pub const DEFAULT_PORT_RANGE_LOWER_BOUND: u16 = 20001;
/// 30000/tcp is spoolfax
pub const DEFAULT_PORT_RANGE_UPPER_BOUND: u16 = 29999;
pub const DEFAULT_MEMBERSHIP_PORT_RANGE: PortRange = PortRange {
    start: 41000,
    end: 61000,
};
pub const DEFAULT_MCAST_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(239, 192, 81, 1));
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2000;

pub const ENV_LOWER_BOUND: &str = "AVAILABLE_PORT_LOWER_BOUND";
pub const ENV_UPPER_BOUND: &str = "AVAILABLE_PORT_UPPER_BOUND";
pub const ENV_MEMBERSHIP_RANGE: &str = "AVAILABLE_PORT_MEMBERSHIP_RANGE";
pub const ENV_MCAST_ADDRESS: &str = "AVAILABLE_PORT_MCAST_ADDRESS";
pub const ENV_BIND_ADDRESS: &str = "AVAILABLE_PORT_BIND_ADDRESS";
pub const ENV_TIMEOUT: &str = "AVAILABLE_PORT_TIMEOUT";
pub const ENV_FAST_RANDOM: &str = "AVAILABLE_PORT_FAST_RANDOM";
pub const ENV_LINK_LOCAL_WORKAROUND: &str = "AVAILABLE_PORT_LINK_LOCAL_WORKAROUND";
pub const ENV_RANDOM_ATTEMPT_LIMIT: &str = "AVAILABLE_PORT_RANDOM_ATTEMPT_LIMIT";
pub const ENV_MCAST_INTERFACE: &str = "AVAILABLE_PORT_MCAST_INTERFACE";

static MEMBERSHIP_RANGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*-\s*(\d+)\s*$").expect("valid membership range regex"));

/// Port service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortConfig {
    /// General-purpose random allocation range
    pub range: PortRange,
    /// Range used for cluster membership ports
    pub membership_range: PortRange,
    /// Multicast group probed when the caller gives none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcast_address: Option<IpAddr>,
    /// Default bind address for stream probes; unset means all interfaces
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<IpAddr>,
    /// Multicast receive timeout in milliseconds
    pub timeout_ms: u64,
    /// Use a fast non-cryptographic generator instead of the OS one
    pub fast_random: bool,
    /// Report ports on IPv6 link-local addresses as available when the bind fails
    pub link_local_workaround: bool,
    /// Cap for the otherwise unbounded random search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_attempt_limit: Option<u64>,
    /// Outgoing interface for IPv4 multicast probes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multicast_interface: Option<Ipv4Addr>,
}

impl Default for PortConfig {
    fn default() -> Self {
        PortConfig {
            range: PortRange {
                start: DEFAULT_PORT_RANGE_LOWER_BOUND,
                end: DEFAULT_PORT_RANGE_UPPER_BOUND,
            },
            membership_range: DEFAULT_MEMBERSHIP_PORT_RANGE,
            mcast_address: None,
            bind_address: None,
            timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            fast_random: false,
            link_local_workaround: true,
            random_attempt_limit: None,
            multicast_interface: None,
        }
    }
}

impl PortConfig {
    /// Load configuration from a YAML file
    ///
    /// Missing keys keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: PortConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// Override fields from AVAILABLE_PORT_* environment variables
    pub fn with_env(self) -> Result<Self> {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Override fields from any key/value source
    pub fn with_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_LOWER_BOUND) {
            self.range.start = parse_value(ENV_LOWER_BOUND, &value)?;
        }
        if let Some(value) = lookup(ENV_UPPER_BOUND) {
            self.range.end = parse_value(ENV_UPPER_BOUND, &value)?;
        }
        if let Some(value) = lookup(ENV_MEMBERSHIP_RANGE) {
            self.membership_range = parse_membership_range(&value);
        }
        if let Some(value) = lookup(ENV_MCAST_ADDRESS) {
            self.mcast_address = Some(resolve_host(&value)?);
        }
        if let Some(value) = lookup(ENV_BIND_ADDRESS) {
            self.bind_address = Some(resolve_host(&value)?);
        }
        if let Some(value) = lookup(ENV_TIMEOUT) {
            self.timeout_ms = parse_value(ENV_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_FAST_RANDOM) {
            self.fast_random = parse_flag(ENV_FAST_RANDOM, &value)?;
        }
        if let Some(value) = lookup(ENV_LINK_LOCAL_WORKAROUND) {
            self.link_local_workaround = parse_flag(ENV_LINK_LOCAL_WORKAROUND, &value)?;
        }
        if let Some(value) = lookup(ENV_RANDOM_ATTEMPT_LIMIT) {
            self.random_attempt_limit = Some(parse_value(ENV_RANDOM_ATTEMPT_LIMIT, &value)?);
        }
        if let Some(value) = lookup(ENV_MCAST_INTERFACE) {
            self.multicast_interface = Some(parse_value(ENV_MCAST_INTERFACE, &value)?);
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.range
            .validate()
            .map_err(|e| PortError::Config(format!("range: {}", e)))?;
        self.membership_range
            .validate()
            .map_err(|e| PortError::Config(format!("membershipRange: {}", e)))?;
        if let Some(addr) = self.mcast_address {
            if !addr.is_multicast() {
                return Err(PortError::Config(format!(
                    "mcastAddress {} is not a multicast address",
                    addr
                )));
            }
        }
        if self.timeout_ms == 0 {
            return Err(PortError::Config("timeoutMs must be at least 1".to_string()));
        }
        if self.random_attempt_limit == Some(0) {
            return Err(PortError::Config(
                "randomAttemptLimit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Multicast receive timeout
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Configured default address for a protocol, if any
    pub fn address_for(&self, protocol: Protocol) -> Option<IpAddr> {
        match protocol {
            Protocol::Stream => self.bind_address,
            Protocol::Multicast => self.mcast_address,
        }
    }

    /// Range used by the random allocator
    pub fn range_for(&self, use_membership_range: bool) -> PortRange {
        if use_membership_range {
            self.membership_range
        } else {
            self.range
        }
    }
}

/// Parse `"lower-upper"`, falling back to the default membership range when the
/// value does not match
fn parse_membership_range(value: &str) -> PortRange {
    let parsed = MEMBERSHIP_RANGE_PATTERN.captures(value).and_then(|caps| {
        let start = caps[1].parse::<u16>().ok()?;
        let end = caps[2].parse::<u16>().ok()?;
        PortRange::new(start, end).ok()
    });

    parsed.unwrap_or_else(|| {
        tracing::warn!(
            value,
            default = %DEFAULT_MEMBERSHIP_PORT_RANGE,
            "ignoring malformed membership port range"
        );
        DEFAULT_MEMBERSHIP_PORT_RANGE
    })
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| PortError::Config(format!("{}: invalid value '{}'", key, value)))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(PortError::Config(format!(
            "{}: expected a boolean, got '{}'",
            key, value
        ))),
    }
}

/// Resolve an IP literal or host name to an address
pub fn resolve_host(name: &str) -> Result<IpAddr> {
    let name = name.trim();
    if let Ok(addr) = name.parse::<IpAddr>() {
        return Ok(addr);
    }

    (name, 0)
        .to_socket_addrs()
        .map_err(|e| PortError::AddressResolution(format!("{}: {}", name, e)))?
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| PortError::AddressResolution(name.to_string()))
}
