//! Error types for avail-port

use std::net::SocketAddr;
use thiserror::Error;

/// Everything that can make a port query fail outright.
///
/// Port contention is not represented here: a port that is in use is a normal
/// `false` / `None` answer, not an error.
#[derive(Error, Debug)]
pub enum PortError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Network is unreachable: {addr}")]
    NetworkUnreachable {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Interface enumeration failed: {0}")]
    InterfaceEnumeration(String),

    #[error("No available port after {attempts} attempts")]
    Exhausted { attempts: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unable to resolve address: {0}")]
    AddressResolution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PortError {
    /// True for the conditions that point at host misconfiguration rather than
    /// a bad call.
    pub fn is_host_failure(&self) -> bool {
        matches!(
            self,
            PortError::NetworkUnreachable { .. } | PortError::InterfaceEnumeration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PortError>;
