//! # avail-port - port availability and reservation
//!
//! Decides whether a local port is free, claims free ports so nobody else can
//! take them before use, and hands out random free ports from a configured range.
//!
//! ## Protocols
//!
//! - **Stream** (TCP): the port is free if a listening bind succeeds. With no bind
//!   address the wildcard *and* every interface address must bind.
//! - **Multicast** (UDP): the port is free if nobody answers a ping sent to the
//!   multicast group within the probe timeout.
//!
//! ## Architecture
//!
//! ```text
//!   AvailablePort (config + facade)
//!         │
//!   RandomPortAllocator ──► PortRng (process-wide, fast or strong)
//!         │
//!     PortProber ──► Keeper (held listener)
//!         │
//!   InterfaceSource (all-interfaces mode only)
//! ```

pub mod config;
pub mod errors;
pub mod port;

pub use config::PortConfig;
pub use errors::{PortError, Result};
pub use port::{
    AvailablePort, InterfaceAddress, InterfaceSource, Keeper, PortProbe, PortProber, PortRange,
    PortRng, ProbeOptions, Protocol, RandomPortAllocator, StaticInterfaces, SystemInterfaces,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
