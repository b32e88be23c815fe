//! Random source for port allocation
//!
//! The generator is picked once per process (fast or cryptographically strong)
//! and then passed around as an `Arc<PortRng>`. Draws are safe from any thread.

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use crate::port::PortRange;

static GLOBAL_RNG: OnceCell<Arc<PortRng>> = OnceCell::new();

/// Thread-safe port number generator
#[derive(Debug)]
pub enum PortRng {
    /// Non-cryptographic, seeded once
    Fast(Mutex<SmallRng>),
    /// Every draw comes from the operating system
    Strong,
}

impl PortRng {
    pub fn fast() -> Self {
        PortRng::Fast(Mutex::new(SmallRng::from_entropy()))
    }

    pub fn strong() -> Self {
        PortRng::Strong
    }

    /// Reproducible sequence, for tests and simulations
    pub fn seeded(seed: u64) -> Self {
        PortRng::Fast(Mutex::new(SmallRng::seed_from_u64(seed)))
    }

    pub fn from_policy(fast: bool) -> Self {
        if fast {
            Self::fast()
        } else {
            Self::strong()
        }
    }

    /// The process-wide generator
    ///
    /// The first call decides the policy; later calls get the same instance
    /// whatever they ask for.
    pub fn global(fast: bool) -> Arc<PortRng> {
        let rng = GLOBAL_RNG.get_or_init(|| {
            tracing::debug!(fast, "initializing process-wide port rng");
            Arc::new(PortRng::from_policy(fast))
        });
        if rng.is_fast() != fast {
            tracing::debug!(
                requested_fast = fast,
                "process-wide port rng already initialized with the other policy"
            );
        }
        Arc::clone(rng)
    }

    pub fn is_fast(&self) -> bool {
        matches!(self, PortRng::Fast(_))
    }

    /// Uniform draw from `range`, both bounds included
    pub fn gen_port(&self, range: PortRange) -> u16 {
        match self {
            PortRng::Fast(rng) => rng.lock().gen_range(range.start..=range.end),
            PortRng::Strong => OsRng.gen_range(range.start..=range.end),
        }
    }
}
