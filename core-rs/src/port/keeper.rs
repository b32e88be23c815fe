//! Port reservation
//!
//! A `Keeper` holds a bound listening socket so the port stays claimed between
//! "found it free" and "started using it". Dropping the keeper releases it.

use std::fmt;
use std::net::TcpListener;

/// An exclusively owned claim on a port
///
/// The socket is closed exactly once: on the first `release()` or on drop,
/// whichever comes first. A keeper created by the IPv6 link-local workaround
/// holds no socket at all.
pub struct Keeper {
    port: u16,
    listener: Option<TcpListener>,
}

impl Keeper {
    pub(crate) fn new(port: u16, listener: Option<TcpListener>) -> Self {
        Keeper { port, listener }
    }

    /// The port this keeper claims (or claimed, once released)
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether a socket is still bound
    pub fn is_held(&self) -> bool {
        self.listener.is_some()
    }

    /// Close the socket so the port can be allocated by someone else
    ///
    /// Releasing an already released keeper does nothing.
    pub fn release(&mut self) {
        if let Some(listener) = self.listener.take() {
            tracing::debug!(port = self.port, "releasing kept port");
            drop(listener);
        }
    }

    /// Hand the bound socket to the caller, ending the reservation without
    /// ever letting the port go
    pub fn into_listener(mut self) -> Option<TcpListener> {
        self.listener.take()
    }
}

impl Drop for Keeper {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Keeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keeper")
            .field("port", &self.port)
            .field("held", &self.is_held())
            .finish()
    }
}
