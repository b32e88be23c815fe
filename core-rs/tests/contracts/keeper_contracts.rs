// Keeper Contract Tests
//
// A kept port must be unavailable to everybody else until it is released,
// and only one caller can ever keep a given port.

use avail_port::{PortError, PortProber, Protocol};
use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::sync::{Arc, Barrier};
use std::thread;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// WHY: probe → keep → release must read available / unavailable / available
/// REASON: The keeper exists to close the window between probing and binding
/// BREAKS: Two services end up racing for the same port
#[test]
fn keep_then_release_restores_availability() {
    let prober = PortProber::default();

    for addr in [Some(LOCALHOST), None] {
        let port = free_port();

        assert!(prober.is_port_available(port, Protocol::Stream, addr).unwrap());

        let mut keeper = prober
            .keep_port(port, Protocol::Stream, addr)
            .unwrap()
            .expect("free port must be keepable");
        assert!(!prober.is_port_available(port, Protocol::Stream, addr).unwrap());
        assert!(prober.keep_port(port, Protocol::Stream, addr).unwrap().is_none());

        keeper.release();
        assert!(prober.is_port_available(port, Protocol::Stream, addr).unwrap());
    }
}

/// WHY: Releasing twice is harmless
/// REASON: Cleanup paths may release a keeper that was already released
/// BREAKS: Panics or closed-socket errors leaking out of cleanup code
#[test]
fn double_release_is_a_no_op() {
    let prober = PortProber::default();
    let port = free_port();

    let mut keeper = prober.keep_port(port, Protocol::Stream, Some(LOCALHOST)).unwrap().unwrap();
    keeper.release();
    keeper.release();
    drop(keeper);

    assert!(prober.is_port_available(port, Protocol::Stream, Some(LOCALHOST)).unwrap());
}

/// WHY: Concurrent keeps of one port produce exactly one keeper
/// REASON: Exclusivity comes from the OS bind, not from a lock in this crate
/// BREAKS: Two owners believe they hold the same port
#[test]
fn concurrent_keeps_have_exactly_one_winner() {
    let prober = Arc::new(PortProber::default());

    for _ in 0..20 {
        let port = free_port();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let prober = Arc::clone(&prober);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    prober.keep_port(port, Protocol::Stream, Some(LOCALHOST)).unwrap()
                })
            })
            .collect();

        let keepers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = keepers.iter().filter(|k| k.is_some()).count();
        assert_eq!(winners, 1, "port {} kept {} times", port, winners);
    }
}

/// WHY: An externally bound port is never reported free
/// BREAKS: Allocated ports collide with running services
#[test]
fn externally_bound_port_is_unavailable() {
    let prober = PortProber::default();
    let port = free_port();

    assert!(prober.is_port_available(port, Protocol::Stream, None).unwrap());

    let _external = TcpListener::bind(("127.0.0.1", port)).unwrap();
    assert!(!prober.is_port_available(port, Protocol::Stream, None).unwrap());
    assert!(!prober.is_port_available(port, Protocol::Stream, Some(LOCALHOST)).unwrap());
}

/// WHY: Multicast ports cannot be kept
/// REASON: Group membership is not an exclusive claim
/// BREAKS: Callers think they own a multicast port that anyone can join
#[test]
fn multicast_keep_is_invalid_argument() {
    let prober = PortProber::default();
    let result = prober.keep_port(free_port(), Protocol::Multicast, None);
    assert!(matches!(result, Err(PortError::InvalidArgument(_))));
}

/// WHY: A kept listener can be handed over without ever freeing the port
/// BREAKS: The race the keeper exists to close reopens at hand-over
#[test]
fn into_listener_keeps_the_claim() {
    let prober = PortProber::default();
    let port = free_port();

    let keeper = prober.keep_port(port, Protocol::Stream, Some(LOCALHOST)).unwrap().unwrap();
    let listener = keeper.into_listener().expect("bound keeper has a listener");

    assert_eq!(listener.local_addr().unwrap().port(), port);
    assert!(!prober.is_port_available(port, Protocol::Stream, Some(LOCALHOST)).unwrap());
}
