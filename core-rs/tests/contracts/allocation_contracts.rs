// Random Allocation Contract Tests
//
// These tests pin the allocation invariants callers rely on: results stay inside
// the configured range, results are free when returned, and the bounded search
// really is bounded.

use avail_port::port::allocator::RANGE_ATTEMPT_FACTOR;
use avail_port::{
    Keeper, PortConfig, PortError, PortProbe, PortProber, PortRange, PortRng, Protocol,
    RandomPortAllocator, Result,
};
use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Real prober that counts how often it is asked
struct CountingProbe {
    inner: PortProber,
    calls: AtomicU64,
}

impl CountingProbe {
    fn new() -> Self {
        CountingProbe {
            inner: PortProber::default(),
            calls: AtomicU64::new(0),
        }
    }
}

impl PortProbe for CountingProbe {
    fn is_port_available(&self, port: u16, protocol: Protocol, addr: Option<IpAddr>) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.is_port_available(port, protocol, addr)
    }

    fn keep_port(&self, port: u16, protocol: Protocol, addr: Option<IpAddr>) -> Result<Option<Keeper>> {
        self.inner.keep_port(port, protocol, addr)
    }
}

/// Bind every port of a block of `len` consecutive ports on the wildcard address
fn occupy_block(first_candidate: u16, len: u16) -> (u16, Vec<TcpListener>) {
    let mut base = first_candidate;
    while base < 60000 {
        let listeners: Vec<TcpListener> = (base..base + len)
            .filter_map(|p| TcpListener::bind((Ipv4Addr::UNSPECIFIED, p)).ok())
            .collect();
        if listeners.len() == len as usize {
            return (base, listeners);
        }
        base += len + 7;
    }
    panic!("no block of {} free ports found", len);
}

/// WHY: The bounded search draws at most 5 × (upper − lower) candidates
/// REASON: Callers scanning small or busy ranges need a liveness guarantee
/// BREAKS: Callers hang on saturated ranges if the budget is dropped
#[test]
fn bounded_search_never_exceeds_budget() {
    let (base, _held) = occupy_block(43000, 11);
    let allocator = RandomPortAllocator::new(
        CountingProbe::new(),
        Arc::new(PortRng::fast()),
        &PortConfig::default(),
    );

    let result = allocator
        .random_available_port_in_range(base, base + 10, Protocol::Stream, None)
        .unwrap();

    assert_eq!(result, None, "every port in the block is held");
    assert_eq!(
        allocator.probe().calls.load(Ordering::SeqCst),
        u64::from(RANGE_ATTEMPT_FACTOR) * 10
    );
}

/// WHY: A range with exactly one free port yields that port
/// REASON: 5 draws per port give every port a fair chance of being picked
/// BREAKS: Callers with nearly full ranges get spurious "not found" results
#[test]
fn bounded_search_finds_the_only_free_port() {
    let (base, mut held) = occupy_block(45000, 11);
    let free = base + 7;
    drop(held.remove(7));

    let allocator = RandomPortAllocator::new(
        PortProber::default(),
        Arc::new(PortRng::fast()),
        &PortConfig::default(),
    );

    // a single search misses one given port out of 11 with probability (10/11)^50
    let found: Vec<u16> = (0..10)
        .filter_map(|_| {
            allocator
                .random_available_port_in_range(base, base + 10, Protocol::Stream, None)
                .unwrap()
        })
        .collect();

    assert!(!found.is_empty(), "the free port was never found");
    assert!(found.iter().all(|&p| p == free), "only {} is free, got {:?}", free, found);
}

/// WHY: Random ports come from the selected range and are free when returned
/// REASON: Callers bind the returned port right away
/// BREAKS: Startup failures on ports outside the agreed range or already taken
#[test]
fn random_port_is_in_range_and_available() {
    let config = PortConfig::default();
    let allocator = RandomPortAllocator::new(
        PortProber::default(),
        Arc::new(PortRng::strong()),
        &config,
    );
    let localhost = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));

    for use_membership in [false, true] {
        let range = config.range_for(use_membership);
        let port = allocator
            .random_available_port(Protocol::Stream, localhost, use_membership)
            .unwrap();

        assert!(range.contains(port), "{} outside {}", port, range);
        assert!(allocator
            .probe()
            .is_port_available(port, Protocol::Stream, localhost)
            .unwrap());
    }
}

/// WHY: The attempt limit only applies when configured
/// REASON: The default search is unbounded; a cap must be an explicit choice
/// BREAKS: Spurious Exhausted errors on busy hosts
#[test]
fn attempt_limit_reports_exhaustion() {
    let (base, _held) = occupy_block(47000, 3);
    let config = PortConfig {
        range: PortRange::new(base, base + 2).unwrap(),
        random_attempt_limit: Some(12),
        ..PortConfig::default()
    };
    let allocator = RandomPortAllocator::new(
        PortProber::default(),
        Arc::new(PortRng::fast()),
        &config,
    );

    match allocator.random_available_port(Protocol::Stream, None, false) {
        Err(PortError::Exhausted { attempts }) => assert_eq!(attempts, 12),
        other => panic!("Expected Exhausted, got {:?}", other),
    }
}

/// WHY: Invalid ranges are programmer errors, not "not found"
/// BREAKS: Silent None results hide inverted bounds
#[test]
fn inverted_range_is_invalid_argument() {
    let allocator = RandomPortAllocator::new(
        PortProber::default(),
        Arc::new(PortRng::fast()),
        &PortConfig::default(),
    );

    let result = allocator.random_available_port_in_range(30010, 30000, Protocol::Stream, None);
    assert!(matches!(result, Err(PortError::InvalidArgument(_))));
}
