//! Integration tests for the avail-port binary

use std::net::TcpListener;
use std::process::{Command, Output};

fn avail_port(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_avail-port"))
        .args(args)
        .env_remove("AVAILABLE_PORT_BIND_ADDRESS")
        .env_remove("AVAILABLE_PORT_LOWER_BOUND")
        .env_remove("AVAILABLE_PORT_UPPER_BOUND")
        .output()
        .expect("Failed to run avail-port")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn test_reports_free_port() {
    let port = free_port().to_string();
    let output = avail_port(&["socket", &port, "--addr", "127.0.0.1"]);

    assert!(output.status.success());
    assert!(
        stdout(&output).contains(&format!("Port {} is available for a socket connection", port)),
        "unexpected output: {}",
        stdout(&output)
    );
}

#[test]
fn test_reports_busy_port() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port().to_string();

    let output = avail_port(&["tcp", &port, "--addr", "127.0.0.1"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(&format!("Port {} is not available", port)));
}

#[test]
fn test_random_port_in_general_range() {
    let output = avail_port(&["socket", "--addr", "127.0.0.1"]);
    assert!(output.status.success());

    let text = stdout(&output);
    let port: u16 = text
        .trim()
        .strip_prefix("Randomly selected socket port: ")
        .expect("random port line")
        .parse()
        .unwrap();
    assert!((20001..=29999).contains(&port));
}

#[test]
fn test_range_search_json() {
    let output = avail_port(&["socket", "--range", "34000-34100", "--addr", "127.0.0.1", "--json"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(value["protocol"], "socket");
    let port = value["port"].as_u64().unwrap();
    assert!((34000..=34100).contains(&port));
}

#[test]
fn test_unknown_protocol_fails() {
    let output = avail_port(&["carrier-pigeon"]);
    assert!(!output.status.success());
}

#[test]
fn test_malformed_port_fails() {
    let output = avail_port(&["socket", "eighty"]);
    assert!(!output.status.success());
}

#[test]
fn test_spurious_argument_fails() {
    let output = avail_port(&["socket", "20001", "20002"]);
    assert!(!output.status.success());
}

#[test]
fn test_multicast_keep_fails() {
    let output = avail_port(&["jgroups", "--keep", "1"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot be kept"));
}

#[test]
fn test_keep_holds_port() {
    let port = free_port().to_string();
    let output = avail_port(&["socket", &port, "--addr", "127.0.0.1", "--keep", "0"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(&format!("Holding socket port {}", port)));
}
