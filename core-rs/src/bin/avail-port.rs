//! avail-port - command-line front end
//!
//! Prints whether a port is available for a protocol, or prints a randomly
//! selected available port.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use serde_json::json;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::Level;

use avail_port::config::resolve_host;
use avail_port::{AvailablePort, Keeper, PortConfig, PortRange, Protocol};

#[derive(Parser)]
#[command(name = "avail-port")]
#[command(version)]
#[command(
    about = "Check whether a port is available, or print a randomly selected available port",
    long_about = None
)]
struct Cli {
    /// Protocol: socket|tcp|stream or jgroups|javagroups|multicast|udp
    protocol: Protocol,

    /// Port to check; omit it to select a random available port
    port: Option<u16>,

    /// Bind address (socket) or multicast group (jgroups); host names are resolved
    #[arg(long)]
    addr: Option<String>,

    /// Select from the membership port range instead of the general one
    #[arg(long, conflicts_with_all = ["port", "range"])]
    membership: bool,

    /// Bounded search in an explicit range (e.g. 30000-30010)
    #[arg(long, value_name = "LO-HI", conflicts_with = "port")]
    range: Option<PortRange>,

    /// Reserve the port and hold it for SECS seconds before releasing it
    #[arg(long, value_name = "SECS", conflicts_with = "range")]
    keep: Option<u64>,

    /// YAML configuration file (AVAILABLE_PORT_* variables override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Log more (-v info, -vv debug)
    #[arg(long, short = 'v', action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<PortConfig> {
    let mut config = match &cli.config {
        Some(path) => PortConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PortConfig::default(),
    }
    .with_env()
    .context("Invalid AVAILABLE_PORT_* environment")?;

    if let Some(name) = &cli.addr {
        let addr = resolve_host(name)?;
        match cli.protocol {
            Protocol::Stream => config.bind_address = Some(addr),
            Protocol::Multicast => config.mcast_address = Some(addr),
        }
        config.validate()?;
    }

    Ok(config)
}

fn hold(mut keeper: Keeper, secs: u64, cli: &Cli) {
    let port = keeper.port();
    if cli.json {
        println!("{}", json!({ "protocol": cli.protocol.as_str(), "port": port, "kept": true }));
    } else {
        println!("\nHolding {} port {} for {}s\n", cli.protocol, port, secs);
    }
    thread::sleep(Duration::from_secs(secs));
    keeper.release();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let ports = AvailablePort::new(config)?;
    let protocol = cli.protocol;
    let addr = ports.config().address_for(protocol);

    match (cli.port, cli.range, cli.keep) {
        (Some(port), _, Some(secs)) => match ports.keep_port(port, protocol, addr)? {
            Some(keeper) => hold(keeper, secs, &cli),
            None => {
                eprintln!("Port {} is not available for a {} connection", port, protocol);
                std::process::exit(1);
            }
        },
        (Some(port), _, None) => {
            let available = ports.is_port_available(port, protocol, addr)?;
            if cli.json {
                println!(
                    "{}",
                    json!({ "protocol": protocol.as_str(), "port": port, "available": available })
                );
            } else {
                println!(
                    "\nPort {} is {}available for a {} connection\n",
                    port,
                    if available { "" } else { "not " },
                    protocol
                );
            }
        }
        (None, Some(range), _) => {
            match ports.random_available_port_in_range(range.start, range.end, protocol)? {
                Some(port) => {
                    if cli.json {
                        println!("{}", json!({ "protocol": protocol.as_str(), "port": port }));
                    } else {
                        println!("\nRandomly selected {} port: {}\n", protocol, port);
                    }
                }
                None => {
                    eprintln!("No available {} port in range {}", protocol, range);
                    std::process::exit(1);
                }
            }
        }
        (None, None, Some(secs)) => {
            let keeper = ports.random_keepable_port(protocol, addr, cli.membership)?;
            hold(keeper, secs, &cli);
        }
        (None, None, None) => {
            let port = ports.random_available_port(protocol, addr, cli.membership)?;
            if cli.json {
                println!("{}", json!({ "protocol": protocol.as_str(), "port": port }));
            } else {
                println!("\nRandomly selected {} port: {}\n", protocol, port);
            }
        }
    }

    Ok(())
}
