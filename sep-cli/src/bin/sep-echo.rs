//! SEP Echo - sends every received payload back
//!
//! Useful as the far end of `sep-peer` when measuring round-trip time.

use anyhow::Context;
use clap::Parser;
use sep::EngineProtocol;
use sep_cli::{display_endpoint_stats, init_logging, PeerConfig};
use sep_io::{Timer, Timestamp};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sep-echo")]
#[command(about = "SEP echo endpoint", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local port to bind
    #[arg(short, long)]
    local_port: Option<u16>,

    /// Port the remote host listens on
    #[arg(short, long)]
    remote_port: Option<u16>,

    /// Remote host name or address
    #[arg(long)]
    host: Option<String>,

    /// Statistics interval in seconds
    #[arg(long, default_value = "5")]
    stats: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    tracing::info!("SEP Echo starting...");

    let mut config = match &args.config {
        Some(path) => PeerConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => PeerConfig::default(),
    };
    if let Some(port) = args.local_port {
        config.protocol.local_port = port;
    }
    if let Some(port) = args.remote_port {
        config.protocol.remote_port = port;
    }
    if let Some(host) = args.host {
        config.protocol.hosts = vec![host];
    }
    if config.protocol.hosts.is_empty() {
        anyhow::bail!("A remote host is required (--host or [protocol].hosts)");
    }

    let mut protocol = EngineProtocol::new(config.protocol);
    protocol.init().context("failed to initialize protocol")?;
    tracing::info!("Echoing on {}", protocol.local_addr()?);

    let start = Timestamp::now();
    let mut stats_timer = Timer::new(Duration::from_secs(args.stats.max(1)));
    let mut echoed = 0u64;

    loop {
        let mut idle = true;
        loop {
            match protocol.poll_message() {
                Ok(Some(message)) => {
                    idle = false;
                    tracing::debug!(
                        "Echoing seq {} ({} bytes) from {}",
                        message.seq,
                        message.payload.len(),
                        message.from
                    );
                    match protocol.send(&message.payload) {
                        Ok(_) => echoed += 1,
                        Err(e) => tracing::warn!("Send error: {}", e),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Receive error: {}", e);
                    break;
                }
            }
        }

        if stats_timer.try_fire() {
            tracing::info!("Echoed {} messages", echoed);
            display_endpoint_stats(
                &protocol.all_stats(),
                start.elapsed(),
                protocol.dropped_datagrams(),
            );
        }

        if idle {
            thread::sleep(Duration::from_millis(1));
        }
    }
}
