//! SEP Peer - fixed-tick protocol driver
//!
//! Exchanges small counter messages with one remote host at a fixed tick
//! rate, throttling sends while the connection is flooded.

use anyhow::Context;
use clap::Parser;
use sep::EngineProtocol;
use sep_cli::{display_compact_stats, display_endpoint_stats, init_logging, PeerConfig};
use sep_io::{Timer, Timestamp};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sep-peer")]
#[command(about = "SEP fixed-tick peer", long_about = None)]
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

    /// Ticks per second
    #[arg(long)]
    tick_rate: Option<u32>,

    /// Size of each outgoing payload in bytes
    #[arg(long)]
    payload_size: Option<usize>,

    /// Statistics interval in seconds
    #[arg(long)]
    stats: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<PeerConfig> {
        let mut config = match &self.config {
            Some(path) => PeerConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => PeerConfig::default(),
        };

        if let Some(port) = self.local_port {
            config.protocol.local_port = port;
        }
        if let Some(port) = self.remote_port {
            config.protocol.remote_port = port;
        }
        if let Some(host) = &self.host {
            config.protocol.hosts = vec![host.clone()];
        }
        if let Some(rate) = self.tick_rate {
            config.peer.tick_rate_hz = rate;
        }
        if let Some(size) = self.payload_size {
            config.peer.payload_size = size;
        }
        if let Some(secs) = self.stats {
            config.peer.stats_interval_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Counter payload padded to `size` bytes
fn counter_payload(counter: u64, size: usize) -> Vec<u8> {
    let mut payload = vec![0u8; size];
    let bytes = counter.to_le_bytes();
    let n = bytes.len().min(size);
    payload[..n].copy_from_slice(&bytes[..n]);
    payload
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", PeerConfig::example().to_toml()?);
        return Ok(());
    }

    init_logging(args.verbose);
    tracing::info!("SEP Peer starting...");

    let config = args.load_config()?;
    let settings = config.peer.clone();
    let host = match config.protocol.hosts.first() {
        Some(host) => host.clone(),
        None => anyhow::bail!("A remote host is required (--host or [protocol].hosts)"),
    };

    let mut protocol = EngineProtocol::new(config.protocol.clone());
    protocol.init().context("failed to initialize protocol")?;
    tracing::info!(
        "Bound to {}, talking to {}:{} at {} Hz",
        protocol.local_addr()?,
        host,
        protocol.remote_port(),
        settings.tick_rate_hz
    );

    let start = Timestamp::now();
    let run_for = args.duration.map(Duration::from_secs);
    let mut tick_timer = Timer::new(settings.tick_interval());
    let mut send_timer = Timer::new(settings.send_interval(false));
    let mut stats_timer = Timer::new(settings.stats_interval());

    let mut buf = vec![0u8; protocol.max_payload_size()];
    let mut counter = 0u64;
    let mut flooded = false;
    let mut connected = false;

    loop {
        let now = Timestamp::now();
        if run_for.map_or(false, |limit| now.duration_since(start) >= limit) {
            tracing::info!("Duration reached");
            break;
        }

        loop {
            match protocol.receive(&mut buf) {
                Ok(0) => break,
                Ok(n) => tracing::trace!("Received {} bytes", n),
                Err(e) => {
                    tracing::warn!("Receive error: {}", e);
                    break;
                }
            }
        }

        let now_connected = protocol.is_connected_to(&host);
        if now_connected != connected {
            connected = now_connected;
            if connected {
                tracing::info!("Connected to {}", host);
            } else {
                tracing::warn!("Lost connection to {}", host);
            }
        }

        let now_flooded = protocol.is_connection_flooded(&host);
        if now_flooded != flooded {
            flooded = now_flooded;
            send_timer.set_interval(settings.send_interval(flooded));
            tracing::info!(
                "Send rate now {} Hz",
                if flooded {
                    settings.flooded_send_rate_hz
                } else {
                    settings.send_rate_hz
                }
            );
        }

        if send_timer.try_fire_at(now) {
            counter += 1;
            if let Err(e) = protocol.send(&counter_payload(counter, settings.payload_size)) {
                tracing::warn!("Send error: {}", e);
            }
        }

        if stats_timer.try_fire_at(now) {
            if let Some(stats) = protocol.stats(&host) {
                if args.verbose {
                    display_endpoint_stats(
                        &protocol.all_stats(),
                        now.duration_since(start),
                        protocol.dropped_datagrams(),
                    );
                } else {
                    display_compact_stats(&stats, connected, now.duration_since(start));
                }
            }
        }

        let wait = tick_timer.time_until_expiration();
        if !wait.is_zero() {
            thread::sleep(wait);
        }
        tick_timer.reset();
    }

    display_endpoint_stats(
        &protocol.all_stats(),
        start.elapsed(),
        protocol.dropped_datagrams(),
    );
    Ok(())
}
