//! Statistics display and formatting

use sep::{EndpointStats, FloodState};
use std::io::Write;
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format RTT in human-readable form, "N/A" before the first sample
pub fn format_rtt(rtt: Duration) -> String {
    let us = rtt.as_micros();
    if us == 0 {
        "N/A".to_string()
    } else if us >= 1_000_000 {
        format!("{:.2}s", us as f64 / 1_000_000.0)
    } else if us >= 1_000 {
        format!("{:.2}ms", us as f64 / 1_000.0)
    } else {
        format!("{}µs", us)
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn format_flood(state: FloodState) -> &'static str {
    match state {
        FloodState::Normal => "normal",
        FloodState::Flooded => "FLOODED",
    }
}

/// Percentage of sent messages that were acknowledged
fn delivery_ratio(stats: &EndpointStats) -> String {
    let settled = stats.messages_acked + stats.messages_lost;
    if settled == 0 {
        "N/A".to_string()
    } else {
        format!("{:.1}%", stats.messages_acked as f64 * 100.0 / settled as f64)
    }
}

/// Display a statistics table, one row per endpoint
pub fn display_endpoint_stats(stats: &[EndpointStats], uptime: Duration, dropped: u64) {
    println!("\n┌──────────────────────────────────────────────────────────────────────────┐");
    println!(
        "│ ENDPOINT STATISTICS   uptime {:<10} dropped datagrams {:<18}│",
        format_duration(uptime),
        dropped
    );
    println!("├───────────────────────┬──────────┬──────────┬──────────┬─────────┬────────┤");
    println!("│ Endpoint              │ Sent     │ Received │ RTT      │ Flood   │ Acked  │");
    println!("├───────────────────────┼──────────┼──────────┼──────────┼─────────┼────────┤");

    for endpoint in stats {
        println!(
            "│ {:21} │ {:8} │ {:8} │ {:8} │ {:7} │ {:6} │",
            endpoint.addr.to_string(),
            format_bytes(endpoint.bytes_sent),
            format_bytes(endpoint.bytes_received),
            format_rtt(endpoint.rtt),
            format_flood(endpoint.flood_state),
            delivery_ratio(endpoint)
        );
    }

    println!("└───────────────────────┴──────────┴──────────┴──────────┴─────────┴────────┘");
}

/// Display compact stats on one line (for continuous updates)
pub fn display_compact_stats(stats: &EndpointStats, connected: bool, uptime: Duration) {
    print!(
        "\r[{:8}] {} {} | seq {}/{} | RTT {} | {} | sent {} recv {}         ",
        format_duration(uptime),
        stats.host,
        if connected { "up" } else { "down" },
        stats.local_seq,
        stats.remote_seq,
        format_rtt(stats.rtt),
        format_flood(stats.flood_state),
        stats.messages_sent,
        stats.messages_received
    );
    let _ = std::io::stdout().flush();
}
