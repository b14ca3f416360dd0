//! Command-line arguments for the Price Client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use price_common::net::{SNAPSHOT_PORT, STREAM_PORT};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Server IP address (IPv4 or IPv6) where the price service is running.
    #[clap(long, default_value = "127.0.0.1")]
    pub server_ip: String,

    /// Streaming channel port on the server.
    #[clap(long, default_value_t = STREAM_PORT)]
    pub stream_port: u16,

    /// WebSocket path of the streaming channel (`/ws` or `/api/ws`).
    #[clap(long, default_value = "/ws")]
    pub ws_path: String,

    /// Snapshot HTTP port on the server.
    #[clap(long, default_value_t = SNAPSHOT_PORT)]
    pub snapshot_port: u16,

    /// Comma-separated symbols to subscribe to, e.g. `BTCUSD,ETHUSD`. Use `*` for all.
    #[clap(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Path to a text file with symbols to subscribe to.
    /// Symbols may be separated by commas, spaces, or new lines.
    #[clap(long)]
    pub path: Option<String>,

    /// Channel label sent with every subscription.
    #[clap(long, default_value = "prices")]
    pub channel: String,

    /// Interval between client keep-alive pings.
    #[clap(long, default_value_t = 20_000)]
    pub ping_interval_ms: u64,

    /// Poll the snapshot endpoint instead of streaming.
    #[clap(long)]
    pub poll: bool,

    /// Interval between snapshot polls.
    #[clap(long, default_value_t = 2_000)]
    pub poll_interval_ms: u64,
}
