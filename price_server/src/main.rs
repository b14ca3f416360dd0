//! Price fan-out server binary.
//!
//! Parses the command line into a `ServerConfig`, starts the streaming listener,
//! the snapshot endpoint and the feed driver, then blocks on the stream listener.
//!
//! Network protocol (high-level):
//! - Stream port (default `8080`): WebSocket at `/ws` or `/api/ws` carrying JSON
//!   text frames. Send `{"action":"subscribe","channel":"prices","symbol":"BTCUSD"}`
//!   to receive `{"type":"price",...}` frames; `ping` is answered with `{"type":"pong"}`.
//! - Snapshot port (default `8081`): HTTP `GET /prices/{symbol}`.
#![warn(missing_docs)]
mod args;

use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use clap::Parser;
use log::info;
use price_common::symbol::{Symbol, SymbolParser};
use price_common::{PriceError, Result};
use price_server::{PriceServer, ServerConfig};

use crate::args::Args;

fn main() -> Result<(), PriceError> {
    init_logger();
    let args = Args::parse();
    let config = build_config(&args)?;
    let server = PriceServer::start(config)?;
    info!(
        "Streaming on {}, snapshots on {}. Press Ctrl+C to exit.",
        server.stream_addr, server.snapshot_addr
    );
    server.wait();
    Ok(())
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let symbols = match &args.symbols {
        Some(path) => {
            let file = File::open(path.trim())?;
            let symbols = Symbol::parse_from_file(BufReader::new(file))?;
            info!("Seeding {} symbol(s) from {}", symbols.len(), path);
            symbols
        }
        None => Vec::new(),
    };
    Ok(ServerConfig {
        bind_ip: args.bind.clone(),
        stream_port: args.stream_port,
        snapshot_port: args.snapshot_port,
        idle_window: Duration::from_secs(args.idle_window_secs),
        tick_interval: Duration::from_millis(args.tick_interval_ms),
        max_connections: to_usize(args.max_connections, "--max-connections")?,
        outbound_capacity: to_usize(args.outbound_capacity, "--outbound-capacity")?,
        symbols,
        subscribe_all: args.subscribe_all,
        ..ServerConfig::default()
    })
}

fn to_usize(value: u64, flag: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| PriceError::Format(format!("{} is too large: {}", flag, value)))
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
