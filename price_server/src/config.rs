//! Server configuration consumed by [`crate::server::PriceServer`].

use std::time::Duration;

use price_common::Symbol;
use price_common::net::{
    IDLE_WINDOW_SECS, MAX_CONNECTIONS, OUTBOUND_CAPACITY, SNAPSHOT_PORT, STREAM_PORT, TICK_INTERVAL_MS,
};

use crate::session::SessionConfig;

/// Everything needed to start a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address both listeners bind to.
    pub bind_ip: String,
    /// Streaming channel port; `0` picks a free port.
    pub stream_port: u16,
    /// Snapshot HTTP port; `0` picks a free port.
    pub snapshot_port: u16,
    /// Inbound silence tolerated before a keep-alive ping.
    pub idle_window: Duration,
    /// Pause between feed ticks.
    pub tick_interval: Duration,
    /// Bound on a single frame write.
    pub write_timeout: Duration,
    /// Registry capacity.
    pub max_connections: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_capacity: usize,
    /// Extra symbols seeded at the baseline price.
    pub symbols: Vec<Symbol>,
    /// Start every connection subscribed to all symbols.
    pub subscribe_all: bool,
    /// Run the built-in random-walk feed.
    pub run_feed: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".to_string(),
            stream_port: STREAM_PORT,
            snapshot_port: SNAPSHOT_PORT,
            idle_window: Duration::from_secs(IDLE_WINDOW_SECS),
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            write_timeout: Duration::from_secs(5),
            max_connections: MAX_CONNECTIONS,
            outbound_capacity: OUTBOUND_CAPACITY,
            symbols: Vec::new(),
            subscribe_all: false,
            run_feed: true,
        }
    }
}

impl ServerConfig {
    /// Per-session part of the configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_window: self.idle_window,
            outbound_capacity: self.outbound_capacity,
        }
    }
}
