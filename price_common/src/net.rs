//! Shared networking constants and helpers used by client and server.

/// TCP port for the streaming channel (subscribe, ping, price pushes).
pub const STREAM_PORT: u16 = 8080;
/// TCP port for the HTTP snapshot endpoint.
pub const SNAPSHOT_PORT: u16 = 8081;
/// Seconds of inbound silence before the server sends a keep-alive ping.
pub const IDLE_WINDOW_SECS: u64 = 60;
/// Interval between feed ticks.
pub const TICK_INTERVAL_MS: u64 = 2000;
/// Upper bound on simultaneously registered connections.
pub const MAX_CONNECTIONS: usize = 1024;
/// Frames a connection may have queued before it is considered too slow.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Helper to format an IPv4 address with a port like "ip:port".
pub fn addr(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}
