use clap::Parser;
use price_common::net::{
    IDLE_WINDOW_SECS, MAX_CONNECTIONS, OUTBOUND_CAPACITY, SNAPSHOT_PORT, STREAM_PORT, TICK_INTERVAL_MS,
};

/// Command-line options of the price server.
#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time price fan-out server", long_about = None)]
pub struct Args {
    /// IP address to bind both listeners to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Streaming channel port.
    #[arg(long, default_value_t = STREAM_PORT)]
    pub stream_port: u16,

    /// Snapshot HTTP port.
    #[arg(long, default_value_t = SNAPSHOT_PORT)]
    pub snapshot_port: u16,

    /// Seconds of inbound silence before a keep-alive ping (1 to 86400).
    #[arg(long, default_value_t = IDLE_WINDOW_SECS, value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub idle_window_secs: u64,

    /// Milliseconds between feed ticks.
    #[arg(long, default_value_t = TICK_INTERVAL_MS)]
    pub tick_interval_ms: u64,

    /// Maximum number of simultaneous connections.
    #[arg(long, default_value_t = MAX_CONNECTIONS as u64, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_connections: u64,

    /// Frames queued per connection before it is evicted as too slow.
    #[arg(long, default_value_t = OUTBOUND_CAPACITY as u64, value_parser = clap::value_parser!(u64).range(1..))]
    pub outbound_capacity: u64,

    /// Optional file with extra symbols (comma, space or newline separated).
    #[arg(long)]
    pub symbols: Option<String>,

    /// Subscribe every new connection to all symbols.
    #[arg(long)]
    pub subscribe_all: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("price_server").chain(extra.iter().copied()))
    }

    #[test]
    fn defaults_parse() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.idle_window_secs, IDLE_WINDOW_SECS);
        assert_eq!(args.outbound_capacity, OUTBOUND_CAPACITY as u64);
    }

    #[test]
    fn zero_idle_window_is_rejected() {
        assert!(parse(&["--idle-window-secs", "0"]).is_err());
        assert!(parse(&["--idle-window-secs", "86401"]).is_err());
        assert_eq!(parse(&["--idle-window-secs", "86400"]).unwrap().idle_window_secs, 86_400);
    }

    #[test]
    fn zero_capacities_are_rejected() {
        assert!(parse(&["--outbound-capacity", "0"]).is_err());
        assert!(parse(&["--max-connections", "0"]).is_err());
        assert_eq!(parse(&["--outbound-capacity", "1"]).unwrap().outbound_capacity, 1);
    }
}
