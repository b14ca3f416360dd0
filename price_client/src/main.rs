//! Price Client — a WebSocket client that subscribes to price updates from the server and
//! prints them to stdout. Symbols come from `--symbols` and/or a text file given with
//! `--path`; the client sends one subscribe frame per symbol, keeps the session alive
//! with periodic `ping`s, and prints every frame it receives.
//!
//! With `--poll` it instead polls the snapshot endpoint for each symbol.
//!
//! Usage example (CLI):
//! ```bash
//! price_client --server-ip 192.168.0.10 --symbols BTCUSD,ETHUSD
//! price_client --server-ip 192.168.0.10 --path ./symbols.txt --poll
//! ```
#![warn(missing_docs)]
mod args;
mod poller;
mod sender;

use crate::args::Args;
use crate::sender::{FrameSender, StreamSocket};
use clap::Parser;
use log::{debug, error, info, warn};
use price_common::net::addr;
use price_common::symbol::{Symbol, SymbolParser};
use price_common::{PriceError, Result, ServerMessage};
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::net::TcpStream;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};
use tungstenite::{Error as WsError, Message};

/// Bound on a single blocking read, so pings and Ctrl+C are noticed.
const READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Bound on the opening handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn print_frame(text: &str) {
    match ServerMessage::from_json(text) {
        Ok(ServerMessage::Price {
            symbol,
            price,
            timestamp,
        }) => {
            info!("PRICE: {} Price={:.2} Time={:.3}", symbol, price, timestamp);
        }
        Ok(ServerMessage::Ping) => debug!("Server keep-alive ping"),
        Ok(other) => info!("SERVER: {:?}", other),
        Err(_) => debug!("Received non-JSON frame: {}", text),
    }
}

/// Runs a blocking loop that reads frames from `socket` and prints them,
/// pinging whenever `sender` says a ping is due.
fn start_receiver_loop(
    mut socket: StreamSocket,
    mut sender: FrameSender,
    shutdown: Arc<AtomicBool>,
) -> Result<(), PriceError> {
    info!("Price receiver running on: {}", socket.get_ref().local_addr()?);

    while !shutdown.load(Ordering::Relaxed) {
        sender.ping_if_due(&mut socket, Instant::now())?;
        match socket.read() {
            Ok(Message::Text(text)) => print_frame(&text),
            Ok(Message::Close(frame)) => {
                warn!("Server closed the connection: {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(WsError::Io(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
                warn!("Server closed the connection");
                break;
            }
            Err(e) => {
                error!("Receive data error: {}", e);
                return Err(PriceError::Transport(e.to_string()));
            }
        }
    }
    info!("Receiver loop stopping...");
    let _ = socket.close(None);
    let _ = socket.flush();
    Ok(())
}

fn collect_symbols(args: &Args) -> Result<Vec<String>> {
    let mut symbols: Vec<String> = args
        .symbols
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(path) = &args.path {
        let file = File::open(path.trim().trim_matches('"'))?;
        for symbol in Symbol::parse_from_file(BufReader::new(file))? {
            symbols.push(symbol.to_string());
        }
    }
    Ok(symbols)
}

fn run_stream(args: &Args, symbols: &[String], shutdown: Arc<AtomicBool>) -> Result<()> {
    let server_address = addr(&args.server_ip, args.stream_port);
    let url = format!("ws://{}{}", server_address, args.ws_path);
    info!("Connecting to stream server at {}", url);
    let stream = TcpStream::connect(&server_address)
        .map_err(|e| PriceError::Format(format!("Failed to connect to server: {}", e)))?;
    stream.set_read_timeout(Some(CONNECT_TIMEOUT))?;
    let (mut socket, _) = tungstenite::client(url, stream)
        .map_err(|e| PriceError::Transport(format!("WebSocket handshake failed: {}", e)))?;
    socket.get_ref().set_read_timeout(Some(READ_TIMEOUT))?;

    for symbol in symbols {
        FrameSender::subscribe(&mut socket, &args.channel, symbol)?;
    }
    let sender = FrameSender::new(Duration::from_millis(args.ping_interval_ms), Instant::now());

    info!("Client is running. Press Ctrl+C to exit.");
    start_receiver_loop(socket, sender, shutdown)
}

fn run_poll(args: &Args, symbols: &[String], shutdown: Arc<AtomicBool>) -> Result<()> {
    let server_address = addr(&args.server_ip, args.snapshot_port);
    let symbols = symbols
        .iter()
        .map(|s| Symbol::new(s))
        .collect::<Result<Vec<Symbol>>>()?;
    info!("Polling {} symbol(s) from {}", symbols.len(), server_address);

    while !shutdown.load(Ordering::Relaxed) {
        for symbol in &symbols {
            match poller::fetch_snapshot(&server_address, symbol) {
                Ok(snapshot) => info!(
                    "SNAPSHOT: {} Price={:.2} Time={:.3}",
                    snapshot.symbol, snapshot.price, snapshot.timestamp
                ),
                Err(e) => warn!("Snapshot for {} failed: {}", symbol, e),
            }
        }
        thread::sleep(Duration::from_millis(args.poll_interval_ms));
    }
    Ok(())
}

fn main() -> Result<(), PriceError> {
    init_logger();
    let args = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down client...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| PriceError::Format(format!("Error setting Ctrl+C handler: {}", e)))?;
    }

    let symbols = collect_symbols(&args)?;
    if symbols.is_empty() {
        warn!("No symbols given; use --symbols or --path");
        return Ok(());
    }
    info!("Symbols: {:?}", symbols);

    if args.poll {
        run_poll(&args, &symbols, shutdown)
    } else {
        run_stream(&args, &symbols, shutdown)
    }
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
