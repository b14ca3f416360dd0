//! WebSocket text frames over TCP.
//!
//! A tungstenite `WebSocket` cannot be split into read and write halves, so one
//! pump thread owns the socket. It forwards queued outbound frames and polls for
//! inbound messages with a short read timeout, turning them into
//! `InboundEvent`s on a channel. The session writes through a `WsFrameWriter`,
//! which hands frames to the pump over a bounded command queue.

use std::net::TcpStream;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError, bounded};
use log::debug;
use price_common::{PriceError, Result};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::WebSocketConfig;
use tungstenite::protocol::frame::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::{Error as WsError, Message, WebSocket};

/// Request paths accepted for the streaming channel.
pub const STREAM_PATHS: [&str; 2] = ["/ws", "/api/ws"];

/// Largest inbound message (and frame) accepted from a peer.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Read timeout of the pump; bounds outbound latency while the peer is silent.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Outbound frames a session may hand the pump before writes start to wait.
const COMMAND_CAPACITY: usize = 64;

/// Something that happened on the inbound side of a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// One text frame.
    Frame(String),
    /// The peer closed the connection cleanly.
    Closed,
    /// Reading failed.
    Failed(String),
}

/// Outbound half of a session transport.
pub trait FrameWriter: Send {
    /// Write one text frame. Any failure is a `PriceError::Transport`.
    fn write_frame(&mut self, frame: &str) -> Result<()>;

    /// Close the transport. Must be safe to call more than once.
    fn close(&mut self);
}

enum PumpCommand {
    Frame(String),
    Close,
}

/// `FrameWriter` feeding a pump thread.
pub struct WsFrameWriter {
    commands: Sender<PumpCommand>,
    write_timeout: Duration,
}

impl FrameWriter for WsFrameWriter {
    fn write_frame(&mut self, frame: &str) -> Result<()> {
        match self
            .commands
            .send_timeout(PumpCommand::Frame(frame.to_string()), self.write_timeout)
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(PriceError::Transport("write timed out".to_string())),
            Err(SendTimeoutError::Disconnected(_)) => Err(PriceError::Transport("connection closed".to_string())),
        }
    }

    fn close(&mut self) {
        let _ = self.commands.try_send(PumpCommand::Close);
    }
}

/// Limits applied to every accepted socket.
pub fn socket_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_MESSAGE_SIZE);
    config.max_frame_size = Some(MAX_MESSAGE_SIZE);
    config
}

/// Run the server side of the opening handshake on `stream`. Requests for any
/// path other than [`STREAM_PATHS`] are answered with 404.
pub fn handshake(stream: TcpStream) -> Result<WebSocket<TcpStream>> {
    let check_path = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        let path = request.uri().path();
        if STREAM_PATHS.contains(&path) {
            Ok(response)
        } else {
            debug!("Rejected handshake for {}", path);
            let mut rejection = ErrorResponse::new(Some(format!("no stream at {}", path)));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };
    tungstenite::accept_hdr_with_config(stream, check_path, Some(socket_config()))
        .map_err(|e| PriceError::Transport(e.to_string()))
}

/// Send a close frame with `code` and drop the socket.
pub fn reject(mut socket: WebSocket<TcpStream>, code: CloseCode, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    let _ = socket.close(Some(frame));
    let _ = socket.flush();
}

/// Receiving end of a `WsFrameWriter`, consumed by [`spawn_pump`].
pub struct PumpQueue {
    commands: Receiver<PumpCommand>,
}

/// A writer and the queue its frames arrive on.
pub fn pump_channel(write_timeout: Duration) -> (WsFrameWriter, PumpQueue) {
    let (commands, queue) = bounded(COMMAND_CAPACITY);
    let writer = WsFrameWriter {
        commands,
        write_timeout,
    };
    (writer, PumpQueue { commands: queue })
}

/// Spawn the thread owning `socket`. It runs until the peer closes, a read or
/// write fails, the writer is closed or dropped, or `events` is disconnected.
pub fn spawn_pump(
    socket: WebSocket<TcpStream>,
    queue: PumpQueue,
    events: Sender<InboundEvent>,
) -> Result<JoinHandle<()>> {
    socket.get_ref().set_read_timeout(Some(POLL_INTERVAL))?;
    let name = match socket.get_ref().peer_addr() {
        Ok(peer) => format!("pump-{}", peer),
        Err(_) => "pump".to_string(),
    };
    let handle = thread::Builder::new()
        .name(name)
        .spawn(move || pump(socket, queue.commands, events))?;
    Ok(handle)
}

fn pump(mut socket: WebSocket<TcpStream>, commands: Receiver<PumpCommand>, events: Sender<InboundEvent>) {
    loop {
        loop {
            match commands.try_recv() {
                Ok(PumpCommand::Frame(text)) => {
                    if let Err(e) = socket.send(Message::Text(text)) {
                        debug!("Write failed: {}", e);
                        let _ = events.send(InboundEvent::Failed(e.to_string()));
                        return;
                    }
                }
                Ok(PumpCommand::Close) | Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        let event = match socket.read() {
            Ok(Message::Text(text)) => InboundEvent::Frame(text),
            Ok(Message::Binary(bytes)) => InboundEvent::Frame(String::from_utf8_lossy(&bytes).into_owned()),
            // tungstenite queues the close reply; the next read flushes it and
            // reports ConnectionClosed.
            Ok(Message::Close(_)) => InboundEvent::Closed,
            Ok(_) => continue,
            Err(WsError::Io(e))
                if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
                let _ = events.send(InboundEvent::Closed);
                return;
            }
            Err(e) => {
                debug!("Read failed: {}", e);
                let _ = events.send(InboundEvent::Failed(e.to_string()));
                return;
            }
        };
        if events.send(event).is_err() {
            let _ = socket.close(None);
            let _ = socket.flush();
            return;
        }
    }
}
