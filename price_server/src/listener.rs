use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use log::{error, info, warn};
use price_common::{PriceError, Result};
use tungstenite::protocol::frame::coding::CloseCode;

use crate::registry::ConnectionRegistry;
use crate::session::{ConnectionSession, SessionConfig};
use crate::transport::{handshake, pump_channel, reject, spawn_pump};

/// Inbound frames a pump may queue ahead of its session.
const INBOUND_CAPACITY: usize = 64;

/// Bound on the opening handshake of a new connection.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP listener for the WebSocket streaming channel.
///
/// Every accepted connection gets its own thread, which performs the handshake
/// and then runs the `ConnectionSession`, with a pump thread owning the socket.
/// A failure while setting up one client is logged and the listener keeps
/// accepting others.
pub struct StreamListener {
    /// The underlying TCP listening socket.
    pub(crate) socket: TcpListener,
}

impl StreamListener {
    /// Bind a new listener to `bind_addr` (e.g., `0.0.0.0:8080`).
    pub fn new(bind_addr: &str) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking accept loop.
    pub fn accept_loop(
        self,
        registry: Arc<ConnectionRegistry>,
        config: SessionConfig,
        write_timeout: Duration,
    ) -> Result<()> {
        info!("Stream server is started on {}", self.socket.local_addr()?);

        for stream in self.socket.incoming() {
            match stream {
                Ok(stream) => {
                    let registry = Arc::clone(&registry);
                    let spawned = thread::Builder::new()
                        .name("connection".to_string())
                        .spawn(move || {
                            if let Err(e) = serve_connection(stream, registry, config, write_timeout) {
                                warn!("Connection rejected: {}", e);
                            }
                        });
                    if let Err(e) = spawned {
                        error!("Failed to spawn connection thread: {}", e);
                    }
                }
                Err(e) => error!("TCP connection error: {}", e),
            }
        }
        Ok(())
    }
}

/// Handshake, register and serve one client on the calling thread. The socket
/// is owned by exactly one value at every step, so each early return closes it.
fn serve_connection(
    stream: TcpStream,
    registry: Arc<ConnectionRegistry>,
    config: SessionConfig,
    write_timeout: Duration,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(write_timeout))?;
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    let socket = handshake(stream)?;

    let (writer, queue) = pump_channel(write_timeout);
    let (inbound_tx, inbound_rx) = bounded(INBOUND_CAPACITY);
    let session = match ConnectionSession::accept(registry, Some(peer), writer, inbound_rx, config) {
        Ok(session) => session,
        Err(e) => {
            if matches!(e, PriceError::Capacity(_)) {
                reject(socket, CloseCode::Again, "connection limit reached");
            }
            return Err(e);
        }
    };
    let handle = session.handle();
    info!("Accepted {} as connection {}", peer, handle);

    spawn_pump(socket, queue, inbound_tx)?;
    session.run();
    Ok(())
}
