use std::io::ErrorKind;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use price_common::{PriceQuote, PriceSnapshot, Symbol};
use price_server::{PriceServer, ServerConfig};
use serde_json::{Value, json};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::{Error as WsError, Message, WebSocket};

fn start_server(idle_window: Duration) -> PriceServer {
    start_with(ServerConfig {
        idle_window,
        ..test_config()
    })
}

fn test_config() -> ServerConfig {
    ServerConfig {
        bind_ip: "127.0.0.1".to_string(),
        stream_port: 0,
        snapshot_port: 0,
        run_feed: false,
        ..ServerConfig::default()
    }
}

fn start_with(config: ServerConfig) -> PriceServer {
    PriceServer::start(config).unwrap()
}

struct Client {
    socket: WebSocket<TcpStream>,
}

impl Client {
    fn open(server: &PriceServer, path: &str) -> Client {
        let stream = TcpStream::connect(server.stream_addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let url = format!("ws://{}{}", server.stream_addr, path);
        let (socket, _) = tungstenite::client(url, stream).unwrap();
        Client { socket }
    }

    fn connect(server: &PriceServer) -> Client {
        let client = Client::open(server, "/ws");
        wait_until(|| server.registry.len().unwrap() >= 1);
        client
    }

    fn send(&mut self, text: &str) {
        self.socket.send(Message::Text(text.to_string())).unwrap();
    }

    fn recv(&mut self) -> Value {
        loop {
            match self.socket.read().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    /// Read until the server closes; panics if it stays open past the timeout.
    fn expect_closed(&mut self) -> Option<CloseCode> {
        loop {
            match self.socket.read() {
                Ok(Message::Close(frame)) => return frame.map(|f| f.code),
                Ok(_) => continue,
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return None,
                Err(WsError::Io(e)) if !matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => return None,
                Err(e) => panic!("connection not closed: {}", e),
            }
        }
    }
}

fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn sym(raw: &str) -> Symbol {
    Symbol::new(raw).unwrap()
}

#[test]
fn ping_gets_exactly_pong() {
    let server = start_server(Duration::from_secs(60));
    let mut client = Client::connect(&server);
    client.send("ping");
    assert_eq!(client.recv(), json!({"type": "pong"}));
}

#[test]
fn api_ws_path_is_served() {
    let server = start_server(Duration::from_secs(60));
    let mut client = Client::open(&server, "/api/ws");
    client.send(r#"{"type":"ping"}"#);
    assert_eq!(client.recv(), json!({"type": "pong"}));
    assert_eq!(server.registry.len().unwrap(), 1);
}

#[test]
fn unknown_path_is_refused() {
    let server = start_server(Duration::from_secs(60));
    let stream = TcpStream::connect(server.stream_addr).unwrap();
    let url = format!("ws://{}/prices", server.stream_addr);
    assert!(tungstenite::client(url, stream).is_err());
    assert!(server.registry.is_empty().unwrap());
}

#[test]
fn subscribe_then_receive_published_price() {
    let server = start_server(Duration::from_secs(60));
    let mut client = Client::connect(&server);

    client.send(r#"{"action":"subscribe","channel":"prices","symbol":"BTCUSD"}"#);
    assert_eq!(
        client.recv(),
        json!({"type":"subscribed","channel":"prices","symbol":"BTCUSD"})
    );

    server
        .engine
        .publish(&PriceQuote::new(sym("BTCUSD"), 43500.12))
        .unwrap();
    let frame = client.recv();
    assert_eq!(frame["type"], "price");
    assert_eq!(frame["symbol"], "BTCUSD");
    assert_eq!(frame["price"], 43500.12);
    assert!(frame["timestamp"].as_f64().is_some());
}

#[test]
fn idle_connection_gets_server_ping() {
    let server = start_server(Duration::from_millis(150));
    let mut client = Client::connect(&server);
    assert_eq!(client.recv(), json!({"type": "ping"}));
    // The session keeps serving after a keep-alive.
    client.send(r#"{"type":"ping"}"#);
    loop {
        let frame = client.recv();
        if frame == json!({"type": "pong"}) {
            break;
        }
        assert_eq!(frame, json!({"type": "ping"}));
    }
}

#[test]
fn disconnect_deregisters_connection() {
    let server = start_server(Duration::from_secs(60));
    let mut client = Client::connect(&server);
    assert_eq!(server.registry.len().unwrap(), 1);
    client.socket.close(None).unwrap();
    drop(client);
    wait_until(|| server.registry.is_empty().unwrap());
}

#[test]
fn oversized_message_ends_session() {
    let server = start_server(Duration::from_secs(60));
    let mut client = Client::connect(&server);
    // The server may reset the socket before the whole message is written.
    let _ = client.socket.send(Message::Text("x".repeat(100 * 1024)));
    wait_until(|| server.registry.is_empty().unwrap());
}

#[test]
fn connection_over_capacity_is_closed() {
    let server = start_with(ServerConfig {
        max_connections: 1,
        ..test_config()
    });
    let _first = Client::connect(&server);
    let mut second = Client::open(&server, "/ws");
    assert_eq!(second.expect_closed(), Some(CloseCode::Again));
    assert_eq!(server.registry.len().unwrap(), 1);
}

#[test]
fn evicted_peer_does_not_affect_live_peer() {
    let server = start_server(Duration::from_secs(60));
    let mut live = Client::connect(&server);
    live.send(r#"{"action":"subscribe","channel":"prices","symbol":"*"}"#);
    live.recv();

    let mut doomed = Client::connect(&server);
    wait_until(|| server.registry.len().unwrap() == 2);
    doomed.send(r#"{"action":"subscribe","channel":"prices","symbol":"*"}"#);
    doomed.recv();
    let doomed_handle = server
        .engine
        .publish(&PriceQuote::new(sym("ETHUSD"), 2650.0))
        .unwrap()
        .outcomes
        .last()
        .unwrap()
        .handle();
    live.recv();
    doomed.recv();

    // Evict the second connection as a failed delivery would.
    server.registry.remove(doomed_handle).unwrap();
    let report = server
        .engine
        .publish(&PriceQuote::new(sym("ETHUSD"), 2651.0))
        .unwrap();
    assert_eq!(report.delivered(), 1);
    assert_eq!(live.recv()["price"], 2651.0);

    // The evicted session closes its transport.
    doomed.expect_closed();
    wait_until(|| server.registry.len().unwrap() == 1);
}

#[test]
fn snapshot_for_unknown_symbol_is_baseline() {
    let server = start_server(Duration::from_secs(60));
    let snapshot: PriceSnapshot =
        reqwest::blocking::get(format!("http://{}/api/prices/XYZ", server.snapshot_addr))
            .unwrap()
            .json()
            .unwrap();
    assert_eq!(snapshot.symbol, sym("XYZ"));
    assert_eq!(snapshot.price, 100.0);
}

#[test]
fn snapshot_reflects_published_price() {
    let server = start_server(Duration::from_secs(60));
    server
        .engine
        .publish(&PriceQuote::new(sym("SPY"), 480.456))
        .unwrap();
    let snapshot: PriceSnapshot =
        reqwest::blocking::get(format!("http://{}/prices/spy", server.snapshot_addr))
            .unwrap()
            .json()
            .unwrap();
    assert_eq!(snapshot.price, 480.46);
}
