use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use quickdraw_server::{build_router, AppState, Config};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a server with short round timings
    pub async fn new() -> Self {
        let mut config = Config::default();
        config.game.cue_delay_min = Duration::from_millis(50);
        config.game.cue_delay_max = Duration::from_millis(100);
        config.game.next_round_delay = Duration::from_millis(100);
        config.matchmaking.auto_ready_delay = Duration::from_millis(100);
        Self::from_config(config).await
    }

    pub async fn from_config(config: Config) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let router = build_router(AppState::new(config));
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Connect and consume the `welcome` message
pub async fn ws_connect(server: &TestServer) -> Ws {
    let (mut stream, _) = tokio_tungstenite::connect_async(server.ws_url()).await.unwrap();
    let welcome = ws_read(&mut stream).await;
    assert_eq!(welcome["type"], "welcome", "unexpected first message: {welcome}");
    stream
}

pub async fn ws_send(stream: &mut Ws, msg: Value) {
    tokio_test::assert_ok!(stream.send(Message::Text(msg.to_string())).await);
}

pub async fn ws_send_raw(stream: &mut Ws, text: &str) {
    tokio_test::assert_ok!(stream.send(Message::Text(text.to_string())).await);
}

/// Next JSON text message
pub async fn ws_read(stream: &mut Ws) -> Value {
    loop {
        let next = tokio::time::timeout(READ_TIMEOUT, stream.next())
            .await
            .expect("timed out waiting for server message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = next {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read until a message of type `ty` arrives
pub async fn ws_expect(stream: &mut Ws, ty: &str) -> Value {
    loop {
        let msg = ws_read(stream).await;
        if msg["type"] == ty {
            return msg;
        }
    }
}

pub fn player(name: &str, rating: u32) -> Value {
    json!({ "username": name, "rating": rating })
}

/// Host creates a room and guest joins it. Returns the room code.
pub async fn ws_seat_pair(host: &mut Ws, guest: &mut Ws) -> String {
    ws_send(host, json!({ "type": "create_room", "player": player("Host", 1000) })).await;
    let created = ws_expect(host, "room_created").await;
    assert_eq!(created["seat"], 1);
    let code = created["room_code"].as_str().unwrap().to_string();

    ws_send(
        guest,
        json!({ "type": "join_room", "room_code": code, "player": player("Guest", 1100) }),
    )
    .await;
    let joined = ws_expect(guest, "room_joined").await;
    assert_eq!(joined["seat"], 2);
    assert_eq!(joined["opponent"]["username"], "Host");

    let notice = ws_expect(host, "player_joined").await;
    assert_eq!(notice["player"]["username"], "Guest");
    code
}
