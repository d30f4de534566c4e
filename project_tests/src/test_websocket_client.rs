//! # `websocket_client` Test Runner
//!
//! Exercises the `dakara_base::websocket_client::WebSocketClient` against a
//! loopback server started in the same process: automatic reconnection after
//! a dropped session, event exchange through the JSON envelope and a clean
//! shutdown through the handle.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::routing::any;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

use dakara_base::config::create_logger;
use dakara_base::http_client::ServerConfig;
use dakara_base::websocket_client::{ConnectionState, WebSocketClient, WebSocketHandler};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq)]
enum Event {
    Connected,
    ConnectionLost,
    Message(String, Option<Value>),
}

struct Recorder {
    events: mpsc::UnboundedSender<Event>,
}

impl WebSocketHandler for Recorder {
    fn on_connected(&mut self) {
        let _ = self.events.send(Event::Connected);
    }

    fn on_connection_lost(&mut self) {
        let _ = self.events.send(Event::ConnectionLost);
    }

    fn on_message(&mut self, event: &str, data: Option<Value>) {
        let _ = self.events.send(Event::Message(event.to_string(), data));
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

struct WsState {
    sessions: AtomicU32,
}

async fn ws_route(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> axum::response::Response {
    let session = state.sessions.fetch_add(1, Ordering::SeqCst) + 1;
    ws.on_upgrade(move |socket| serve_session(socket, session))
}

async fn serve_session(mut socket: WebSocket, session: u32) {
    // the first session drops at once to exercise the reconnection path
    if session == 1 {
        return;
    }

    let envelope = json!({"type": "playlist", "data": {"id": 1}}).to_string();
    if socket.send(Message::Text(envelope.into())).await.is_err() {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Text(text) = message {
            let received: Value = serde_json::from_str(text.as_str()).unwrap();
            let reply = json!({"type": "ack", "data": received["type"]}).to_string();
            if socket.send(Message::Text(reply.into())).await.is_err() {
                return;
            }
        }
    }
}

async fn spawn_server() -> anyhow::Result<SocketAddr> {
    let app = Router::new()
        .route("/ws/playlist/", any(ws_route))
        .with_state(Arc::new(WsState {
            sessions: AtomicU32::new(0),
        }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Ok(addr)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    create_logger()?;

    let addr = spawn_server().await?;
    let config = ServerConfig {
        address: format!("127.0.0.1:{}", addr.port()),
        ssl: false,
        login: None,
        password: None,
        token: None,
    };

    let (client, mut handle) = WebSocketClient::new(&config, "ws/playlist/", None)?;
    let client =
        client.with_reconnect_delays(Duration::from_millis(50), Duration::from_millis(200));

    let (tx, mut events) = mpsc::unbounded_channel();
    let task = tokio::spawn(client.run(Recorder { events: tx }));

    println!("--- Starting WebSocket Client Tests ---");

    // --- TEST 1: Automatic reconnection ---
    println!("\n[Test 1] Testing reconnection after a dropped session...");
    assert_eq!(next_event(&mut events).await, Event::Connected);
    assert_eq!(next_event(&mut events).await, Event::ConnectionLost);
    assert_eq!(next_event(&mut events).await, Event::Connected);
    handle.wait_connected().await?;
    assert_eq!(handle.state(), ConnectionState::Connected);
    println!("✅ Client came back on its own after the drop");

    // --- TEST 2: Event exchange ---
    println!("\n[Test 2] Testing event exchange through the envelope...");
    assert_eq!(
        next_event(&mut events).await,
        Event::Message("playlist".to_string(), Some(json!({"id": 1})))
    );
    handle.send("ready", Some(json!({"ok": true})))?;
    assert_eq!(
        next_event(&mut events).await,
        Event::Message("ack".to_string(), Some(json!("ready")))
    );
    println!("✅ Envelope sent and acknowledged");

    // --- TEST 3: Clean shutdown ---
    println!("\n[Test 3] Testing clean shutdown...");
    handle.close();
    timeout(WAIT, task).await??.map_err(anyhow::Error::from)?;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    println!("✅ Client stopped cleanly on close");

    println!("\n--- All Tests Passed Successfully ---");
    Ok(())
}
