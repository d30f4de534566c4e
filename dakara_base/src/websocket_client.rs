//! # WebSocket Client Module
//!
//! A self-reconnecting WebSocket client for the Dakara server. The
//! connection runs as a single task (usually spawned) and exchanges JSON
//! envelopes of the form `{"type": "...", "data": ...}` in both directions.
//!
//! When an established connection is lost, the client reconnects on its own
//! with an exponential backoff, notifying the handler on each transition. A
//! handshake rejected by the server (bad token) or a server unreachable on
//! the very first attempt are fatal and end the task with an error.
//!
//! ```no_run
//! use dakara_base::http_client::ServerConfig;
//! use dakara_base::websocket_client::{WebSocketClient, WebSocketHandler};
//!
//! struct Player;
//!
//! impl WebSocketHandler for Player {
//!     fn on_connected(&mut self) {
//!         log::info!("Ready to play");
//!     }
//! }
//!
//! # async fn example(config: ServerConfig) {
//! let (client, _handle) = WebSocketClient::new(&config, "ws/playlist/", None).unwrap();
//! tokio::spawn(client.run(Player));
//! # }
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use http::header::AUTHORIZATION;
use http::HeaderValue;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, tungstenite};
use url::Url;

use crate::http_client::ServerConfig;
use crate::utils::{create_url, display_message};

/// Delay before the first reconnection attempt.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Cap applied to the reconnection delay as it doubles.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Errors raised by the WebSocket client.
#[derive(Debug, Error)]
pub enum WebSocketError {
    /// A message was sent while no connection is established.
    #[error("No connection established")]
    NotConnected,

    /// The server rejected the handshake.
    #[error("Unable to connect to server with this user (status {0})")]
    Authentication(u16),

    /// The server is unreachable.
    #[error("Network error, unable to talk to the server: {0}")]
    Network(String),

    /// The server address or the route cannot form a valid URL.
    #[error("Invalid server parameter: {0}")]
    Parameter(String),
}

/// State of the connection with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, none pending.
    Disconnected,
    /// First connection being established.
    Connecting,
    /// Connection established.
    Connected,
    /// Connection lost, reconnection pending.
    Reconnecting,
}

/// Callbacks of the WebSocket client.
///
/// All methods have default no-op implementations, applications override the
/// ones they care about.
pub trait WebSocketHandler: Send {
    /// Called every time the connection is established, including after a
    /// reconnection.
    fn on_connected(&mut self) {}

    /// Called when an established connection is lost.
    fn on_connection_lost(&mut self) {}

    /// Called for every event received from the server.
    fn on_message(&mut self, event: &str, data: Option<Value>) {
        let _ = data;
        log::error!("Event of unknown type received '{}'", event);
    }
}

enum Command {
    Send(String),
    Close,
}

/// Sending side of the client, clonable and shareable.
#[derive(Clone)]
pub struct WebSocketHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl WebSocketHandle {
    /// Current state of the connection.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Wait until the connection is established.
    ///
    /// Fails if the client task ends before connecting.
    pub async fn wait_connected(&mut self) -> Result<(), WebSocketError> {
        loop {
            if *self.state_rx.borrow_and_update() == ConnectionState::Connected {
                return Ok(());
            }

            if self.state_rx.changed().await.is_err() {
                return Err(WebSocketError::NotConnected);
            }
        }
    }

    /// Send an event to the server.
    ///
    /// The event is wrapped in a JSON envelope with its type and optional
    /// data. Fails when no connection is established.
    pub fn send(&self, event: &str, data: Option<Value>) -> Result<(), WebSocketError> {
        if self.state() != ConnectionState::Connected {
            return Err(WebSocketError::NotConnected);
        }

        let mut content = serde_json::json!({ "type": event });
        if let Some(data) = data {
            content["data"] = data;
        }

        self.cmd_tx
            .send(Command::Send(content.to_string()))
            .map_err(|_| WebSocketError::NotConnected)
    }

    /// Request a clean shutdown of the connection.
    ///
    /// The client task ends without error and does not reconnect.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

enum LoopEnd {
    Closed,
    Lost,
}

/// Self-reconnecting WebSocket connection with the Dakara server.
pub struct WebSocketClient {
    server_url: Url,
    authorization: Option<HeaderValue>,
    reconnect_base_delay: Duration,
    reconnect_max_delay: Duration,
    state_tx: watch::Sender<ConnectionState>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl WebSocketClient {
    /// Create a client for the given server and route.
    ///
    /// The authorization header value typically comes from
    /// [`HttpClient::authorization_header`](crate::http_client::HttpClient::authorization_header).
    pub fn new(
        config: &ServerConfig,
        route: &str,
        authorization: Option<HeaderValue>,
    ) -> Result<(Self, WebSocketHandle), WebSocketError> {
        let server_url = create_url(&config.address, config.ssl, route, "ws", "wss")
            .map_err(|error| WebSocketError::Parameter(format!("{}: {}", config.address, error)))?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let client = Self {
            server_url,
            authorization,
            reconnect_base_delay: RECONNECT_BASE_DELAY,
            reconnect_max_delay: RECONNECT_MAX_DELAY,
            state_tx,
            cmd_rx,
        };
        let handle = WebSocketHandle { cmd_tx, state_rx };

        Ok((client, handle))
    }

    /// Override the reconnection delays.
    pub fn with_reconnect_delays(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_delay = base;
        self.reconnect_max_delay = max;
        self
    }

    /// Run the connection until closed or until a fatal error.
    ///
    /// The method drives the whole lifecycle: connect, dispatch incoming
    /// events to the handler, forward outgoing events, and reconnect with an
    /// exponential backoff when the connection is lost.
    pub async fn run<H>(mut self, mut handler: H) -> Result<(), WebSocketError>
    where
        H: WebSocketHandler,
    {
        let mut delay = self.reconnect_base_delay;
        let mut connected_once = false;
        let mut retrying = false;

        loop {
            self.state_tx.send_replace(if retrying {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            });

            log::debug!("Preparing websocket connection to {}", self.server_url);
            let mut request = self
                .server_url
                .as_str()
                .into_client_request()
                .map_err(|error| WebSocketError::Parameter(error.to_string()))?;

            if let Some(authorization) = &self.authorization {
                request
                    .headers_mut()
                    .insert(AUTHORIZATION, authorization.clone());
            }

            match connect_async(request).await {
                Ok((stream, _)) => {
                    log::info!("Websocket connected to server");
                    connected_once = true;
                    retrying = false;
                    delay = self.reconnect_base_delay;
                    self.state_tx.send_replace(ConnectionState::Connected);
                    handler.on_connected();

                    let (mut write, mut read) = stream.split();

                    let end = loop {
                        tokio::select! {
                            command = self.cmd_rx.recv() => match command {
                                Some(Command::Send(text)) => {
                                    if let Err(error) = write.send(Message::Text(text.into())).await {
                                        log::error!("Failed to send message: {}", error);
                                        break LoopEnd::Lost;
                                    }
                                }
                                Some(Command::Close) | None => {
                                    let _ = write.close().await;
                                    break LoopEnd::Closed;
                                }
                            },
                            frame = read.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    dispatch(&mut handler, text.as_str());
                                }
                                Some(Ok(Message::Close(_))) | None => break LoopEnd::Lost,
                                Some(Ok(_)) => {}
                                Some(Err(error)) => {
                                    log::error!("Websocket: {}", error);
                                    break LoopEnd::Lost;
                                }
                            },
                        }
                    };

                    match end {
                        LoopEnd::Closed => {
                            self.state_tx.send_replace(ConnectionState::Disconnected);
                            log::info!("Websocket disconnected from server");
                            return Ok(());
                        }
                        LoopEnd::Lost => {
                            log::error!("Websocket connection lost");
                            handler.on_connection_lost();
                        }
                    }
                }

                // the server answered the handshake with a plain HTTP error
                Err(tungstenite::Error::Http(response)) => {
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    return Err(WebSocketError::Authentication(response.status().as_u16()));
                }

                Err(error) if !connected_once => {
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    return Err(WebSocketError::Network(error.to_string()));
                }

                Err(error) => {
                    log::warn!("Unable to talk to the server: {}", error);
                }
            }

            retrying = true;
            self.state_tx.send_replace(ConnectionState::Reconnecting);
            log::warn!("Trying to reconnect in {} s", delay.as_secs());

            // the backoff sleep stays abortable by a close request
            let deadline = tokio::time::Instant::now() + delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    command = self.cmd_rx.recv() => match command {
                        Some(Command::Close) | None => {
                            self.state_tx.send_replace(ConnectionState::Disconnected);
                            log::info!("Websocket disconnected from server");
                            return Ok(());
                        }
                        Some(Command::Send(_)) => {
                            // nothing to send it on, drop it
                        }
                    },
                }
            }

            delay = (delay * 2).min(self.reconnect_max_delay);
        }
    }
}

fn dispatch<H>(handler: &mut H, text: &str)
where
    H: WebSocketHandler,
{
    match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => handler.on_message(&envelope.kind, envelope.data),
        Err(_) => {
            log::error!(
                "Unexpected message from the server: '{}'",
                display_message(text, 100)
            );
        }
    }
}
