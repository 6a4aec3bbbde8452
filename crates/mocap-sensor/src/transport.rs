//! Transport seam for sensor connections.
//!
//! A [`Dialer`] opens one duplex text-message connection per sensor:
//! outbound command tokens go through the connection's sender, inbound
//! text frames and close/error notifications come back as [`LinkEvent`]s.
//! Production uses the WebSocket dialer; tests and hardware-free
//! development use [`MockDialer`].

use anyhow::Result;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Something the transport reported for an open connection.
#[derive(Debug)]
pub enum LinkEvent {
    /// One inbound text frame, delivered in arrival order.
    Frame(String),
    /// The peer closed the connection.
    Closed,
    /// The connection failed.
    Error(String),
}

/// An established duplex text-message connection.
pub struct Connection {
    /// Outbound text commands ("start", "calibrate").
    pub commands: mpsc::UnboundedSender<String>,
    /// Inbound events, ordered per connection.
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens connections to sensor endpoints.
pub trait Dialer: Send + Sync + 'static {
    /// Connect to `addr` (`host:port`). Resolves once the connection is
    /// open; lifecycle after that is reported through the connection's
    /// event stream.
    fn dial(&self, addr: String) -> BoxFuture<'static, Result<Connection>>;
}

/// WebSocket dialer: connects to `ws://<addr>` and maps text frames onto
/// the link events.
pub struct WsDialer;

impl Dialer for WsDialer {
    fn dial(&self, addr: String) -> BoxFuture<'static, Result<Connection>> {
        Box::pin(async move {
            let url = format!("ws://{addr}");
            let (socket, _response) = tokio_tungstenite::connect_async(&url).await?;
            let (mut sink, mut stream) = socket.split();

            let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
            let (event_tx, event_rx) = mpsc::unbounded_channel::<LinkEvent>();

            // Writer half: forward command tokens as text messages.
            tokio::spawn(async move {
                while let Some(command) = command_rx.recv().await {
                    if sink.send(Message::Text(command.into())).await.is_err() {
                        break;
                    }
                }
            });

            // Reader half: surface text frames and the close/error cause.
            tokio::spawn(async move {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(Message::Text(text)) => {
                            if event_tx.send(LinkEvent::Frame(text.to_string())).is_err() {
                                break;
                            }
                        }
                        Ok(Message::Close(_)) => {
                            let _ = event_tx.send(LinkEvent::Closed);
                            break;
                        }
                        // Pings are answered by tungstenite itself; the
                        // sensors never send binary frames.
                        Ok(_) => {}
                        Err(e) => {
                            let _ = event_tx.send(LinkEvent::Error(e.to_string()));
                            break;
                        }
                    }
                }
            });

            Ok(Connection {
                commands: command_tx,
                events: event_rx,
            })
        })
    }
}

/// Peer half of a mock connection: what the fake sensor sees.
pub struct MockPeer {
    /// Push inbound events toward the session (frames, close, error).
    pub events: mpsc::UnboundedSender<LinkEvent>,
    /// Commands the session sent to the sensor.
    pub commands: mpsc::UnboundedReceiver<String>,
}

/// In-memory dialer: each address must be registered up front with
/// [`MockDialer::add_peer`]; dialing an unregistered address fails like a
/// refused connection.
#[derive(Default)]
pub struct MockDialer {
    pending: Mutex<HashMap<String, Connection>>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer for `addr` and return its far end.
    pub fn add_peer(&self, addr: &str) -> MockPeer {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        self.pending.lock().unwrap().insert(
            addr.to_string(),
            Connection {
                commands: command_tx,
                events: event_rx,
            },
        );

        MockPeer {
            events: event_tx,
            commands: command_rx,
        }
    }
}

impl Dialer for MockDialer {
    fn dial(&self, addr: String) -> BoxFuture<'static, Result<Connection>> {
        let conn = self.pending.lock().unwrap().remove(&addr);
        Box::pin(async move {
            conn.ok_or_else(|| anyhow::anyhow!("connection refused: no peer at {addr}"))
        })
    }
}
