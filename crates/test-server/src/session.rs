//! Per-connection reply machine.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use retether_protocol::Reply;
use retether_protocol::constants::kind;

use crate::ServerError;

/// Identity a connection presented during the handshake.
#[derive(Debug, Clone)]
pub(crate) struct Identity {
    pub(crate) authenticated: bool,
    pub(crate) username: String,
}

impl Identity {
    /// Computes the reply for one inbound text frame. Unknown kinds get
    /// an acknowledgment, undecodable frames an error reply; the
    /// connection stays open either way.
    fn reply_to(&self, text: &str) -> Reply {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => return Reply::error("Invalid JSON format"),
        };
        let Some(request) = value.as_object() else {
            return Reply::error("Error processing message: expected a JSON object");
        };

        let message_kind = request
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("message");
        let message = request.get("message").map(field_text).unwrap_or_default();

        match message_kind {
            kind::ECHO => Reply::echo_response(format!("Echo: {message}")),
            kind::PING => Reply::pong("Pong!"),
            kind::TEST_AUTH => {
                if self.authenticated {
                    Reply::auth_ok(&self.username, 1)
                } else {
                    Reply::auth_denied("User not authenticated")
                }
            }
            _ => Reply::message_received(format!("Received: {message}")),
        }
    }
}

/// One accepted connection.
pub(crate) struct ClientSession {
    socket: WebSocketStream<TcpStream>,
    identity: Identity,
    peer: String,
}

impl ClientSession {
    pub(crate) fn new(socket: WebSocketStream<TcpStream>, identity: Identity, peer: String) -> Self {
        Self {
            socket,
            identity,
            peer,
        }
    }

    /// Greets the client, then answers requests until the connection
    /// closes or the server shuts down.
    pub(crate) async fn run(mut self, cancel: CancellationToken) -> Result<(), ServerError> {
        self.send_reply(&Reply::connection_established(
            "WebSocket connection established successfully!",
        ))
        .await?;
        self.send_reply(&Reply::welcome(
            "Welcome to the Retether WebSocket test server!",
            vec![
                "Echo responses".to_string(),
                "Ping/pong probes".to_string(),
                "Auth status checks".to_string(),
            ],
        ))
        .await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("session {} closing: server shutdown", self.peer);
                    let _ = self.socket.close(None).await;
                    break;
                }

                frame = self.socket.next() => {
                    match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            let reply = self.identity.reply_to(&text);
                            self.send_reply(&reply).await?;
                        }
                        Some(Ok(tungstenite::Message::Ping(data))) => {
                            trace!("session {} ping", self.peer);
                            let _ = self.socket.send(tungstenite::Message::Pong(data)).await;
                        }
                        Some(Ok(tungstenite::Message::Close(_))) => {
                            debug!("session {} closed by peer", self.peer);
                            let _ = self.socket.close(None).await;
                            break;
                        }
                        // Binary and pong frames are ignored.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("session {} read error: {}", self.peer, e);
                            break;
                        }
                        None => {
                            debug!("session {} stream ended", self.peer);
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ServerError> {
        let json = serde_json::to_string(reply)?;
        self.socket
            .send(tungstenite::Message::Text(json.into()))
            .await?;
        Ok(())
    }
}

/// Renders a message field the way it appears interpolated into a
/// reply string: strings verbatim, other values as JSON.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
