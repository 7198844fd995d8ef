//! WebSocket test server.
//!
//! Listens on a TCP port, upgrades connections to WebSocket, and runs
//! one [`ClientSession`] per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_util::sync::CancellationToken;

use retether_protocol::constants::{MAX_MESSAGE_SIZE, TOKEN_QUERY_PARAM};

use crate::ServerError;
use crate::session::{ClientSession, Identity};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct TestServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Token that marks a connection as authenticated. `None` means no
    /// connection ever authenticates.
    pub token: Option<String>,
    /// Username reported to authenticated connections.
    pub username: String,
}

impl Default for TestServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            token: None,
            username: "testuser".to_string(),
        }
    }
}

/// The WebSocket test server.
///
/// Accepts every connection; the configured token only decides what
/// the `test_auth` probe reports.
pub struct TestServer {
    config: TestServerConfig,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl TestServer {
    pub fn new(config: TestServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`] binds the socket.
    ///
    /// [`run`]: Self::run
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Gracefully shuts down the server and all open sessions.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let addr: SocketAddr = ([127, 0, 0, 1], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("test server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("test server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::warn!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Upgrades one TCP connection and runs its session to completion.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(MAX_MESSAGE_SIZE);

        // The token arrives during the HTTP upgrade, so it has to be
        // captured from the handshake callback.
        let mut presented: Option<String> = None;
        let callback = |request: &Request, response: Response| {
            presented = extract_token(request);
            Ok(response)
        };
        let ws_stream = accept_hdr_async_with_config(stream, callback, Some(ws_config)).await?;
        tracing::info!(%peer_addr, "WebSocket connection established");

        let authenticated = match (&self.config.token, presented) {
            (Some(expected), Some(given)) => *expected == given,
            _ => false,
        };
        let identity = Identity {
            authenticated,
            username: self.config.username.clone(),
        };
        let session = ClientSession::new(ws_stream, identity, peer_addr.to_string());
        session.run(self.cancel.clone()).await
    }
}

/// Pulls the auth token out of an upgrade request: the `token` query
/// parameter, with an `Authorization: Bearer` header as fallback.
fn extract_token(request: &Request) -> Option<String> {
    if let Some(query) = request.uri().query() {
        let token = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == TOKEN_QUERY_PARAM)
            .map(|(_, value)| value.into_owned());
        if token.is_some() {
            return token;
        }
    }
    request
        .headers()
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}
