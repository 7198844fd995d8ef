//! Driver task owning the socket, the retry timer and the state machine.
//!
//! All mutable connection state lives here. The select loop processes
//! one event to completion at a time, so consumer callbacks never
//! overlap and the session needs no locking. At most one of the socket,
//! a pending handshake and an armed retry timer exists at any moment.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use retether_protocol::Envelope;
use retether_protocol::constants::{CLOSE_ABNORMAL, CLOSE_NORMAL, MAX_MESSAGE_SIZE};

use crate::config::ClientConfig;
use crate::consumer::Consumer;
use crate::credentials::CredentialSource;
use crate::error::ClientError;
use crate::session::{Session, SocketEvent};
use crate::types::Status;

/// Close reason sent on caller-initiated disconnects.
const MANUAL_DISCONNECT_REASON: &str = "Manual disconnect";

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type ConnectFuture = Pin<Box<dyn Future<Output = Result<WsStream, tungstenite::Error>> + Send>>;

/// Commands accepted from the manager handle.
pub(crate) enum Command {
    Connect,
    Disconnect,
    Send(Value),
    SendEnvelope(Envelope),
    Shutdown,
}

pub(crate) struct Driver<C: Consumer> {
    config: ClientConfig,
    credentials: Arc<dyn CredentialSource>,
    session: Session<C>,
    commands: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<Status>,
    socket: Option<WsStream>,
    handshake: Option<ConnectFuture>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl<C: Consumer> Driver<C> {
    pub(crate) fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialSource>,
        consumer: C,
        commands: mpsc::UnboundedReceiver<Command>,
        status_tx: watch::Sender<Status>,
    ) -> Self {
        let session = Session::new(config.retry.clone(), consumer);
        Self {
            config,
            credentials,
            session,
            commands,
            status_tx,
            socket: None,
            handshake: None,
            retry: None,
        }
    }

    /// Runs until shutdown or until the manager handle is dropped.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let keep_running = match command {
                        Some(command) => self.handle_command(command).await,
                        // Handle dropped.
                        None => false,
                    };
                    if !keep_running {
                        break;
                    }
                }

                result = poll_handshake(&mut self.handshake), if self.handshake.is_some() => {
                    self.handshake = None;
                    self.finish_handshake(result);
                }

                frame = next_frame(&mut self.socket), if self.socket.is_some() => {
                    self.handle_frame(frame).await;
                }

                () = wait_retry(&mut self.retry), if self.retry.is_some() => {
                    self.retry = None;
                    debug!("retry timer fired");
                    self.start_connect();
                }
            }
        }
        debug!("driver stopped");
    }

    /// Returns `false` when the driver should exit.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => {
                // A manual connect supersedes any scheduled retry.
                self.retry = None;
                if self.socket.is_some() {
                    debug!("connect ignored: already connected");
                } else if self.handshake.is_some() {
                    debug!("connect ignored: handshake in progress");
                } else {
                    self.start_connect();
                }
            }
            Command::Disconnect => self.disconnect().await,
            Command::Send(payload) => self.transmit(&payload).await,
            Command::SendEnvelope(envelope) => self.transmit(&envelope).await,
            Command::Shutdown => {
                self.disconnect().await;
                return false;
            }
        }
        true
    }

    /// Begins a connect: resolves the credential, builds the URL and
    /// starts the handshake. Pre-socket failures go through the retry
    /// policy without firing consumer callbacks.
    fn start_connect(&mut self) {
        self.session.begin_connect();
        match self.connect_request() {
            Ok(url) => {
                debug!("starting WebSocket handshake with {}", self.config.endpoint);
                self.handshake = Some(open_socket(url));
            }
            Err(err) => {
                if let Some(delay) = self.session.fail_connect(&err) {
                    self.arm_retry(delay);
                }
            }
        }
        self.publish_status();
    }

    /// Resolves the credential and produces the handshake URL. The URL
    /// carries the token, so it is never logged.
    fn connect_request(&self) -> Result<String, ClientError> {
        let token = self
            .credentials
            .token()
            .ok_or(ClientError::MissingCredential)?;
        let url = self.config.connect_url(&token)?;
        Ok(url.into())
    }

    fn finish_handshake(&mut self, result: Result<WsStream, tungstenite::Error>) {
        match result {
            Ok(stream) => {
                self.socket = Some(stream);
                self.dispatch(SocketEvent::Opened);
            }
            Err(e) => {
                // Failed connects surface as an error event followed by
                // an abnormal close, which drives the retry schedule.
                let description = ClientError::Ws(e).to_string();
                self.dispatch(SocketEvent::Failed(description));
                self.dispatch(SocketEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: String::new(),
                });
            }
        }
    }

    /// Handles one frame, or stream termination, from the open socket.
    async fn handle_frame(
        &mut self,
        frame: Option<Result<tungstenite::Message, tungstenite::Error>>,
    ) {
        match frame {
            Some(Ok(tungstenite::Message::Text(text))) => {
                self.dispatch(SocketEvent::Received(text.to_string()));
            }
            Some(Ok(tungstenite::Message::Ping(data))) => {
                trace!("received ping, sending pong");
                if let Some(socket) = self.socket.as_mut() {
                    let _ = socket.send(tungstenite::Message::Pong(data)).await;
                }
            }
            Some(Ok(tungstenite::Message::Close(frame))) => {
                let (code, reason) = match frame {
                    Some(f) => (u16::from(f.code), f.reason.to_string()),
                    None => (CLOSE_ABNORMAL, String::new()),
                };
                self.socket = None;
                self.dispatch(SocketEvent::Closed { code, reason });
            }
            // Binary and pong frames are ignored.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                self.socket = None;
                let description = ClientError::Ws(e).to_string();
                self.dispatch(SocketEvent::Failed(description));
                self.dispatch(SocketEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: String::new(),
                });
            }
            None => {
                // Stream ended without a close frame.
                self.socket = None;
                self.dispatch(SocketEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: String::new(),
                });
            }
        }
    }

    /// Caller-initiated disconnect: cancels the retry timer and any
    /// pending handshake, and closes an open socket with code 1000.
    async fn disconnect(&mut self) {
        self.retry = None;
        self.handshake = None;
        if let Some(mut socket) = self.socket.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: MANUAL_DISCONNECT_REASON.into(),
            };
            let _ = socket.send(tungstenite::Message::Close(Some(frame))).await;
            self.dispatch(SocketEvent::Closed {
                code: CLOSE_NORMAL,
                reason: MANUAL_DISCONNECT_REASON.to_string(),
            });
        } else {
            self.session.manual_disconnect();
            self.publish_status();
        }
    }

    /// Serializes one payload and writes it to the open socket. Failures
    /// land in the status snapshot; nothing is queued for later.
    async fn transmit<T: serde::Serialize>(&mut self, payload: &T) {
        let Some(socket) = self.socket.as_mut() else {
            self.session.record_error(&ClientError::NotConnected);
            self.publish_status();
            return;
        };
        match serde_json::to_string(payload) {
            Ok(json) => {
                trace!("sending {} bytes", json.len());
                if let Err(e) = socket.send(tungstenite::Message::Text(json.into())).await {
                    self.session.record_error(&ClientError::SendFailed(e));
                }
            }
            Err(e) => self.session.record_error(&ClientError::Encode(e)),
        }
        self.publish_status();
    }

    /// Applies one event and arms the retry timer when asked to.
    fn dispatch(&mut self, event: SocketEvent) {
        if let Some(delay) = self.session.apply(event) {
            self.arm_retry(delay);
        }
        self.publish_status();
    }

    fn arm_retry(&mut self, delay: std::time::Duration) {
        self.retry = Some(Box::pin(tokio::time::sleep(delay)));
    }

    fn publish_status(&self) {
        let _ = self.status_tx.send(self.session.status());
    }
}

/// Opens the socket with the shared message size limits applied.
fn open_socket(url: String) -> ConnectFuture {
    Box::pin(async move {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(MAX_MESSAGE_SIZE);
        let (stream, _response) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        Ok(stream)
    })
}

// The select arms below pair an `is_some` precondition with a helper
// that pends forever on `None`. The precondition keeps the arm from
// being polled at all; the pending branch is the type-level fallback.

async fn poll_handshake(
    handshake: &mut Option<ConnectFuture>,
) -> Result<WsStream, tungstenite::Error> {
    match handshake {
        Some(fut) => fut.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_frame(
    socket: &mut Option<WsStream>,
) -> Option<Result<tungstenite::Message, tungstenite::Error>> {
    match socket {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
