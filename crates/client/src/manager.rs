//! Public handle for the connection driver.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::info;

use retether_protocol::Envelope;

use crate::config::ClientConfig;
use crate::consumer::Consumer;
use crate::credentials::CredentialSource;
use crate::driver::{Command, Driver};
use crate::types::{ConnectionState, Status};

/// Owns the driver task and exposes the connection operations.
///
/// Methods never block: they enqueue commands for the driver, which
/// owns the socket and applies them one at a time. Dropping the manager
/// aborts the driver and the connection with it.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<Status>,
    driver: tokio::task::JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawns the driver task for the given endpoint, credential source
    /// and consumer. No connection is attempted until [`connect`].
    ///
    /// [`connect`]: Self::connect
    pub fn new<C: Consumer>(
        config: ClientConfig,
        credentials: Arc<dyn CredentialSource>,
        consumer: C,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Status::default());
        let driver = Driver::new(config, credentials, consumer, commands_rx, status_tx);
        let handle = tokio::spawn(driver.run());
        info!("connection manager started");
        Self {
            commands,
            status_rx,
            driver: handle,
        }
    }

    /// Requests a connection. No-op while a socket is open or a
    /// handshake is in flight; a pending retry timer is cancelled in
    /// favor of connecting immediately.
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Closes the connection with code 1000 and cancels any pending
    /// retry. Safe to call in any state.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Sends a JSON payload over the open socket. When disconnected the
    /// failure lands in [`Status::last_error`]; nothing is queued.
    pub fn send(&self, payload: Value) {
        let _ = self.commands.send(Command::Send(payload));
    }

    /// Wraps `message` in the standard timestamped envelope and sends it.
    pub fn send_text(&self, kind: impl Into<String>, message: impl Into<String>) {
        let _ = self
            .commands
            .send(Command::SendEnvelope(Envelope::new(kind, message)));
    }

    /// Returns the current status snapshot.
    pub fn status(&self) -> Status {
        self.status_rx.borrow().clone()
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state.clone()
    }

    /// Returns a receiver that observes every status change.
    pub fn status_receiver(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }

    /// Disconnects cleanly and stops the driver task.
    pub fn shutdown(&self) {
        info!("connection manager shutting down");
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
