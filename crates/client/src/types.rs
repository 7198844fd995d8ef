//! Public types describing the connection as observed by callers.

use serde_json::Value;

/// Lifecycle state of the managed socket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no retry pending.
    #[default]
    Disconnected,
    /// WebSocket handshake in progress.
    Connecting,
    /// Socket open and delivering messages.
    Connected,
    /// Connection lost, a retry timer is armed. `attempt` counts
    /// consecutive failures since the last successful open.
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    /// True while the socket is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// True while a handshake is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }
}

/// Snapshot of the connection published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Most recent successfully decoded inbound payload.
    pub last_message: Option<Value>,
    /// Description of the most recent failure. Cleared when a connect
    /// starts and again when a socket opens.
    pub last_error: Option<String>,
}

impl Status {
    /// True while the socket is open.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// True while a handshake is in progress.
    pub fn is_connecting(&self) -> bool {
        self.state.is_connecting()
    }
}
