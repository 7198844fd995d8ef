//! Callback interface for connection lifecycle events.

use serde_json::Value;

/// Receives lifecycle events and decoded inbound payloads.
///
/// Every method has a default no-op body so implementors only override
/// the events they care about. Callbacks run on the driver task, one at
/// a time, in the order the events occurred; they should return quickly
/// to avoid stalling the socket.
pub trait Consumer: Send + Sync + 'static {
    /// The socket opened, on the initial connect or any reconnect.
    fn on_open(&self) {}

    /// A payload arrived and decoded successfully.
    fn on_message(&self, payload: &Value) {
        let _ = payload;
    }

    /// The socket closed, for any reason.
    fn on_close(&self) {}

    /// The transport failed; `description` is human-readable.
    fn on_error(&self, description: &str) {
        let _ = description;
    }
}

/// No-op consumer for callers that only poll the status snapshot.
impl Consumer for () {}
