//! Error types for the connection manager.

use tokio_tungstenite::tungstenite;

/// Failures surfaced through the status snapshot.
///
/// The driver never panics on these. Each one is recorded as a
/// human-readable string in [`Status::last_error`], and transport
/// failures are additionally reported through [`Consumer::on_error`].
///
/// [`Status::last_error`]: crate::types::Status::last_error
/// [`Consumer::on_error`]: crate::consumer::Consumer::on_error
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The credential source had no token at connect time.
    #[error("no authentication token found")]
    MissingCredential,

    /// The configured endpoint is not a valid URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// The endpoint scheme has no WebSocket mapping.
    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    /// Transport failure during the handshake or a read.
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    /// An inbound text frame was not valid JSON.
    #[error("failed to parse message: {0}")]
    MalformedMessage(#[source] serde_json::Error),

    /// A send was attempted without an open socket.
    #[error("WebSocket not connected")]
    NotConnected,

    /// An outbound payload could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// An outbound frame could not be written.
    #[error("failed to send message: {0}")]
    SendFailed(#[source] tungstenite::Error),
}
