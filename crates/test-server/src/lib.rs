//! Local WebSocket server with echo, ping and auth-probe semantics.
//!
//! Accepts any number of concurrent connections, greets each one, and
//! answers typed JSON requests. Connections presenting the configured
//! token (query parameter or bearer header) are treated as
//! authenticated for the `test_auth` probe; everything else still
//! works unauthenticated.

mod server;
mod session;

pub use server::{TestServer, TestServerConfig};

/// Errors produced by the test server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
