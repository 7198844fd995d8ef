//! Reconnecting WebSocket client with token authentication.
//!
//! [`ConnectionManager`] owns a driver task that holds the socket,
//! delivers inbound payloads to a [`Consumer`], and re-establishes
//! dropped connections with bounded fixed-interval retries.

pub mod config;
pub mod consumer;
pub mod credentials;
mod driver;
pub mod error;
pub mod manager;
mod session;
pub mod types;

// Re-export primary types for convenience.
pub use config::{ClientConfig, RetryPolicy};
pub use consumer::Consumer;
pub use credentials::{CredentialSource, StaticToken, TokenFile, default_token_path};
pub use error::ClientError;
pub use manager::ConnectionManager;
pub use types::{ConnectionState, Status};
