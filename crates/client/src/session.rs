//! Connection state machine.
//!
//! [`Session`] owns everything the driver mutates in response to socket
//! events: lifecycle state, retry accounting, the last payload and the
//! last error. It performs no I/O, which keeps every transition
//! unit-testable.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use retether_protocol::constants::is_normal_closure;

use crate::config::RetryPolicy;
use crate::consumer::Consumer;
use crate::error::ClientError;
use crate::types::{ConnectionState, Status};

/// A socket-level occurrence. The transport produces `Opened`, then any
/// number of `Received`, then exactly one `Closed` per connection;
/// `Failed` may precede `Closed` when the transport errors out.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SocketEvent {
    /// Handshake completed, socket open.
    Opened,
    /// A text frame arrived.
    Received(String),
    /// The socket closed. `code` is 1006 when the transport dropped
    /// without a close frame.
    Closed { code: u16, reason: String },
    /// Transport failure, described for the consumer.
    Failed(String),
}

pub(crate) struct Session<C: Consumer> {
    state: ConnectionState,
    attempts: u32,
    retry: RetryPolicy,
    last_message: Option<Value>,
    last_error: Option<String>,
    consumer: C,
}

impl<C: Consumer> Session<C> {
    pub(crate) fn new(retry: RetryPolicy, consumer: C) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            retry,
            last_message: None,
            last_error: None,
            consumer,
        }
    }

    /// Current snapshot for the status channel.
    pub(crate) fn status(&self) -> Status {
        Status {
            state: self.state.clone(),
            last_message: self.last_message.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Marks the start of a handshake.
    pub(crate) fn begin_connect(&mut self) {
        debug!("connecting");
        self.state = ConnectionState::Connecting;
        self.last_error = None;
    }

    /// Records a failure that happened before any socket existed, such
    /// as a missing credential or a bad endpoint. No consumer callbacks
    /// fire. Returns the delay before the next attempt, if any remain.
    pub(crate) fn fail_connect(&mut self, err: &ClientError) -> Option<Duration> {
        warn!("connect failed: {}", err);
        self.last_error = Some(err.to_string());
        if self.attempts < self.retry.max_attempts {
            Some(self.schedule_retry())
        } else {
            self.state = ConnectionState::Disconnected;
            None
        }
    }

    /// Resets to `Disconnected` after a manual disconnect that found no
    /// open socket, only a pending handshake or an armed retry timer.
    pub(crate) fn manual_disconnect(&mut self) {
        debug!("manual disconnect");
        self.state = ConnectionState::Disconnected;
    }

    /// Records an operation failure without a state transition.
    pub(crate) fn record_error(&mut self, err: &ClientError) {
        warn!("operation failed: {}", err);
        self.last_error = Some(err.to_string());
    }

    /// Applies one socket event. Returns the delay before the next
    /// reconnect attempt when one should be scheduled.
    pub(crate) fn apply(&mut self, event: SocketEvent) -> Option<Duration> {
        match event {
            SocketEvent::Opened => {
                info!("WebSocket connected");
                self.state = ConnectionState::Connected;
                self.last_error = None;
                self.attempts = 0;
                self.consumer.on_open();
                None
            }
            SocketEvent::Received(text) => {
                match serde_json::from_str::<Value>(&text) {
                    Ok(payload) => {
                        trace!("message received ({} bytes)", text.len());
                        self.last_message = Some(payload.clone());
                        self.consumer.on_message(&payload);
                    }
                    Err(e) => {
                        let err = ClientError::MalformedMessage(e);
                        warn!("dropping inbound frame: {}", err);
                        self.last_error = Some(err.to_string());
                    }
                }
                None
            }
            SocketEvent::Closed { code, reason } => {
                info!("WebSocket disconnected: code {} ({})", code, reason);
                self.state = ConnectionState::Disconnected;
                self.consumer.on_close();
                if !is_normal_closure(code) && self.attempts < self.retry.max_attempts {
                    Some(self.schedule_retry())
                } else {
                    None
                }
            }
            SocketEvent::Failed(description) => {
                warn!("WebSocket error: {}", description);
                self.last_error = Some(description.clone());
                self.consumer.on_error(&description);
                None
            }
        }
    }

    /// Counts the attempt and enters the reconnect-pending state.
    fn schedule_retry(&mut self) -> Duration {
        self.attempts += 1;
        info!(
            "scheduling reconnect attempt {}/{}",
            self.attempts, self.retry.max_attempts
        );
        self.state = ConnectionState::Reconnecting {
            attempt: self.attempts,
        };
        self.retry.interval
    }
}
