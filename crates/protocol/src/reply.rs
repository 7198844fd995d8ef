use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Replies emitted by the test server, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Reply {
    #[serde(rename = "connection_established")]
    ConnectionEstablished {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Greeting sent right after `connection_established`. Carries no
    /// timestamp on the wire.
    #[serde(rename = "welcome")]
    Welcome {
        message: String,
        features: Vec<String>,
    },
    #[serde(rename = "echo_response")]
    EchoResponse {
        message: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "pong")]
    Pong {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Outcome of a `test_auth` probe. Carries the username and user id
    /// when authenticated, an explanatory message otherwise.
    #[serde(rename = "auth_status")]
    AuthStatus {
        authenticated: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename = "message_received")]
    MessageReceived {
        message: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl Reply {
    /// Builds a `connection_established` reply stamped with the current time.
    pub fn connection_established(message: impl Into<String>) -> Self {
        Self::ConnectionEstablished {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds a `welcome` reply.
    pub fn welcome(message: impl Into<String>, features: Vec<String>) -> Self {
        Self::Welcome {
            message: message.into(),
            features,
        }
    }

    /// Builds an `echo_response` stamped with the current time.
    pub fn echo_response(message: impl Into<String>) -> Self {
        Self::EchoResponse {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds a `pong` stamped with the current time.
    pub fn pong(message: impl Into<String>) -> Self {
        Self::Pong {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds an `auth_status` for an authenticated user.
    pub fn auth_ok(username: impl Into<String>, user_id: i64) -> Self {
        Self::AuthStatus {
            authenticated: true,
            username: Some(username.into()),
            user_id: Some(user_id),
            message: None,
        }
    }

    /// Builds an `auth_status` for an unauthenticated connection.
    pub fn auth_denied(message: impl Into<String>) -> Self {
        Self::AuthStatus {
            authenticated: false,
            username: None,
            user_id: None,
            message: Some(message.into()),
        }
    }

    /// Builds a `message_received` stamped with the current time.
    pub fn message_received(message: impl Into<String>) -> Self {
        Self::MessageReceived {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds an `error` reply stamped with the current time.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
