use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope for outbound client messages.
///
/// The shape the test server dispatches on: a free-form `type`
/// discriminator, a human-readable `message`, and an RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Creates an envelope stamped with the current time.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Serializes the envelope into a JSON value.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
