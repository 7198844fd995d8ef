//! Client configuration.

use std::time::Duration;

use url::Url;

use retether_protocol::constants::TOKEN_QUERY_PARAM;

use crate::error::ClientError;

/// Bounded fixed-interval reconnect policy.
///
/// Every retry waits the same `interval`; the delay does not grow.
/// `max_attempts` caps consecutive failures, and a successful open
/// resets the count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed before the manager stays disconnected.
    pub max_attempts: u32,
    /// Fixed delay between a loss and the next attempt.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(3),
        }
    }
}

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server endpoint. Accepts http(s) or ws(s) URLs; http schemes are
    /// mapped to their WebSocket equivalents at connect time.
    pub endpoint: String,
    /// Reconnect policy applied after abnormal closures.
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Config for the given endpoint with the default retry policy.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Builds the handshake URL: maps the scheme to ws/wss and appends
    /// the token as a percent-encoded query parameter.
    pub fn connect_url(&self, token: &str) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.endpoint)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ClientError::UnsupportedScheme(other.to_string())),
        };
        if url.set_scheme(scheme).is_err() {
            return Err(ClientError::UnsupportedScheme(scheme.to_string()));
        }
        url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        Ok(url)
    }
}
