//! Credential lookup for authenticated connections.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Supplies the auth token presented during the WebSocket handshake.
///
/// Lookups are synchronous and happen on every connect attempt, so a
/// rotated credential is picked up by the next retry without restarting
/// the manager. `None` means no credential is currently available; the
/// manager records an error and keeps retrying.
pub trait CredentialSource: Send + Sync {
    /// Returns the current token, if any.
    fn token(&self) -> Option<String>;
}

/// Fixed token, handy for tests and one-shot tools.
#[derive(Debug, Clone)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    /// Source that always yields the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Source with no credential.
    pub fn missing() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Token stored as plain text in a file, re-read on every lookup.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialSource for TokenFile {
    fn token(&self) -> Option<String> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                debug!("token file {:?} unreadable: {}", self.path, e);
                return None;
            }
        };
        let token = data.trim();
        if token.is_empty() {
            return None;
        }
        Some(token.to_string())
    }
}

/// Returns the default token file path.
pub fn default_token_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("retether").join("token"))
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
