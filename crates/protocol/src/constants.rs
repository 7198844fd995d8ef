/// Normal closure, sent when a side shuts the connection down deliberately.
pub const CLOSE_NORMAL: u16 = 1000;

/// Abnormal closure: the transport dropped without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Returns true when a close code marks a clean, deliberate shutdown.
///
/// Everything except 1000 counts as unexpected and is eligible for
/// reconnection on the client side.
pub fn is_normal_closure(code: u16) -> bool {
    code == CLOSE_NORMAL
}

/// Query parameter carrying the auth token during the WebSocket handshake.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Maximum inbound text message size in bytes (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Well-known message kinds understood by the test server.
///
/// The set is open: the client sends whatever kind the caller picks, and
/// the server answers unknown kinds with a generic `message_received`.
pub mod kind {
    /// Echoed back as `echo_response`.
    pub const ECHO: &str = "echo";
    /// Answered with `pong`.
    pub const PING: &str = "ping";
    /// Answered with `auth_status`.
    pub const TEST_AUTH: &str = "test_auth";
}
