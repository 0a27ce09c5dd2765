//! Server directory port for the chat loop.

use async_trait::async_trait;

/// One row of `/servers`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSummary {
    pub name: String,
    /// Session state (`ready`, `closed`, ...) or `not connected`
    pub state: String,
    /// Process health as reported by the supervisor
    pub process: String,
    pub session_id: Option<u64>,
    /// Cached tool count, if discovery has run
    pub tools: Option<usize>,
    /// Why the session closed, if it did
    pub detail: Option<String>,
}

impl ServerSummary {
    pub fn is_ready(&self) -> bool {
        self.state == "ready"
    }
}

/// What the chat loop needs from the connection manager.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    fn summaries(&self) -> Vec<ServerSummary>;

    /// Reconnect every server whose session has closed.
    ///
    /// Returns `(server, error)` for each reconnect that failed.
    async fn reconnect_closed(&self) -> Vec<(String, String)>;
}
