//! Error types for the MCP client stack

use std::time::Duration;
use thiserror::Error;
use serde_json::Value;
use wrp_application::ports::tool_server::{ToolServerError, error_data_suffix};

/// Failures of the framed byte stream.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("stream ended before a complete frame was read")]
    UnexpectedEof,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("invalid frame header: {0}")]
    InvalidHeader(String),
}

/// A complete frame that is not acceptable JSON-RPC, or a message the
/// session did not expect in its current state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("malformed message: {detail}; raw: {raw}")]
    MalformedMessage { detail: String, raw: String },

    #[error("server offered unsupported protocol version '{0}'")]
    UnsupportedVersion(String),

    #[error("handshake violation: {0}")]
    HandshakeViolation(String),

    #[error("initialize rejected with error {code}: {message}")]
    InitializeRejected { code: i64, message: String },
}

/// Failures of a request on a protocol session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("session to server '{server}' is closed: {reason}")]
    Closed { server: String, reason: String },

    #[error("{method} to server '{server}' timed out after {}s (id={id})", .after.as_secs_f64())]
    Timeout {
        server: String,
        method: String,
        id: u64,
        after: Duration,
    },

    #[error("server '{server}' answered {method} (id={id}) with error {code}: {message}{}", error_data_suffix(.data.as_ref()))]
    Rpc {
        server: String,
        method: String,
        id: u64,
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("protocol error on server '{server}': {source}")]
    Protocol {
        server: String,
        #[source]
        source: ProtocolError,
    },

    #[error("transport to server '{server}' failed: {detail}")]
    Transport { server: String, detail: String },
}

impl SessionError {
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionError::Closed { .. })
    }
}

impl From<SessionError> for ToolServerError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Closed { server, reason } => ToolServerError::Closed { server, reason },
            SessionError::Transport { server, detail } => ToolServerError::Closed {
                server,
                reason: detail,
            },
            SessionError::Timeout {
                server,
                method,
                id,
                after,
            } => ToolServerError::Timeout {
                server,
                method,
                id,
                after,
            },
            SessionError::Rpc {
                server,
                method,
                id,
                code,
                message,
                data,
            } => ToolServerError::Rpc {
                server,
                method,
                id,
                code,
                message,
                data,
            },
            SessionError::Protocol { server, source } => ToolServerError::Protocol {
                server,
                detail: source.to_string(),
            },
        }
    }
}

/// Failures to launch or keep a server process alive.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("unknown server '{0}'")]
    UnknownServer(String),

    #[error("failed to launch server '{server}': {reason}")]
    LaunchFailure { server: String, reason: String },

    #[error("server '{server}' could not be restarted after {attempts} attempts")]
    RestartExhausted { server: String, attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_names_server_method_and_id() {
        let err = SessionError::Timeout {
            server: "Slurm".into(),
            method: "tools/call".into(),
            id: 12,
            after: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "tools/call to server 'Slurm' timed out after 1.5s (id=12)"
        );
    }

    #[test]
    fn test_transport_failure_maps_to_closed() {
        let err: ToolServerError = SessionError::Transport {
            server: "s".into(),
            detail: "broken pipe".into(),
        }
        .into();
        assert!(matches!(err, ToolServerError::Closed { .. }));
    }
}
