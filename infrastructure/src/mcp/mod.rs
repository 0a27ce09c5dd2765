//! MCP client stack
//!
//! ```text
//! Gateway ─┬─ ProcessSupervisor ── ServerResolver
//!          │        │ spawn
//!          │        ▼
//!          │    Transport (framing) ── child stdio
//!          │        │
//!          └─ McpSession (handshake, correlation) ── McpToolServer ──▶ ToolRegistry
//! ```

pub mod error;
pub mod gateway;
pub mod protocol;
pub mod resolver;
pub mod session;
pub mod supervisor;
pub mod tool_server;
pub mod transport;

pub use error::{ProtocolError, SessionError, SupervisorError, TransportError};
pub use gateway::{ConnectReport, Gateway, GatewayError, ServerStatus};
pub use resolver::{LaunchSpec, ServerResolver, ServerSpec};
pub use session::{McpSession, ServerNotification, SessionOptions, SessionState};
pub use supervisor::{ProcessHealth, ProcessSupervisor, SupervisorOptions};
pub use tool_server::McpToolServer;
pub use transport::{Framing, Transport};
