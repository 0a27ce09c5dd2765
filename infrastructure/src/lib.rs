//! Infrastructure layer for wrp
//!
//! This crate contains the adapters that implement the ports defined in
//! the application layer: the MCP client stack (transport, sessions,
//! process supervision), the LLM backends, configuration loading and the
//! JSONL transcript logger.

pub mod config;
pub mod logging;
pub mod mcp;
pub mod providers;

// Re-export commonly used types
pub use config::{ConfigLoadError, ConfigLoader, ConfigValidationError, FileConfig, GatewayConfig};
pub use logging::JsonlConversationLogger;
pub use mcp::{
    ConnectReport, Framing, Gateway, GatewayError, McpSession, McpToolServer, ProcessSupervisor, ServerResolver,
    ServerSpec, ServerStatus, SessionOptions, SupervisorOptions, Transport,
};
pub use providers::{build_adapter, build_adapter_with};
