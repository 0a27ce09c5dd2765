//! Application layer for wrp
//!
//! This crate contains the orchestrator use case, the tool registry,
//! port definitions and execution parameters. It depends only on the
//! domain layer.

pub mod config;
pub mod ports;
pub mod services;
pub mod use_cases;

// Re-export commonly used types
pub use config::ExecutionParams;
pub use ports::{
    conversation_logger::{ConversationEvent, ConversationLogger, NoConversationLogger},
    llm_adapter::{AdapterError, AdapterErrorKind, LlmAdapter},
    progress::{ConversationProgress, NoProgress},
    tool_server::{ToolServer, ToolServerError},
};
pub use services::{RegistryError, ResolvedTool, ToolRegistry};
pub use use_cases::orchestrator::{Orchestrator, OrchestratorError};
