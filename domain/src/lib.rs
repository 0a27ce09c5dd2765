//! Domain layer for wrp
//!
//! This crate contains the entities and value objects shared by every
//! other layer. It performs no I/O.
//!
//! # Core Concepts
//!
//! ## Tools
//!
//! MCP servers advertise tools in loosely-specified JSON Schema dialects.
//! [`normalize_tool`] turns each entry into a [`ToolDescriptor`] with
//! typed [`ToolParameter`]s, and [`validate_arguments`] checks an LLM's
//! [`ToolCall`] against it before dispatch.
//!
//! ## Conversation
//!
//! An append-only [`Conversation`] of [`Turn`]s. Adapters translate it to
//! their backend's wire format and answer with an [`AdapterReply`].
//!
//! ## Providers
//!
//! [`ProviderKind`] is the closed set of supported LLM backends and
//! [`ProviderConfig`] the immutable settings for one of them.

pub mod conversation;
pub mod core;
pub mod provider;
pub mod tool;

// Re-export commonly used types
pub use conversation::{AdapterReply, Conversation, ToolResultTurn, Turn};
pub use core::{error::DomainError, string::preview};
pub use provider::{Credential, ProviderConfig, ProviderKind, ProviderOptions};
pub use tool::{
    AdvertisedTool, ArgumentError, ParamType, SchemaError, ToolCall, ToolDescriptor, ToolFailure, ToolOutput,
    ToolParameter, normalize_tool, normalize_tools, qualify, validate_arguments,
};
