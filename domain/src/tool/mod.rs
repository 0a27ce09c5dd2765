//! Tool domain module
//!
//! Tools are offered by MCP servers and invoked on behalf of the LLM.
//! This module holds the server-independent view of them:
//!
//! ```text
//! raw tools/list entry ──normalize_tool──▶ ToolDescriptor
//!                                              │
//! LLM proposal ──────────────────────▶ ToolCall ─┼─validate_arguments─▶ dispatch
//!                                              │
//!                                   ToolOutput ◀┘
//! ```
//!
//! # Naming
//!
//! A tool is identified by `(server, name)`. Its qualified form
//! `<server>__<name>` (see [`qualify`]) is what the LLM sees whenever the
//! bare name collides across servers. Qualified names are sanitized to a
//! valid function name, so they are matched, never parsed.

pub mod entities;
pub mod schema;
pub mod validation;
pub mod value_objects;

pub use entities::{
    AdvertisedTool, MAX_TOOL_NAME_LEN, ParamType, QUALIFIED_SEPARATOR, ToolCall, ToolDescriptor,
    ToolParameter, qualify,
};
pub use schema::{SchemaError, normalize_tool, normalize_tools};
pub use validation::{ArgumentError, validate_arguments};
pub use value_objects::{ToolFailure, ToolOutput};
