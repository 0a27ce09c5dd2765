//! Application services shared by use cases.

pub mod tool_registry;

pub use tool_registry::{RegistryError, ResolvedTool, ToolRegistry};
