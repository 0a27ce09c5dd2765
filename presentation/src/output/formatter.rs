//! Output formatter trait

use crate::chat::ServerSummary;
use wrp_domain::{AdvertisedTool, ToolCall, ToolOutput};

/// Trait for rendering transcript pieces
pub trait OutputFormatter {
    /// Final answer of a query
    fn format_answer(&self, answer: &str) -> String;

    /// A tool call on its way to `server`
    fn format_tool_call(&self, call: &ToolCall, server: &str) -> String;

    /// The result of a tool call
    fn format_tool_result(&self, call: &ToolCall, output: &ToolOutput) -> String;

    /// Tool catalog as advertised to the LLM
    fn format_catalog(&self, tools: &[AdvertisedTool]) -> String;

    /// Server health table
    fn format_servers(&self, servers: &[ServerSummary]) -> String;
}
