//! Console output formatter for the chat transcript

use crate::chat::ServerSummary;
use crate::output::formatter::OutputFormatter;
use colored::Colorize;
use wrp_domain::{AdvertisedTool, ToolCall, ToolOutput, preview};

/// Longest tool result shown inline in the transcript
const RESULT_PREVIEW: usize = 400;

/// Formats transcript pieces for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    pub fn format_answer(answer: &str) -> String {
        format!("{} {}", "Answer:".green().bold(), answer.trim())
    }

    pub fn format_tool_call(call: &ToolCall, server: &str) -> String {
        let args = serde_json::Value::Object(call.arguments.clone());
        format!(
            "  {} {} {} {}",
            "->".cyan(),
            call.name.bold(),
            format!("@{server}").dimmed(),
            args
        )
    }

    pub fn format_tool_result(call: &ToolCall, output: &ToolOutput) -> String {
        let body = preview(&output.content, RESULT_PREVIEW);
        match output.failure {
            None => format!("  {} {} {}", "<-".green(), call.name.bold(), body),
            Some(failure) => format!(
                "  {} {} {} {}",
                "x".red(),
                call.name.bold(),
                format!("[{failure}]").red(),
                body
            ),
        }
    }

    pub fn format_catalog(tools: &[AdvertisedTool]) -> String {
        if tools.is_empty() {
            return format!("{}\n", "No tools available.".yellow());
        }

        let mut output = Self::section_header(&format!("Tools ({})", tools.len()));
        for tool in tools {
            output.push_str(&format!(
                "  {} {}\n",
                tool.name.bold(),
                format!("({})", tool.descriptor.server).dimmed()
            ));
            if !tool.descriptor.description.is_empty() {
                output.push_str(&format!("      {}\n", preview(&tool.descriptor.description, 100)));
            }
            for param in &tool.descriptor.parameters {
                let required = if param.required { ", required" } else { "" };
                output.push_str(&format!(
                    "      - {} ({}{})\n",
                    param.name, param.param_type, required
                ));
            }
        }
        output
    }

    pub fn format_servers(servers: &[ServerSummary]) -> String {
        let mut output = Self::section_header(&format!("Servers ({})", servers.len()));
        for server in servers {
            let state = if server.is_ready() {
                server.state.green()
            } else {
                server.state.red()
            };
            let tools = server
                .tools
                .map(|n| format!("{n} tools"))
                .unwrap_or_else(|| "no tools".to_string());
            let session = server
                .session_id
                .map(|id| format!("session #{id}"))
                .unwrap_or_else(|| "no session".to_string());
            output.push_str(&format!(
                "  {:<16} {} | process {} | {} | {}\n",
                server.name.bold(),
                state,
                server.process,
                session,
                tools
            ));
            if let Some(detail) = &server.detail {
                output.push_str(&format!("      {}\n", detail.dimmed()));
            }
        }
        output
    }

    pub fn format_error(message: &str) -> String {
        format!("{} {}", "Error:".red().bold(), message)
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }
}

impl OutputFormatter for ConsoleFormatter {
    fn format_answer(&self, answer: &str) -> String {
        Self::format_answer(answer)
    }

    fn format_tool_call(&self, call: &ToolCall, server: &str) -> String {
        Self::format_tool_call(call, server)
    }

    fn format_tool_result(&self, call: &ToolCall, output: &ToolOutput) -> String {
        Self::format_tool_result(call, output)
    }

    fn format_catalog(&self, tools: &[AdvertisedTool]) -> String {
        Self::format_catalog(tools)
    }

    fn format_servers(&self, servers: &[ServerSummary]) -> String {
        Self::format_servers(servers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wrp_domain::{ParamType, ToolDescriptor, ToolFailure, ToolParameter};

    fn plain() {
        colored::control::set_override(false);
    }

    fn ping_call() -> ToolCall {
        ToolCall::new("c1", "ping").with_arguments(json!({"x": 7}).as_object().cloned().unwrap())
    }

    #[test]
    fn test_tool_traffic() {
        plain();
        let formatter: &dyn OutputFormatter = &ConsoleFormatter;
        let call = ping_call();
        assert_eq!(
            formatter.format_tool_call(&call, "Echo"),
            "  -> ping @Echo {\"x\":7}"
        );
        assert_eq!(
            formatter.format_tool_result(&call, &ToolOutput::success("7")),
            "  <- ping 7"
        );
        assert_eq!(
            formatter.format_tool_result(
                &call,
                &ToolOutput::failure(ToolFailure::SessionClosed, "session to server 'Echo' is closed")
            ),
            "  x ping [session_closed] session to server 'Echo' is closed"
        );
    }

    #[test]
    fn test_catalog_lists_parameters() {
        plain();
        let mut x = ToolParameter::new("x", ParamType::Integer);
        x.required = true;
        let descriptor = ToolDescriptor::new("Echo", "ping", "Echo x back").with_parameter(x);
        let text = ConsoleFormatter::format_catalog(&[AdvertisedTool::new("ping", descriptor)]);
        assert!(text.contains("Tools (1)"));
        assert!(text.contains("ping (Echo)"));
        assert!(text.contains("Echo x back"));
        assert!(text.contains("- x (integer, required)"));

        assert!(ConsoleFormatter::format_catalog(&[]).contains("No tools available."));
    }

    #[test]
    fn test_servers_table() {
        plain();
        let rows = vec![
            ServerSummary {
                name: "Jarvis".into(),
                state: "ready".into(),
                process: "running".into(),
                session_id: Some(3),
                tools: Some(12),
                detail: None,
            },
            ServerSummary {
                name: "Adios".into(),
                state: "closed".into(),
                process: "exited (code 1)".into(),
                session_id: Some(1),
                tools: None,
                detail: Some("server closed its output".into()),
            },
        ];
        let text = ConsoleFormatter::format_servers(&rows);
        assert!(text.contains("Servers (2)"));
        assert!(text.contains("session #3 | 12 tools"));
        assert!(text.contains("process exited (code 1)"));
        assert!(text.contains("server closed its output"));
    }

    #[test]
    fn test_answer_is_trimmed() {
        plain();
        assert_eq!(ConsoleFormatter::format_answer("  42\n"), "Answer: 42");
    }
}
