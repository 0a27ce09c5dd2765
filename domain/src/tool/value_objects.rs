//! Tool domain value objects

use serde::{Deserialize, Serialize};

/// Category of a failed tool invocation.
///
/// Every failure is folded into the conversation as an error tool result;
/// the category is kept for logging and for the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailure {
    /// No connected server offers the requested name
    NotFound,
    /// Unqualified name offered by several servers
    Ambiguous,
    /// Arguments rejected before dispatch
    InvalidArguments,
    /// Server returned an error result or JSON-RPC error
    ServerError,
    /// No response within the per-call timeout
    Timeout,
    /// Owning session closed before responding
    SessionClosed,
    /// Conversation was cancelled before the result arrived
    Cancelled,
}

impl ToolFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolFailure::NotFound => "not_found",
            ToolFailure::Ambiguous => "ambiguous",
            ToolFailure::InvalidArguments => "invalid_arguments",
            ToolFailure::ServerError => "server_error",
            ToolFailure::Timeout => "timeout",
            ToolFailure::SessionClosed => "session_closed",
            ToolFailure::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of one tool invocation, as fed back to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text content (concatenated text blocks, or serialized structured content)
    pub content: String,
    /// Failure category, `None` on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ToolFailure>,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            failure: None,
        }
    }

    pub fn failure(failure: ToolFailure, message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            failure: Some(failure),
        }
    }

    pub fn is_error(&self) -> bool {
        self.failure.is_some()
    }
}

impl std::fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.failure {
            Some(kind) => write!(f, "[{}] {}", kind, self.content),
            None => write!(f, "{}", self.content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_output() {
        let out = ToolOutput::success("42");
        assert!(!out.is_error());
        assert_eq!(out.to_string(), "42");
    }

    #[test]
    fn test_failure_output_display() {
        let out = ToolOutput::failure(ToolFailure::Timeout, "tools/call timed out after 5s");
        assert!(out.is_error());
        assert_eq!(out.to_string(), "[timeout] tools/call timed out after 5s");
    }
}
