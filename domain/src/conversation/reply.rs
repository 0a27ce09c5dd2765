//! Normalized LLM reply

use crate::tool::entities::ToolCall;
use serde::{Deserialize, Serialize};

/// What an LLM backend answered, independent of its wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterReply {
    /// The model is done; this text is the answer.
    FinalText { text: String },
    /// The model wants tools invoked before it continues.
    ProposedToolCalls {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
}

impl AdapterReply {
    pub fn text(text: impl Into<String>) -> Self {
        AdapterReply::FinalText { text: text.into() }
    }

    /// Build a tool-call reply, collapsing to [`FinalText`](Self::FinalText)
    /// when `calls` is empty.
    pub fn tool_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        if calls.is_empty() {
            return AdapterReply::FinalText {
                text: text.unwrap_or_default(),
            };
        }
        let text = text.filter(|t| !t.trim().is_empty());
        AdapterReply::ProposedToolCalls { text, calls }
    }

    pub fn has_tool_calls(&self) -> bool {
        matches!(self, AdapterReply::ProposedToolCalls { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_calls_collapse_to_text() {
        let reply = AdapterReply::tool_calls(Some("hello".into()), vec![]);
        assert_eq!(reply, AdapterReply::text("hello"));
        assert!(!reply.has_tool_calls());
    }

    #[test]
    fn test_blank_text_dropped_from_proposal() {
        let reply = AdapterReply::tool_calls(Some("  ".into()), vec![ToolCall::new("1", "t")]);
        match reply {
            AdapterReply::ProposedToolCalls { text, calls } => {
                assert!(text.is_none());
                assert_eq!(calls.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
