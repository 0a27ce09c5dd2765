//! Conversation entities

use crate::tool::entities::ToolCall;
use crate::tool::value_objects::ToolOutput;
use serde::{Deserialize, Serialize};

/// Result of one tool call, correlated to its proposal by `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultTurn {
    /// Id of the [`ToolCall`] this answers
    pub call_id: String,
    /// Name the LLM used for the call
    pub tool_name: String,
    pub output: ToolOutput,
}

/// One entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// Input typed by the user
    User { text: String },
    /// Final text from the LLM
    Assistant { text: String },
    /// Tool calls proposed by the LLM, with any text it emitted alongside
    ToolCalls {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// Output of a single tool call
    ToolResult(ToolResultTurn),
}

impl Turn {
    pub fn kind(&self) -> &'static str {
        match self {
            Turn::User { .. } => "user",
            Turn::Assistant { .. } => "assistant",
            Turn::ToolCalls { .. } => "tool_calls",
            Turn::ToolResult(_) => "tool_result",
        }
    }
}

/// Ordered, append-only conversation history.
///
/// Owned by exactly one orchestrator. There is no way to remove or edit
/// a turn once appended; adapters read the whole history on every call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_prompt: Option<String>,
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::User { text: text.into() });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::Assistant { text: text.into() });
    }

    pub fn push_tool_calls(&mut self, text: Option<String>, calls: Vec<ToolCall>) {
        self.turns.push(Turn::ToolCalls { text, calls });
    }

    pub fn push_tool_result(
        &mut self,
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: ToolOutput,
    ) {
        self.turns.push(Turn::ToolResult(ToolResultTurn {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            output,
        }));
    }

    /// Calls from the most recent proposal that have no result yet.
    pub fn unanswered_calls(&self) -> Vec<&ToolCall> {
        let Some(pos) = self
            .turns
            .iter()
            .rposition(|t| matches!(t, Turn::ToolCalls { .. }))
        else {
            return Vec::new();
        };
        let Turn::ToolCalls { calls, .. } = &self.turns[pos] else {
            return Vec::new();
        };
        let answered: Vec<&str> = self.turns[pos + 1..]
            .iter()
            .filter_map(|t| match t {
                Turn::ToolResult(r) => Some(r.call_id.as_str()),
                _ => None,
            })
            .collect();
        calls
            .iter()
            .filter(|c| !answered.contains(&c.id.as_str()))
            .collect()
    }
}
