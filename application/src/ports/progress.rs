//! Conversation progress port.
//!
//! [`ConversationProgress`] is an output port the presentation layer
//! implements to show what the orchestrator is doing while a query runs.
//! Every method has a no-op default.

use wrp_domain::{ProviderKind, ToolCall, ToolOutput};

pub trait ConversationProgress: Send + Sync {
    /// An adapter call is about to start (`round` counts from 1)
    fn on_adapter_start(&self, _provider: ProviderKind, _model: &str, _round: usize) {}

    /// The adapter call finished, successfully or not
    fn on_adapter_end(&self) {}

    /// A retryable adapter error occurred and the call will be retried
    fn on_adapter_retry(&self, _provider: ProviderKind, _attempt: usize, _error: &str) {}

    /// Falling back to the next configured adapter
    fn on_adapter_fallback(&self, _from: ProviderKind, _to: ProviderKind) {}

    /// A tool call is being dispatched to `server`
    fn on_tool_call(&self, _call: &ToolCall, _server: &str) {}

    /// A tool call produced its result
    fn on_tool_result(&self, _call: &ToolCall, _output: &ToolOutput) {}
}

/// Progress sink that ignores everything.
pub struct NoProgress;

impl ConversationProgress for NoProgress {}
