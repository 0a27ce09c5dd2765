//! Execution parameters: orchestration loop control.
//!
//! [`ExecutionParams`] groups the static limits and timeouts used by the
//! [`Orchestrator`](crate::use_cases::orchestrator::Orchestrator) and the
//! [`ToolRegistry`](crate::services::tool_registry::ToolRegistry).
//! Every timeout is mandatory; there is no "wait forever" setting.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestration loop control parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Maximum adapter round-trips that end in tool calls before giving up.
    pub max_tool_rounds: usize,
    /// Timeout for a single `tools/call`.
    pub tool_call_timeout: Duration,
    /// Timeout for `tools/list` during discovery.
    pub list_tools_timeout: Duration,
    /// Timeout for one adapter `chat` call.
    pub adapter_timeout: Duration,
    /// Retries per adapter for retryable errors.
    pub adapter_retries: usize,
    /// Base delay for adapter retry backoff (doubled per attempt).
    pub retry_base_delay: Duration,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            max_tool_rounds: 10,
            tool_call_timeout: Duration::from_secs(120),
            list_tools_timeout: Duration::from_secs(30),
            adapter_timeout: Duration::from_secs(180),
            adapter_retries: 2,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl ExecutionParams {
    // ==================== Builder Methods ====================

    pub fn with_max_tool_rounds(mut self, max: usize) -> Self {
        self.max_tool_rounds = max;
        self
    }

    pub fn with_tool_call_timeout(mut self, timeout: Duration) -> Self {
        self.tool_call_timeout = timeout;
        self
    }

    pub fn with_list_tools_timeout(mut self, timeout: Duration) -> Self {
        self.list_tools_timeout = timeout;
        self
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    pub fn with_adapter_retries(mut self, retries: usize) -> Self {
        self.adapter_retries = retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn retry_delay(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16) as u32).unwrap_or(u32::MAX);
        self.retry_base_delay.saturating_mul(factor)
    }
}
