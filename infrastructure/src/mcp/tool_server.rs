//! [`ToolServer`] port backed by an [`McpSession`].

use crate::mcp::protocol::CallToolResult;
use crate::mcp::session::McpSession;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;
use wrp_application::ports::tool_server::{ToolServer, ToolServerError};
use wrp_domain::{ToolFailure, ToolOutput};

/// One configured server. The session behind it is swapped on reconnect;
/// the registry sees the change through `session_id`.
pub struct McpToolServer {
    name: String,
    session: RwLock<Arc<McpSession>>,
}

impl McpToolServer {
    pub fn new(session: McpSession) -> Self {
        Self {
            name: session.server().to_string(),
            session: RwLock::new(Arc::new(session)),
        }
    }

    pub fn session(&self) -> Arc<McpSession> {
        Arc::clone(&self.session.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Install a fresh session, returning the old one.
    pub fn replace_session(&self, session: McpSession) -> Arc<McpSession> {
        let mut slot = self.session.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *slot, Arc::new(session))
    }
}

/// Whether a successful-looking text payload is really an error report.
///
/// Some servers return `{"isError": true, ...}` or `{"error": ...}` as
/// plain text content instead of setting `isError` on the result.
fn reports_error(text: &str) -> bool {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => {
            obj.get("isError").and_then(|v| v.as_bool()) == Some(true)
                || obj.get("error").is_some_and(|v| !v.is_null())
        }
        _ => false,
    }
}

fn to_output(server: &str, tool: &str, result: CallToolResult) -> ToolOutput {
    let text = result.text();
    if result.is_error || reports_error(&text) {
        let detail = if text.is_empty() {
            "no details given".to_string()
        } else {
            text
        };
        return ToolOutput::failure(
            ToolFailure::ServerError,
            format!("tool '{tool}' on server '{server}' reported an error: {detail}"),
        );
    }
    if text.is_empty() {
        return ToolOutput::success("No content returned");
    }
    ToolOutput::success(text)
}

#[async_trait]
impl ToolServer for McpToolServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn session_id(&self) -> u64 {
        self.session().session_id()
    }

    fn is_ready(&self) -> bool {
        self.session().is_ready()
    }

    fn tools_revision(&self) -> u64 {
        self.session().tools_revision()
    }

    async fn list_tools(&self, timeout: Duration) -> Result<Vec<Value>, ToolServerError> {
        let session = self.session();
        session.list_tools(timeout).await.map_err(Into::into)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<ToolOutput, ToolServerError> {
        let session = self.session();
        debug!(server = %self.name, tool = name, "MCP: tools/call");
        let result = session.call_tool(name, arguments, timeout).await?;
        Ok(to_output(&self.name, name, result))
    }
}
