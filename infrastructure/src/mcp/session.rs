//! MCP protocol session.
//!
//! An [`McpSession`] owns one [`Transport`] for its whole life and runs the
//! protocol state machine on top of it:
//!
//! ```text
//! Uninitialized ──connect──▶ Handshaking ──initialize ok──▶ Ready
//!                                 │                           │
//!                                 └──────── error ───────▶ Closed ◀── EOF / protocol error / close()
//! ```
//!
//! # Correlation
//!
//! A single background reader task owns the read half. Requests register a
//! `oneshot` sender in the pending table under a fresh id, write their frame
//! through the shared writer and wait. The reader resolves entries purely by
//! id, so responses may arrive in any order. Closing the session drains the
//! table and resolves every waiter with [`SessionError::Closed`].
//!
//! Server-initiated traffic never blocks the reader: `ping` is answered from
//! a spawned task and notifications go out on a broadcast channel.

use crate::mcp::error::{ProtocolError, SessionError, TransportError};
use crate::mcp::protocol::{
    CallToolResult, Implementation, InitializeResult, ListToolsPage, METHOD_NOT_FOUND, Message,
    RpcError, SUPPORTED_PROTOCOL_VERSIONS, call_tool_params, initialize_params, methods,
};
use crate::mcp::supervisor::ProcessGuard;
use crate::mcp::transport::{BoxedReader, BoxedWriter, FrameReader, FrameWriter, Transport};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Process-wide session counter; every connection gets a fresh id.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Upper bound on `tools/list` pages followed in one listing.
const MAX_LIST_PAGES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Handshaking,
    Ready,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Handshaking => "handshaking",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub handshake_timeout: Duration,
    pub client_info: Implementation,
    /// Buffered notifications per subscriber before old ones are dropped
    pub notification_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            client_info: Implementation {
                name: "wrp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            notification_capacity: 64,
        }
    }
}

impl SessionOptions {
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// A notification received from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerNotification {
    pub method: String,
    pub params: Option<Value>,
}

type ResponseSender = oneshot::Sender<Result<Value, SessionError>>;

struct PendingEntry {
    method: String,
    tx: ResponseSender,
}

/// Id allocation, outstanding requests and lifecycle state, all behind
/// one lock so that closing and registering cannot interleave.
struct PendingTable {
    next_id: u64,
    entries: HashMap<u64, PendingEntry>,
    state: SessionState,
    close_reason: Option<String>,
}

struct Shared {
    server: String,
    table: std::sync::Mutex<PendingTable>,
    tools_revision: AtomicU64,
    notifications: broadcast::Sender<ServerNotification>,
}

impl Shared {
    fn new(server: String, notifications: broadcast::Sender<ServerNotification>) -> Self {
        Self {
            server,
            table: std::sync::Mutex::new(PendingTable {
                next_id: 1,
                entries: HashMap::new(),
                state: SessionState::Uninitialized,
                close_reason: None,
            }),
            tools_revision: AtomicU64::new(0),
            notifications,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> SessionState {
        self.lock().state
    }

    fn set_state(&self, state: SessionState) {
        let mut table = self.lock();
        if table.state != SessionState::Closed {
            table.state = state;
        }
    }

    fn closed_error(&self) -> SessionError {
        let reason = self
            .lock()
            .close_reason
            .clone()
            .unwrap_or_else(|| "session closed".to_string());
        SessionError::Closed {
            server: self.server.clone(),
            reason,
        }
    }

    fn next_id(&self) -> u64 {
        let mut table = self.lock();
        let id = table.next_id;
        table.next_id += 1;
        id
    }

    /// Allocate an id and record a waiter for it.
    fn register(
        &self,
        method: &str,
    ) -> Result<(u64, oneshot::Receiver<Result<Value, SessionError>>), SessionError> {
        let mut table = self.lock();
        match table.state {
            SessionState::Closed => {
                return Err(SessionError::Closed {
                    server: self.server.clone(),
                    reason: table
                        .close_reason
                        .clone()
                        .unwrap_or_else(|| "session closed".to_string()),
                });
            }
            SessionState::Uninitialized => {
                return Err(SessionError::Closed {
                    server: self.server.clone(),
                    reason: "session not initialized".to_string(),
                });
            }
            SessionState::Handshaking | SessionState::Ready => {}
        }
        let id = table.next_id;
        table.next_id += 1;
        let (tx, rx) = oneshot::channel();
        table.entries.insert(
            id,
            PendingEntry {
                method: method.to_string(),
                tx,
            },
        );
        Ok((id, rx))
    }

    fn remove(&self, id: u64) -> bool {
        self.lock().entries.remove(&id).is_some()
    }

    /// Resolve the waiter for `id`. Returns false when nobody is waiting.
    fn complete(
        &self,
        id: u64,
        make: impl FnOnce(&str) -> Result<Value, SessionError>,
    ) -> bool {
        let entry = self.lock().entries.remove(&id);
        match entry {
            Some(entry) => {
                let _ = entry.tx.send(make(&entry.method));
                true
            }
            None => false,
        }
    }

    /// Move to `Closed` and fail every outstanding request. Returns false if
    /// the session was already closed.
    fn close(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let drained: Vec<PendingEntry> = {
            let mut table = self.lock();
            if table.state == SessionState::Closed {
                return false;
            }
            table.state = SessionState::Closed;
            table.close_reason = Some(reason.clone());
            table.entries.drain().map(|(_, e)| e).collect()
        };
        if !drained.is_empty() {
            debug!(
                server = %self.server,
                "MCP: failing {} pending requests: {}",
                drained.len(),
                reason
            );
        }
        for entry in drained {
            let _ = entry.tx.send(Err(SessionError::Closed {
                server: self.server.clone(),
                reason: reason.clone(),
            }));
        }
        true
    }
}

/// Removes a pending entry when the requesting future finishes or is dropped.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.shared.remove(self.id) {
            trace!(server = %self.shared.server, id = self.id, "MCP: removed abandoned request");
        }
    }
}

fn transport_failure(server: &str, err: TransportError) -> SessionError {
    match err {
        TransportError::UnexpectedEof => SessionError::Closed {
            server: server.to_string(),
            reason: "server closed its output".to_string(),
        },
        other => SessionError::Transport {
            server: server.to_string(),
            detail: other.to_string(),
        },
    }
}

/// One live MCP session with one server.
pub struct McpSession {
    shared: Arc<Shared>,
    session_id: u64,
    writer: Arc<Mutex<FrameWriter<BoxedWriter>>>,
    reader_handle: JoinHandle<()>,
    init: InitializeResult,
    _process: Option<ProcessGuard>,
}

impl McpSession {
    /// Run the `initialize` handshake over `transport` and start the reader.
    pub async fn connect(
        server: impl Into<String>,
        transport: Transport,
        options: &SessionOptions,
    ) -> Result<Self, SessionError> {
        let server = server.into();
        let (mut reader, writer, process) = transport.into_parts();
        let (notifications, _) = broadcast::channel(options.notification_capacity.max(1));
        let shared = Arc::new(Shared::new(server.clone(), notifications));
        let writer = Arc::new(Mutex::new(writer));

        shared.set_state(SessionState::Handshaking);
        let init_id = shared.next_id();
        debug!(server = %server, id = init_id, "MCP: sending initialize");

        let handshake = Self::handshake(&shared, &mut reader, &writer, init_id, &options.client_info);
        let init = match tokio::time::timeout(options.handshake_timeout, handshake).await {
            Ok(Ok(init)) => init,
            Ok(Err(e)) => {
                warn!(server = %server, "MCP: handshake failed: {}", e);
                shared.close(format!("handshake failed: {e}"));
                return Err(e);
            }
            Err(_) => {
                let e = SessionError::Timeout {
                    server: server.clone(),
                    method: methods::INITIALIZE.to_string(),
                    id: init_id,
                    after: options.handshake_timeout,
                };
                warn!(server = %server, "MCP: {}", e);
                shared.close("handshake timed out");
                return Err(e);
            }
        };

        shared.set_state(SessionState::Ready);
        let session_id = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
        info!(
            server = %server,
            session = session_id,
            "MCP: connected to {} {} (protocol {})",
            if init.server_info.name.is_empty() { &server } else { &init.server_info.name },
            init.server_info.version,
            init.protocol_version
        );

        let shared_bg = Arc::clone(&shared);
        let writer_bg = Arc::clone(&writer);
        let reader_handle = tokio::spawn(async move {
            Self::reader_loop(shared_bg, reader, writer_bg).await;
        });

        Ok(Self {
            shared,
            session_id,
            writer,
            reader_handle,
            init,
            _process: process,
        })
    }

    async fn handshake(
        shared: &Shared,
        reader: &mut FrameReader<BoxedReader>,
        writer: &Mutex<FrameWriter<BoxedWriter>>,
        id: u64,
        client_info: &Implementation,
    ) -> Result<InitializeResult, SessionError> {
        let server = shared.server.as_str();
        let protocol = |source: ProtocolError| SessionError::Protocol {
            server: server.to_string(),
            source,
        };

        let request = Message::request(id, methods::INITIALIZE, Some(initialize_params(client_info)));
        writer
            .lock()
            .await
            .send(&request.encode())
            .await
            .map_err(|e| transport_failure(server, e))?;

        let body = reader
            .receive()
            .await
            .map_err(|e| transport_failure(server, e))?;
        let message = Message::parse(&body).map_err(protocol)?;

        let init = match message {
            Message::Response { id: rid, result } if rid.as_u64() == Some(id) => {
                serde_json::from_value::<InitializeResult>(result).map_err(|e| {
                    protocol(ProtocolError::HandshakeViolation(format!(
                        "invalid initialize result: {e}"
                    )))
                })?
            }
            Message::ErrorResponse { id: rid, error } if rid.as_u64() == Some(id) => {
                return Err(protocol(ProtocolError::InitializeRejected {
                    code: error.code,
                    message: error.message,
                }));
            }
            other => {
                return Err(protocol(ProtocolError::HandshakeViolation(format!(
                    "unexpected {} while waiting for the initialize response: {}",
                    other.kind(),
                    String::from_utf8_lossy(&body)
                ))));
            }
        };

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&init.protocol_version.as_str()) {
            return Err(protocol(ProtocolError::UnsupportedVersion(
                init.protocol_version,
            )));
        }

        let initialized = Message::notification(methods::INITIALIZED, None);
        writer
            .lock()
            .await
            .send(&initialized.encode())
            .await
            .map_err(|e| transport_failure(server, e))?;

        Ok(init)
    }

    /// Background reader: sole owner of the read half.
    async fn reader_loop(
        shared: Arc<Shared>,
        mut reader: FrameReader<BoxedReader>,
        writer: Arc<Mutex<FrameWriter<BoxedWriter>>>,
    ) {
        let server = shared.server.clone();

        loop {
            let body = match reader.receive().await {
                Ok(body) => body,
                Err(e) => {
                    let reason = match e {
                        TransportError::UnexpectedEof => "server closed its output".to_string(),
                        other => format!("transport error: {other}"),
                    };
                    if shared.close(reason.clone()) {
                        info!(server = %server, "MCP: session closed: {}", reason);
                    }
                    break;
                }
            };

            let message = match Message::parse(&body) {
                Ok(m) => m,
                Err(e) => {
                    error!(server = %server, "MCP: protocol error, closing session: {}", e);
                    shared.close(format!("protocol error: {e}"));
                    break;
                }
            };

            match message {
                Message::Response { id, result } => match id.as_u64() {
                    Some(id) => {
                        if !shared.complete(id, |_| Ok(result)) {
                            debug!(server = %server, id, "MCP: no pending request for response");
                        }
                    }
                    None => warn!(server = %server, "MCP: response with non-integer id {}", id),
                },
                Message::ErrorResponse { id, error } => match id.as_u64() {
                    Some(id) => {
                        let server_name = server.clone();
                        let resolved = shared.complete(id, move |method| {
                            Err(SessionError::Rpc {
                                server: server_name,
                                method: method.to_string(),
                                id,
                                code: error.code,
                                message: error.message,
                                data: error.data,
                            })
                        });
                        if !resolved {
                            debug!(server = %server, id, "MCP: no pending request for error response");
                        }
                    }
                    None => warn!(
                        server = %server,
                        "MCP: error response without id: {} ({})",
                        error.message,
                        error.code
                    ),
                },
                Message::Request { id, method, .. } => {
                    let reply = if method == methods::PING {
                        Message::Response {
                            id,
                            result: json!({}),
                        }
                    } else {
                        debug!(server = %server, method = %method, "MCP: rejecting server request");
                        Message::ErrorResponse {
                            id,
                            error: RpcError {
                                code: METHOD_NOT_FOUND,
                                message: format!("method not found: {method}"),
                                data: None,
                            },
                        }
                    };
                    let writer = Arc::clone(&writer);
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        if let Err(e) = writer.lock().await.send(&reply.encode()).await {
                            shared.close(format!("write failed: {e}"));
                        }
                    });
                }
                Message::Notification { method, params } => {
                    Self::handle_notification(&shared, &method, params.as_ref());
                    let _ = shared
                        .notifications
                        .send(ServerNotification { method, params });
                }
            }
        }
    }

    fn handle_notification(shared: &Shared, method: &str, params: Option<&Value>) {
        let server = shared.server.as_str();
        match method {
            methods::TOOLS_LIST_CHANGED => {
                let revision = shared.tools_revision.fetch_add(1, Ordering::SeqCst) + 1;
                info!(server = %server, revision, "MCP: tool list changed");
            }
            methods::LOG_MESSAGE => {
                let params = params.cloned().unwrap_or(Value::Null);
                let level = params.get("level").and_then(|l| l.as_str()).unwrap_or("info");
                let logger = params.get("logger").and_then(|l| l.as_str()).unwrap_or("");
                let data = match params.get("data") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                match level {
                    "debug" => debug!(server = %server, logger, "{}", data),
                    "info" | "notice" => info!(server = %server, logger, "{}", data),
                    "warning" => warn!(server = %server, logger, "{}", data),
                    _ => error!(server = %server, logger, "{}", data),
                }
            }
            other => debug!(server = %server, method = other, "MCP: notification"),
        }
    }

    /// Send a request and wait for its response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        let (id, rx) = self.shared.register(method)?;
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };
        let frame = Message::request(id, method, params).encode();
        trace!(server = %self.shared.server, id, method, "MCP: sending {}", String::from_utf8_lossy(&frame));

        let exchange = async {
            if let Err(e) = self.writer.lock().await.send(&frame).await {
                let detail = format!("write failed: {e}");
                self.shared.close(detail.clone());
                return Err(SessionError::Transport {
                    server: self.shared.server.clone(),
                    detail,
                });
            }
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(self.shared.closed_error()),
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    server = %self.shared.server,
                    id,
                    method,
                    "MCP: request timed out after {:?}",
                    timeout
                );
                Err(SessionError::Timeout {
                    server: self.shared.server.clone(),
                    method: method.to_string(),
                    id,
                    after: timeout,
                })
            }
        }
    }

    /// All tool entries, following `nextCursor` pagination.
    pub async fn list_tools(&self, timeout: Duration) -> Result<Vec<Value>, SessionError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.request(methods::TOOLS_LIST, params, timeout).await?;
            let page: ListToolsPage = serde_json::from_value(result.clone()).map_err(|e| {
                SessionError::Protocol {
                    server: self.shared.server.clone(),
                    source: ProtocolError::MalformedMessage {
                        detail: format!("invalid tools/list result: {e}"),
                        raw: result.to_string(),
                    },
                }
            })?;
            tools.extend(page.tools);

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!(server = %self.shared.server, "MCP: tools/list repeated cursor '{}'", next);
                    break;
                }
                None => break,
            }
        }

        debug!(server = %self.shared.server, "MCP: listed {} tools", tools.len());
        Ok(tools)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<CallToolResult, SessionError> {
        let result = self
            .request(
                methods::TOOLS_CALL,
                Some(call_tool_params(name, arguments)),
                timeout,
            )
            .await?;
        serde_json::from_value(result.clone()).map_err(|e| SessionError::Protocol {
            server: self.shared.server.clone(),
            source: ProtocolError::MalformedMessage {
                detail: format!("invalid tools/call result for '{name}': {e}"),
                raw: result.to_string(),
            },
        })
    }

    pub async fn ping(&self, timeout: Duration) -> Result<(), SessionError> {
        self.request(methods::PING, None, timeout).await.map(|_| ())
    }

    /// Close the session: fail pending requests, stop the reader and send
    /// EOF to the server. The process itself is released on drop.
    pub async fn close(&self) {
        if self.shared.close("closed by client") {
            info!(server = %self.shared.server, session = self.session_id, "MCP: closing session");
        }
        self.reader_handle.abort();
        let _ = self.writer.lock().await.shutdown().await;
    }

    pub fn server(&self) -> &str {
        &self.shared.server
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Why the session closed, once it has.
    pub fn close_reason(&self) -> Option<String> {
        self.shared.lock().close_reason.clone()
    }

    pub fn protocol_version(&self) -> &str {
        &self.init.protocol_version
    }

    pub fn server_info(&self) -> &Implementation {
        &self.init.server_info
    }

    pub fn capabilities(&self) -> &Value {
        &self.init.capabilities
    }

    pub fn instructions(&self) -> Option<&str> {
        self.init.instructions.as_deref()
    }

    pub fn tools_revision(&self) -> u64 {
        self.shared.tools_revision.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerNotification> {
        self.shared.notifications.subscribe()
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.lock().entries.len()
    }
}

impl Drop for McpSession {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.shared.close("session dropped");
    }
}
