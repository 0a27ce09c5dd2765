//! Connection manager for all configured servers.
//!
//! The [`Gateway`] ties the supervisor, sessions and the tool registry
//! together: it launches each server, runs the handshake, registers the
//! session with the registry and discovers its tools. A server that fails
//! to start is reported and skipped; the others keep working.

use crate::mcp::error::{SessionError, SupervisorError};
use crate::mcp::session::{McpSession, SessionOptions, SessionState};
use crate::mcp::supervisor::{ProcessHealth, ProcessSupervisor};
use crate::mcp::tool_server::McpToolServer;
use crate::mcp::transport::Transport;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, warn};
use wrp_application::ToolRegistry;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Outcome of connecting every configured server.
#[derive(Debug, Default)]
pub struct ConnectReport {
    pub connected: Vec<String>,
    /// `(server, error message)`
    pub failed: Vec<(String, String)>,
}

impl ConnectReport {
    pub fn any_connected(&self) -> bool {
        !self.connected.is_empty()
    }
}

/// Snapshot of one server for `/servers`.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub name: String,
    pub session_id: Option<u64>,
    pub state: Option<SessionState>,
    pub process: ProcessHealth,
    pub tools: Option<usize>,
    pub close_reason: Option<String>,
}

pub struct Gateway {
    supervisor: ProcessSupervisor,
    registry: Arc<ToolRegistry>,
    session_options: SessionOptions,
    servers: RwLock<BTreeMap<String, Arc<McpToolServer>>>,
}

impl Gateway {
    pub fn new(
        supervisor: ProcessSupervisor,
        registry: Arc<ToolRegistry>,
        session_options: SessionOptions,
    ) -> Self {
        Self {
            supervisor,
            registry,
            session_options,
            servers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn server(&self, name: &str) -> Option<Arc<McpToolServer>> {
        self.servers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Connect every configured server concurrently.
    pub async fn connect_all(&self) -> ConnectReport {
        let names = self.supervisor.resolver().server_names();
        let attempts = names.iter().map(|name| self.connect(name));
        let results = futures::future::join_all(attempts).await;

        let mut report = ConnectReport::default();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(_) => report.connected.push(name),
                Err(e) => {
                    warn!(server = %name, "Gateway: could not connect: {}", e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        info!(
            "Gateway: {} of {} servers connected",
            report.connected.len(),
            report.connected.len() + report.failed.len()
        );
        report
    }

    /// Launch `name` and attach a session to it.
    pub async fn connect(&self, name: &str) -> Result<Arc<McpToolServer>, GatewayError> {
        let transport = self.supervisor.spawn(name).await?;
        self.attach(name, transport).await
    }

    /// Handshake over an already-open transport and register the result.
    pub async fn attach(
        &self,
        name: &str,
        transport: Transport,
    ) -> Result<Arc<McpToolServer>, GatewayError> {
        let session = McpSession::connect(name, transport, &self.session_options).await?;
        self.supervisor.reset_restarts(name);

        let server = match self.server(name) {
            Some(existing) => {
                let old = existing.replace_session(session);
                old.close().await;
                existing
            }
            None => {
                let server = Arc::new(McpToolServer::new(session));
                self.servers
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(name.to_string(), Arc::clone(&server));
                server
            }
        };

        self.registry.add_server(server.clone());
        match self.registry.discover(name).await {
            Ok(tools) => info!(server = name, "Gateway: {} tools discovered", tools.len()),
            Err(e) => warn!(server = name, "Gateway: tool discovery failed: {}", e),
        }
        Ok(server)
    }

    /// Restart `name` under the supervisor's backoff policy.
    pub async fn reconnect(&self, name: &str) -> Result<Arc<McpToolServer>, GatewayError> {
        if let Some(server) = self.server(name) {
            server.session().close().await;
        }
        let transport = self.supervisor.respawn(name).await?;
        self.attach(name, transport).await
    }

    /// Reconnect every known server whose session has closed.
    pub async fn ensure_connected(&self) -> Vec<(String, GatewayError)> {
        let dead: Vec<String> = self
            .servers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, s)| !s.session().is_ready())
            .map(|(name, _)| name.clone())
            .collect();

        let mut failures = Vec::new();
        for name in dead {
            warn!(server = %name, "Gateway: session closed, reconnecting");
            if let Err(e) = self.reconnect(&name).await {
                failures.push((name, e));
            }
        }
        failures
    }

    pub fn status(&self) -> Vec<ServerStatus> {
        let servers = self.servers.read().unwrap_or_else(|e| e.into_inner());
        self.supervisor
            .resolver()
            .server_names()
            .into_iter()
            .map(|name| {
                let session = servers.get(&name).map(|s| s.session());
                ServerStatus {
                    process: self.supervisor.health(&name),
                    tools: self.registry.cached_tools(&name).map(|t| t.len()),
                    session_id: session.as_ref().map(|s| s.session_id()),
                    state: session.as_ref().map(|s| s.state()),
                    close_reason: session.as_ref().and_then(|s| s.close_reason()),
                    name,
                }
            })
            .collect()
    }

    /// Close every session, then stop every process.
    pub async fn shutdown(&self) {
        let servers: Vec<(String, Arc<McpToolServer>)> = {
            let mut map = self.servers.write().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *map).into_iter().collect()
        };
        for (name, server) in &servers {
            server.session().close().await;
            self.registry.remove_server(name);
        }
        self.supervisor.terminate_all().await;
        info!("Gateway: shut down {} servers", servers.len());
    }
}
