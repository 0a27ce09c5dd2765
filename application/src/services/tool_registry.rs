//! Tool registry: discovery, caching and name resolution across servers.
//!
//! The registry owns the set of connected [`ToolServer`]s and a cache of
//! their normalized tool descriptors. Cache entries are keyed by the
//! server's session id and tools revision, so a reconnect or a
//! `tools/list_changed` notification invalidates them automatically.
//!
//! # Naming policy
//!
//! Every tool has the qualified name `<server>__<tool>`, sanitized to a
//! valid function name. The bare name is advertised to the LLM when
//! exactly one server offers it; colliding tools are advertised only in
//! qualified form. A qualified match wins over a bare one. A call that
//! matches several tools is rejected as [`RegistryError::Ambiguous`].

use crate::ports::tool_server::{ToolServer, ToolServerError};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use wrp_domain::{AdvertisedTool, ToolDescriptor, normalize_tools};

/// Errors from discovery and resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("no connected server offers a tool named '{name}'")]
    NotFound { name: String },

    #[error("tool name '{name}' is offered by several servers ({}); call it as '<server>__{name}'", .servers.join(", "))]
    Ambiguous { name: String, servers: Vec<String> },

    #[error("unknown server '{0}'")]
    UnknownServer(String),

    #[error("tool discovery on server '{server}' failed: {source}")]
    Discovery {
        server: String,
        #[source]
        source: ToolServerError,
    },
}

/// A tool call target: the descriptor plus the server that owns it.
#[derive(Clone)]
pub struct ResolvedTool {
    pub descriptor: ToolDescriptor,
    pub server: Arc<dyn ToolServer>,
}

impl std::fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("server", &self.descriptor.server)
            .field("tool", &self.descriptor.name)
            .field("session_id", &self.server.session_id())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    session_id: u64,
    revision: u64,
    tools: Vec<ToolDescriptor>,
}

/// Registry of connected tool servers and their tools.
///
/// Shared (`Arc`) between orchestrators; switching LLM providers reuses
/// the cached descriptors without rediscovery.
pub struct ToolRegistry {
    servers: RwLock<BTreeMap<String, Arc<dyn ToolServer>>>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    list_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(list_timeout: Duration) -> Self {
        Self {
            servers: RwLock::new(BTreeMap::new()),
            cache: RwLock::new(HashMap::new()),
            list_timeout,
        }
    }

    /// Register a server, replacing any previous session under the same name.
    pub fn add_server(&self, server: Arc<dyn ToolServer>) {
        let name = server.name().to_string();
        let previous = self
            .servers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.clone(), server);
        if previous.is_some() {
            debug!(server = %name, "Registry: replacing session, dropping cached tools");
            self.cache
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&name);
        }
    }

    /// Unregister a server and forget its tools.
    pub fn remove_server(&self, name: &str) -> Option<Arc<dyn ToolServer>> {
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        self.servers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    /// Registered servers, ordered by name.
    pub fn servers(&self) -> Vec<Arc<dyn ToolServer>> {
        self.servers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn server(&self, name: &str) -> Option<Arc<dyn ToolServer>> {
        self.servers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Issue `tools/list` to `server_name` and refresh its cache entry.
    ///
    /// Unusable entries are skipped with a warning; duplicate names within
    /// one server keep the first occurrence.
    pub async fn discover(&self, server_name: &str) -> Result<Vec<ToolDescriptor>, RegistryError> {
        let server = self
            .server(server_name)
            .ok_or_else(|| RegistryError::UnknownServer(server_name.to_string()))?;

        // Captured before listing: a change announced mid-listing leaves
        // the entry stale so the next catalog rediscovers.
        let session_id = server.session_id();
        let revision = server.tools_revision();

        let raw = server
            .list_tools(self.list_timeout)
            .await
            .map_err(|source| RegistryError::Discovery {
                server: server_name.to_string(),
                source,
            })?;

        let (normalized, errors) = normalize_tools(server_name, &raw);
        for e in &errors {
            warn!(server = %server_name, "Registry: skipping tool entry: {}", e);
        }

        let mut tools: Vec<ToolDescriptor> = Vec::with_capacity(normalized.len());
        for tool in normalized {
            if tools.iter().any(|t| t.name == tool.name) {
                warn!(server = %server_name, tool = %tool.name, "Registry: duplicate tool name, keeping first");
                continue;
            }
            tools.push(tool);
        }

        info!(
            server = %server_name,
            session_id,
            revision,
            "Registry: discovered {} tools",
            tools.len()
        );

        // The session may have been replaced while we were listing.
        let still_current = self
            .server(server_name)
            .is_some_and(|s| s.session_id() == session_id);
        if still_current {
            self.cache
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(
                    server_name.to_string(),
                    CacheEntry {
                        session_id,
                        revision,
                        tools: tools.clone(),
                    },
                );
        }

        Ok(tools)
    }

    /// Cached descriptors for one server, if present (may be stale).
    pub fn cached_tools(&self, server_name: &str) -> Option<Vec<ToolDescriptor>> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(server_name)
            .map(|e| e.tools.clone())
    }

    fn is_stale(&self, server: &dyn ToolServer) -> bool {
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
        match cache.get(server.name()) {
            None => true,
            Some(entry) => {
                entry.session_id != server.session_id() || entry.revision != server.tools_revision()
            }
        }
    }

    /// Rediscover every ready server whose cache entry is missing or stale.
    ///
    /// Failures are returned, not raised: a server that cannot list its
    /// tools simply contributes none.
    pub async fn refresh(&self) -> Vec<RegistryError> {
        let stale: Vec<String> = self
            .servers()
            .into_iter()
            .filter(|s| s.is_ready() && self.is_stale(s.as_ref()))
            .map(|s| s.name().to_string())
            .collect();

        let results =
            futures::future::join_all(stale.iter().map(|name| self.discover(name))).await;

        results
            .into_iter()
            .filter_map(|r| r.err())
            .inspect(|e| warn!("Registry: {}", e))
            .collect()
    }

    /// Union of every server's tools, with the names advertised to the LLM.
    ///
    /// Servers whose session is not ready are omitted from the result but
    /// still take part in collision detection, so advertised names do not
    /// flip while a server reconnects.
    pub async fn catalog(&self) -> Vec<AdvertisedTool> {
        self.refresh().await;

        let servers = self.servers();
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());

        let mut name_counts: HashMap<&str, usize> = HashMap::new();
        for server in &servers {
            if let Some(entry) = cache.get(server.name()) {
                for tool in &entry.tools {
                    *name_counts.entry(tool.name.as_str()).or_default() += 1;
                }
            }
        }

        let mut catalog = Vec::new();
        for server in servers.iter().filter(|s| s.is_ready()) {
            let Some(entry) = cache.get(server.name()) else {
                continue;
            };
            for tool in &entry.tools {
                let advertised = if name_counts.get(tool.name.as_str()) == Some(&1) {
                    tool.name.clone()
                } else {
                    tool.qualified_name()
                };
                catalog.push(AdvertisedTool::new(advertised, tool.clone()));
            }
        }
        catalog
    }

    /// Map a name the LLM used back to a server and tool.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedTool, RegistryError> {
        self.refresh().await;

        let servers = self.servers.read().unwrap_or_else(|e| e.into_inner());
        let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());

        let mut qualified = Vec::new();
        let mut bare = Vec::new();
        for (server_name, server) in servers.iter() {
            let Some(entry) = cache.get(server_name) else {
                continue;
            };
            for tool in &entry.tools {
                let target = || ResolvedTool {
                    descriptor: tool.clone(),
                    server: Arc::clone(server),
                };
                if tool.qualified_name() == name {
                    qualified.push(target());
                } else if tool.name == name {
                    bare.push(target());
                }
            }
        }

        let mut matches = if qualified.is_empty() { bare } else { qualified };
        match matches.len() {
            0 => Err(RegistryError::NotFound {
                name: name.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(RegistryError::Ambiguous {
                name: name.to_string(),
                servers: matches.into_iter().map(|m| m.descriptor.server).collect(),
            }),
        }
    }
}
