//! Launch command resolution for configured servers.
//!
//! A server entry either names its command explicitly or is found by
//! convention: the first `server.py` under `mcps/<name>/src/` or under
//! `<name>/` in one of the search roots, run with the Python interpreter
//! found on `PATH`.

use crate::mcp::error::SupervisorError;
use crate::mcp::transport::Framing;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A configured server, as written in the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerSpec {
    pub name: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub framing: Framing,
}

impl ServerSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_command(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        self.command = Some(command.into());
        self.args = args;
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }
}

/// Fully resolved process launch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub server: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub framing: Framing,
}

impl LaunchSpec {
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

pub struct ServerResolver {
    specs: BTreeMap<String, ServerSpec>,
    search_roots: Vec<PathBuf>,
    interpreter: Option<PathBuf>,
}

impl ServerResolver {
    pub fn new(specs: impl IntoIterator<Item = ServerSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(|s| (s.name.clone(), s)).collect(),
            search_roots: vec![PathBuf::from(".")],
            interpreter: None,
        }
    }

    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.search_roots = roots;
        self
    }

    /// Use this interpreter instead of looking one up on `PATH`.
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Configured server names, in name order.
    pub fn server_names(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }

    pub fn spec(&self, name: &str) -> Option<&ServerSpec> {
        self.specs.get(name)
    }

    pub fn resolve(&self, name: &str) -> Result<LaunchSpec, SupervisorError> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownServer(name.to_string()))?;

        let (program, args) = match &spec.command {
            Some(command) if command.ends_with(".py") => {
                let python = self.python(name)?;
                let mut args = vec![command.clone()];
                args.extend(spec.args.iter().cloned());
                (python, args)
            }
            Some(command) => (PathBuf::from(command), spec.args.clone()),
            None => {
                let script = self.find_server_script(name).ok_or_else(|| {
                    SupervisorError::LaunchFailure {
                        server: name.to_string(),
                        reason: format!(
                            "no command configured and no server.py found in {}",
                            self.search_roots
                                .iter()
                                .map(|r| r.display().to_string())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    }
                })?;
                let python = self.python(name)?;
                let mut args = vec![script.display().to_string()];
                args.extend(spec.args.iter().cloned());
                (python, args)
            }
        };

        let launch = LaunchSpec {
            server: name.to_string(),
            program,
            args,
            env: spec.env.clone(),
            cwd: spec.cwd.clone(),
            framing: spec.framing,
        };
        debug!(server = name, "Resolved launch command: {}", launch.command_line());
        Ok(launch)
    }

    /// First `server.py` for `name` in the search roots.
    pub fn find_server_script(&self, name: &str) -> Option<PathBuf> {
        self.search_roots
            .iter()
            .find_map(|root| find_in_root(root, name))
    }

    fn python(&self, server: &str) -> Result<PathBuf, SupervisorError> {
        if let Some(p) = &self.interpreter {
            return Ok(p.clone());
        }
        which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(|e| SupervisorError::LaunchFailure {
                server: server.to_string(),
                reason: format!("no Python interpreter found: {e}"),
            })
    }
}

fn find_in_root(root: &Path, name: &str) -> Option<PathBuf> {
    let root = glob::Pattern::escape(&root.display().to_string());
    let name = glob::Pattern::escape(name);
    let patterns = [
        format!("{root}/mcps/{name}/src/**/server.py"),
        format!("{root}/{name}/**/server.py"),
    ];

    patterns.iter().find_map(|pattern| {
        let mut matches: Vec<PathBuf> = glob::glob(pattern).ok()?.filter_map(Result::ok).collect();
        matches.sort();
        matches.into_iter().next()
    })
}
