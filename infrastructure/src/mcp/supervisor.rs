//! Server process supervision.
//!
//! The [`ProcessSupervisor`] launches one child per configured server,
//! forwards its stderr to tracing, reports health, terminates gracefully
//! and restarts with exponential backoff.
//!
//! Children are tied to our lifetime three ways: `kill_on_drop`, the
//! [`ProcessGuard`] owned by each transport, and on Linux
//! `PR_SET_PDEATHSIG` so the kernel signals them if we die without
//! unwinding.

use crate::mcp::error::SupervisorError;
use crate::mcp::resolver::{LaunchSpec, ServerResolver};
use crate::mcp::transport::Transport;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, warn};

/// Poll interval while waiting for a child to exit.
const EXIT_POLL: Duration = Duration::from_millis(25);

/// How long to wait for a force-killed child to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Shared handle on a running child.
#[derive(Clone)]
pub struct ChildHandle {
    child: Arc<std::sync::Mutex<Child>>,
    pid: Option<u32>,
}

impl ChildHandle {
    fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Arc::new(std::sync::Mutex::new(child)),
            pid,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status if the child has exited.
    pub fn try_wait(&self) -> Option<ExitStatus> {
        match self.lock().try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Supervisor: cannot query child {:?}: {}", self.pid, e);
                None
            }
        }
    }

    pub fn start_kill(&self) {
        if let Err(e) = self.lock().start_kill() {
            debug!("Supervisor: kill of {:?} failed: {}", self.pid, e);
        }
    }

    /// Ask the child to exit (SIGTERM on unix, kill elsewhere).
    fn request_exit(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            // SAFETY: plain kill(2) on a pid we spawned and have not reaped.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc == 0 {
                return;
            }
        }
        self.start_kill();
    }

    async fn wait_for_exit(&self, limit: Duration) -> Option<ExitStatus> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if let Some(status) = self.try_wait() {
                return Some(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }
}

/// Kills the child on drop unless it has already exited.
pub struct ProcessGuard {
    server: String,
    handle: ChildHandle,
}

impl ProcessGuard {
    pub fn new(server: impl Into<String>, handle: ChildHandle) -> Self {
        Self {
            server: server.into(),
            handle,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.pid()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if self.handle.try_wait().is_none() {
            debug!(server = %self.server, "Supervisor: releasing process {:?}", self.handle.pid());
            self.handle.start_kill();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessHealth {
    Running,
    /// Exit code, `None` when killed by a signal
    Exited(Option<i32>),
    Unknown,
}

impl std::fmt::Display for ProcessHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessHealth::Running => write!(f, "running"),
            ProcessHealth::Exited(Some(code)) => write!(f, "exited ({code})"),
            ProcessHealth::Exited(None) => write!(f, "exited (signal)"),
            ProcessHealth::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<ExitStatus> for ProcessHealth {
    fn from(status: ExitStatus) -> Self {
        ProcessHealth::Exited(status.code())
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// How long a fresh child must survive to count as launched
    pub launch_probe: Duration,
    /// Time between SIGTERM and kill
    pub grace_period: Duration,
    pub max_restarts: u32,
    /// First restart delay; doubles on every further attempt
    pub restart_base_delay: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            launch_probe: Duration::from_millis(150),
            grace_period: Duration::from_secs(5),
            max_restarts: 3,
            restart_base_delay: Duration::from_secs(1),
        }
    }
}

impl SupervisorOptions {
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_launch_probe(mut self, probe: Duration) -> Self {
        self.launch_probe = probe;
        self
    }

    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = max;
        self
    }

    pub fn with_restart_base_delay(mut self, delay: Duration) -> Self {
        self.restart_base_delay = delay;
        self
    }

    /// Delay before restart attempt `attempt` (1-based).
    pub fn restart_delay(&self, attempt: u32) -> Duration {
        self.restart_base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[derive(Default)]
struct ProcessTable {
    processes: HashMap<String, ChildHandle>,
    restarts: HashMap<String, u32>,
}

pub struct ProcessSupervisor {
    resolver: ServerResolver,
    options: SupervisorOptions,
    table: std::sync::Mutex<ProcessTable>,
}

impl ProcessSupervisor {
    pub fn new(resolver: ServerResolver, options: SupervisorOptions) -> Self {
        Self {
            resolver,
            options,
            table: std::sync::Mutex::new(ProcessTable::default()),
        }
    }

    fn table(&self) -> MutexGuard<'_, ProcessTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn resolver(&self) -> &ServerResolver {
        &self.resolver
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Launch `server` and return a transport over its stdio.
    pub async fn spawn(&self, server: &str) -> Result<Transport, SupervisorError> {
        let launch = self.resolver.resolve(server)?;
        info!(server, "Supervisor: launching {}", launch.command_line());

        let mut child = Self::command(&launch)
            .spawn()
            .map_err(|e| SupervisorError::LaunchFailure {
                server: server.to_string(),
                reason: format!("cannot start '{}': {}", launch.program.display(), e),
            })?;

        let missing = |pipe: &str| SupervisorError::LaunchFailure {
            server: server.to_string(),
            reason: format!("child {pipe} was not captured"),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(server.to_string(), stderr);
        }

        let handle = ChildHandle::new(child);

        if !self.options.launch_probe.is_zero() {
            tokio::time::sleep(self.options.launch_probe).await;
            if let Some(status) = handle.try_wait() {
                warn!(server, "Supervisor: exited during launch with {}", status);
                return Err(SupervisorError::LaunchFailure {
                    server: server.to_string(),
                    reason: format!("exited immediately with {status}"),
                });
            }
        }

        debug!(server, pid = ?handle.pid(), "Supervisor: process started");
        let previous = self
            .table()
            .processes
            .insert(server.to_string(), handle.clone());
        if let Some(previous) = previous
            && previous.try_wait().is_none()
        {
            warn!(server, "Supervisor: replacing a still-running process");
            previous.start_kill();
        }

        Ok(Transport::new(stdout, stdin, launch.framing)
            .with_process(ProcessGuard::new(server, handle)))
    }

    fn command(launch: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&launch.program);
        cmd.args(&launch.args)
            .envs(&launch.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &launch.cwd {
            cmd.current_dir(cwd);
        }

        // Linux: request kernel to send SIGTERM to child when parent dies.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        cmd
    }

    pub fn health(&self, server: &str) -> ProcessHealth {
        let handle = self.table().processes.get(server).cloned();
        match handle {
            Some(handle) => match handle.try_wait() {
                Some(status) => status.into(),
                None => ProcessHealth::Running,
            },
            None => ProcessHealth::Unknown,
        }
    }

    /// Stop `server`: SIGTERM, wait the grace period, then kill.
    pub async fn terminate(&self, server: &str) -> Result<ProcessHealth, SupervisorError> {
        let handle = self
            .table()
            .processes
            .get(server)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownServer(server.to_string()))?;

        if let Some(status) = handle.try_wait() {
            return Ok(status.into());
        }

        debug!(server, "Supervisor: terminating");
        handle.request_exit();
        if let Some(status) = handle.wait_for_exit(self.options.grace_period).await {
            info!(server, "Supervisor: exited with {}", status);
            return Ok(status.into());
        }

        warn!(
            server,
            "Supervisor: still running after {:?}, killing", self.options.grace_period
        );
        handle.start_kill();
        match handle.wait_for_exit(KILL_WAIT).await {
            Some(status) => Ok(status.into()),
            None => Ok(ProcessHealth::Unknown),
        }
    }

    pub async fn terminate_all(&self) {
        let names: Vec<String> = self.table().processes.keys().cloned().collect();
        let stops = names.iter().map(|name| self.terminate(name));
        for (name, result) in names.iter().zip(futures::future::join_all(stops).await) {
            if let Err(e) = result {
                debug!(server = %name, "Supervisor: terminate failed: {}", e);
            }
        }
    }

    /// Restart `server`, backing off exponentially between attempts.
    ///
    /// Consecutive attempts are counted until [`reset_restarts`](Self::reset_restarts)
    /// is called; past `max_restarts` this fails with `RestartExhausted`.
    pub async fn respawn(&self, server: &str) -> Result<Transport, SupervisorError> {
        if self.table().processes.contains_key(server) {
            self.terminate(server).await?;
        }

        loop {
            let attempt = {
                let mut table = self.table();
                let count = table.restarts.entry(server.to_string()).or_insert(0);
                if *count >= self.options.max_restarts {
                    return Err(SupervisorError::RestartExhausted {
                        server: server.to_string(),
                        attempts: *count,
                    });
                }
                *count += 1;
                *count
            };

            let delay = self.options.restart_delay(attempt);
            warn!(server, attempt, "Supervisor: restarting in {:?}", delay);
            tokio::time::sleep(delay).await;

            match self.spawn(server).await {
                Ok(transport) => return Ok(transport),
                Err(e @ SupervisorError::UnknownServer(_)) => return Err(e),
                Err(e) => warn!(server, attempt, "Supervisor: restart failed: {}", e),
            }
        }
    }

    /// Forget earlier restart attempts, e.g. after a successful handshake.
    pub fn reset_restarts(&self, server: &str) {
        self.table().restarts.remove(server);
    }

    pub fn restart_count(&self, server: &str) -> u32 {
        self.table().restarts.get(server).copied().unwrap_or(0)
    }
}

fn forward_stderr(server: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(server = %server, "stderr: {}", line),
                Ok(None) => break,
                Err(e) => {
                    debug!(server = %server, "stderr read failed: {}", e);
                    break;
                }
            }
        }
    });
}
