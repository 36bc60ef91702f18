//! Child process supervision
//!
//! Every spawned child gets a reaper task. Children registered with
//! [`ProcessSupervisor::watch`] are expected to run for the whole install;
//! when one of them exits the exit is logged and broadcast so a pending
//! startup can stop waiting. Cancelling a startup is `unwatch` followed by
//! `terminate`.

pub mod socket;

pub use socket::wait_for_socket;

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};

/// What to spawn
#[derive(Clone, Default)]
pub struct SpawnSpec {
    /// Program and arguments
    pub argv: Vec<String>,
    /// Variables added to the inherited environment
    pub env: Vec<(String, String)>,
    /// Ignore SIGINT in the child so Ctrl-C on the console does not kill it
    pub ignore_sigint: bool,
}

impl SpawnSpec {
    /// Spawn `argv` with the inherited environment
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            ..Default::default()
        }
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Ignore SIGINT in the child
    pub fn ignore_sigint(mut self) -> Self {
        self.ignore_sigint = true;
        self
    }

    /// Program name (first argument)
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Debug for SpawnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Environment values may carry credentials
        let keys: Vec<_> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("SpawnSpec")
            .field("argv", &self.argv)
            .field("env", &keys)
            .field("ignore_sigint", &self.ignore_sigint)
            .finish()
    }
}

/// A spawned child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    /// Process ID
    pub pid: u32,
    /// Program that was started
    pub program: String,
}

/// Unexpected exit of a watched child
#[derive(Debug, Clone)]
pub struct ChildExit {
    /// Process ID
    pub pid: u32,
    /// Name it was watched under
    pub name: String,
    /// Exit status as reported by the OS
    pub status: String,
}

/// Process supervisor
pub trait ProcessSupervisor: Send + Sync {
    /// Start a child process
    fn spawn(&self, spec: &SpawnSpec) -> Result<ProcessHandle>;

    /// Register a child whose exit is unexpected
    ///
    /// Fails when the child has already exited.
    fn watch(&self, handle: &ProcessHandle, name: &str) -> Result<()>;

    /// Remove a child from the watch registry
    fn unwatch(&self, handle: &ProcessHandle);

    /// Send SIGTERM; a child that is already gone is not an error
    fn terminate(&self, handle: &ProcessHandle) -> Result<()>;

    /// The child is in the watch registry
    fn is_watched(&self, handle: &ProcessHandle) -> bool;

    /// Receive unexpected exits of watched children
    fn subscribe_exits(&self) -> broadcast::Receiver<ChildExit>;
}

#[derive(Default)]
struct Registry {
    /// Children not yet reaped, by PID
    running: HashMap<u32, String>,
    /// Watched children, by PID
    watched: HashMap<u32, String>,
}

/// Supervisor backed by tokio child processes
#[derive(Clone)]
pub struct ChildSupervisor {
    registry: Arc<Mutex<Registry>>,
    exits: broadcast::Sender<ChildExit>,
}

impl ChildSupervisor {
    /// Create an empty supervisor
    pub fn new() -> Self {
        let (exits, _) = broadcast::channel(16);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            exits,
        }
    }

    /// Number of children not yet reaped
    pub fn running_count(&self) -> usize {
        self.registry.lock().running.len()
    }

    fn reap(&self, pid: u32, program: String, mut child: tokio::process::Child) {
        let registry = Arc::clone(&self.registry);
        let exits = self.exits.clone();

        tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(status) => status.to_string(),
                Err(e) => format!("unknown ({})", e),
            };

            let watched_as = {
                let mut registry = registry.lock();
                registry.running.remove(&pid);
                registry.watched.remove(&pid)
            };

            match watched_as {
                Some(name) => {
                    warn!("{} (PID {}) exited unexpectedly: {}", name, pid, status);
                    // No subscribers is fine
                    let _ = exits.send(ChildExit { pid, name, status });
                }
                None => debug!("{} (PID {}) exited: {}", program, pid, status),
            }
        });
    }
}

impl Default for ChildSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(unsafe_code)]
fn ignore_sigint_in_child(cmd: &mut Command) {
    // SAFETY: the hook only calls signal(2), which is async-signal-safe
    unsafe {
        cmd.pre_exec(|| {
            signal::signal(Signal::SIGINT, SigHandler::SigIgn)
                .map(drop)
                .map_err(io::Error::from)
        });
    }
}

impl ProcessSupervisor for ChildSupervisor {
    fn spawn(&self, spec: &SpawnSpec) -> Result<ProcessHandle> {
        let program = spec.program().to_string();
        if program.is_empty() {
            return Err(SessionError::Spawn {
                program,
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command line"),
            });
        }

        let mut cmd = Command::new(&program);
        cmd.args(&spec.argv[1..])
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());

        if spec.ignore_sigint {
            ignore_sigint_in_child(&mut cmd);
        }

        let child = cmd.spawn().map_err(|source| SessionError::Spawn {
            program: program.clone(),
            source,
        })?;

        let pid = child.id().ok_or_else(|| {
            SessionError::startup_failed(&program, "child exited before its PID was known")
        })?;

        info!("Started {} (PID {})", program, pid);

        self.registry.lock().running.insert(pid, program.clone());
        self.reap(pid, program.clone(), child);

        Ok(ProcessHandle { pid, program })
    }

    fn watch(&self, handle: &ProcessHandle, name: &str) -> Result<()> {
        let mut registry = self.registry.lock();
        if !registry.running.contains_key(&handle.pid) {
            return Err(SessionError::startup_failed(name, "exited before it could be watched"));
        }

        debug!("Watching {} (PID {})", name, handle.pid);
        registry.watched.insert(handle.pid, name.to_string());
        Ok(())
    }

    fn unwatch(&self, handle: &ProcessHandle) {
        if let Some(name) = self.registry.lock().watched.remove(&handle.pid) {
            debug!("No longer watching {} (PID {})", name, handle.pid);
        }
    }

    fn terminate(&self, handle: &ProcessHandle) -> Result<()> {
        if !self.registry.lock().running.contains_key(&handle.pid) {
            return Ok(());
        }

        let pid = i32::try_from(handle.pid)
            .map_err(|_| SessionError::startup_failed(&handle.program, "PID out of range"))?;

        info!("Terminating {} (PID {})", handle.program, handle.pid);
        match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_watched(&self, handle: &ProcessHandle) -> bool {
        self.registry.lock().watched.contains_key(&handle.pid)
    }

    fn subscribe_exits(&self) -> broadcast::Receiver<ChildExit> {
        self.exits.subscribe()
    }
}
