//! Display session bring-up
//!
//! Starts the kiosk compositor either on the local display or headless with
//! a virtual monitor for remote desktop access, and the user session bus
//! both of them need.
//!
//! # Startup
//!
//! ```text
//! ensure_session_bus ──> systemd --user, DBUS_SESSION_BUS_ADDRESS
//! start_local / start_headless
//!     spawn compositor (SIGINT ignored) ──> watch
//!     wait: socket appears | compositor exits | timeout
//!     failure ──> unwatch + terminate
//! ```

pub mod environment;
pub mod resolution;
pub mod vt;
pub mod xdriver;

pub use resolution::{DisplayReadiness, MutterDisplayConfig, ResolutionSetter};
pub use vt::{ConsoleVt, VirtualTerminal};
pub use xdriver::write_xdriver;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::options::Resolution;
use crate::process::{wait_for_socket, ChildExit, ProcessHandle, ProcessSupervisor, SpawnSpec};

/// Starts display sessions
#[async_trait]
pub trait DisplayLauncher: Send + Sync {
    /// Start the user session bus; later calls do nothing
    async fn ensure_session_bus(&self) -> Result<()>;

    /// Start the compositor on the local display
    async fn start_local(&self, timeout: Duration) -> Result<()>;

    /// Start the compositor headless with a virtual monitor
    async fn start_headless(&self, timeout: Duration, resolution: Resolution) -> Result<()>;
}

/// Launcher for the kiosk compositor
pub struct KioskLauncher {
    config: crate::config::CompositorConfig,
    local_vt: u32,
    headless_vt: u32,
    runtime_dir: PathBuf,
    data_dir: PathBuf,
    supervisor: Arc<dyn ProcessSupervisor>,
    session_bus_started: AtomicBool,
}

impl KioskLauncher {
    /// Create a launcher using `runtime_dir` for sockets
    pub fn new(config: &Config, supervisor: Arc<dyn ProcessSupervisor>, runtime_dir: PathBuf) -> Self {
        let data_dir = environment::resolve_data_dir(
            &config.compositor.data_dir,
            std::env::var(environment::DATADIR_ENV).ok().as_deref(),
        );

        Self {
            config: config.compositor.clone(),
            local_vt: config.display.local_vt,
            headless_vt: config.display.headless_vt,
            runtime_dir,
            data_dir,
            supervisor,
            session_bus_started: AtomicBool::new(false),
        }
    }

    /// Create a launcher for the current user's runtime directory
    pub fn from_env(config: &Config, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        let runtime_dir = environment::runtime_dir(
            std::env::var("XDG_RUNTIME_DIR").ok().as_deref(),
            nix::unistd::getuid().as_raw(),
        );
        Self::new(config, supervisor, runtime_dir)
    }

    /// Path of the compositor's Wayland socket
    pub fn socket_path(&self) -> PathBuf {
        self.runtime_dir.join(&self.config.socket_name)
    }

    /// Name the compositor is watched under
    pub fn compositor_name(&self) -> String {
        self.config
            .command
            .first()
            .map(|program| {
                Path::new(program)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| program.clone())
            })
            .unwrap_or_else(|| "compositor".to_string())
    }

    /// Full compositor command line
    pub fn command_line(&self, vt: u32, headless: Option<Resolution>) -> Vec<String> {
        let vars = [
            ("vt", vt.to_string()),
            ("socket", self.config.socket_name.clone()),
            (
                "resolution",
                headless.map(|r| r.to_string()).unwrap_or_default(),
            ),
        ];

        let mut argv = environment::expand_argv(&self.config.session_wrapper, &vars);
        argv.extend(environment::expand_argv(&self.config.command, &vars));
        if headless.is_some() {
            argv.extend(environment::expand_argv(&self.config.headless_args, &vars));
        }
        argv
    }

    fn compositor_spec(&self, vt: u32, headless: Option<Resolution>) -> SpawnSpec {
        let data_dirs = environment::data_dirs(
            &self.data_dir,
            std::env::var("XDG_DATA_DIRS").ok().as_deref(),
        );
        let config_dirs = environment::config_dirs(
            &self.data_dir,
            std::env::var("XDG_CONFIG_DIRS").ok().as_deref(),
        );

        SpawnSpec::new(self.command_line(vt, headless))
            .env("XDG_DATA_DIRS", data_dirs)
            .env("XDG_CONFIG_DIRS", config_dirs)
            .env("XDG_RUNTIME_DIR", self.runtime_dir.display().to_string())
            .ignore_sigint()
    }

    async fn launch(&self, vt: u32, headless: Option<Resolution>, timeout: Duration) -> Result<()> {
        let name = self.compositor_name();
        let socket = self.socket_path();

        match headless {
            Some(resolution) => info!("Starting {} headless ({}) on VT{}", name, resolution, vt),
            None => info!("Starting {} on VT{}", name, vt),
        }

        std::env::set_var("XDG_SESSION_TYPE", "wayland");

        // Only a socket created by this compositor counts as ready
        remove_stale_socket(&socket)?;

        // Subscribe first so an immediate exit is not missed
        let mut exits = self.supervisor.subscribe_exits();
        let handle = self.supervisor.spawn(&self.compositor_spec(vt, headless))?;
        if let Err(e) = self.supervisor.watch(&handle, &name) {
            self.cancel(&handle);
            return Err(e);
        }

        let result = tokio::select! {
            ready = wait_for_socket(&socket, timeout) => ready.map_err(|_| SessionError::StartupTimeout {
                what: name.clone(),
                timeout,
            }),
            exit = wait_for_exit(&mut exits, handle.pid) => {
                Err(SessionError::startup_failed(&name, format!("exited with {}", exit.status)))
            }
        };

        match result {
            Ok(()) => {
                std::env::set_var("WAYLAND_DISPLAY", &self.config.socket_name);
                info!("{} is ready on {}", name, socket.display());
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                self.cancel(&handle);
                Err(e)
            }
        }
    }

    fn cancel(&self, handle: &ProcessHandle) {
        self.supervisor.unwatch(handle);
        if let Err(e) = self.supervisor.terminate(handle) {
            error!("Failed to terminate {} (PID {}): {}", handle.program, handle.pid, e);
        }
    }
}

/// Remove a socket left behind by an earlier compositor
fn remove_stale_socket(socket: &Path) -> Result<()> {
    match std::fs::remove_file(socket) {
        Ok(()) => {
            warn!("Removed stale Wayland socket {}", socket.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Wait for the exit of `pid` among the broadcast exits
async fn wait_for_exit(exits: &mut broadcast::Receiver<ChildExit>, pid: u32) -> ChildExit {
    loop {
        match exits.recv().await {
            Ok(exit) if exit.pid == pid => return exit,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

#[async_trait]
impl DisplayLauncher for KioskLauncher {
    async fn ensure_session_bus(&self) -> Result<()> {
        if !self.config.start_user_systemd {
            debug!("User systemd disabled, not starting a session bus");
            return Ok(());
        }

        if self.session_bus_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let spec = SpawnSpec::new(self.config.systemd_command.clone())
            .env("XDG_RUNTIME_DIR", self.runtime_dir.display().to_string())
            .ignore_sigint();

        let handle = match self.supervisor.spawn(&spec) {
            Ok(handle) => handle,
            Err(e) => {
                self.session_bus_started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.supervisor.watch(&handle, "systemd --user")?;

        let address = environment::session_bus_address(&self.runtime_dir);
        std::env::set_var("DBUS_SESSION_BUS_ADDRESS", &address);
        info!("Session bus: {}", address);

        Ok(())
    }

    async fn start_local(&self, timeout: Duration) -> Result<()> {
        self.launch(self.local_vt, None, timeout).await
    }

    async fn start_headless(&self, timeout: Duration, resolution: Resolution) -> Result<()> {
        self.launch(self.headless_vt, Some(resolution), timeout).await
    }
}
