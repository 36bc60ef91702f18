//! Full bring-up with a real compositor launcher and console prompter
//!
//! The local compositor never becomes ready, the user accepts the remote
//! desktop offer on the console and the headless compositor comes up.

use async_trait::async_trait;
use installer_session::config::{Config, MemoryConfig};
use installer_session::display::{
    DisplayReadiness, KioskLauncher, ResolutionSetter, VirtualTerminal,
};
use installer_session::interface::UserInterface;
use installer_session::options::{BootOptions, Resolution, SessionOptions, TargetKind};
use installer_session::process::ChildSupervisor;
use installer_session::prompt::{ConsolePrompter, LineSource};
use installer_session::remote::RemoteDesktopServer;
use installer_session::session::{
    Credentials, DisplayMode, EnvironmentFacts, FactsProvider, SelectorSettings, SessionDecision,
    SessionSelector, SessionServices, StartupMemoryCheck,
};
use installer_session::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Console input played back line by line
struct Keyboard {
    lines: Mutex<VecDeque<&'static str>>,
    screen: Mutex<Vec<String>>,
}

impl Keyboard {
    fn typing(lines: &[&'static str]) -> Self {
        Self {
            lines: Mutex::new(lines.iter().copied().collect()),
            screen: Mutex::new(Vec::new()),
        }
    }

    fn next(&self) -> io::Result<String> {
        self.lines
            .lock()
            .pop_front()
            .map(str::to_string)
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
    }
}

impl LineSource for Keyboard {
    fn write_line(&self, text: &str) -> io::Result<()> {
        self.screen.lock().push(text.to_string());
        Ok(())
    }

    fn read_line(&self) -> io::Result<String> {
        self.next()
    }

    fn read_secret(&self) -> io::Result<String> {
        self.next()
    }
}

struct Facts;

#[async_trait]
impl FactsProvider for Facts {
    async fn gather(&self) -> EnvironmentFacts {
        EnvironmentFacts {
            total_memory_mib: 4096,
            min_gui_memory_mib: 410,
            network_connecting: false,
            network_connected: true,
            automated_install: false,
            text_requested_in_config: false,
            rd_tooling_available: true,
            graphical_ui_available: true,
            webui_available: false,
            headless_hardware: false,
            preexisting_display: false,
        }
    }
}

#[derive(Default)]
struct Remote {
    started_as: Arc<Mutex<Option<String>>>,
    credentials: Credentials,
}

#[async_trait]
impl RemoteDesktopServer for Remote {
    fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    async fn start(&mut self) -> Result<()> {
        *self.started_as.lock() = Some(self.credentials.username.clone());
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Console {
    switched_to: Mutex<Vec<u32>>,
    started: Mutex<Vec<DisplayMode>>,
}

impl VirtualTerminal for Console {
    fn activate(&self, vt: u32) -> Result<()> {
        self.switched_to.lock().push(vt);
        Ok(())
    }
}

#[async_trait]
impl UserInterface for Console {
    async fn initialize(&self, decision: &SessionDecision) -> Result<()> {
        self.started.lock().push(decision.mode);
        Ok(())
    }

    fn reinitialize_locale(&self) -> Result<()> {
        Ok(())
    }
}

struct NoDisplayConfig;

#[async_trait]
impl DisplayReadiness for NoDisplayConfig {
    async fn wait_ready(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ResolutionSetter for NoDisplayConfig {
    async fn set_resolution(&self, _resolution: Resolution) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_local_timeout_then_remote_desktop_over_console() {
    let runtime = TempDir::new().unwrap();

    // Only the headless variant (which gets a resolution argument) comes up
    let mut config = Config::default();
    config.compositor.session_wrapper = Vec::new();
    config.compositor.command = [
        "sh",
        "-c",
        "[ -n \"$1\" ] && touch \"$XDG_RUNTIME_DIR/$0\"; sleep 5",
        "{socket}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    config.compositor.headless_args = vec!["{resolution}".to_string()];
    config.compositor.start_user_systemd = false;

    let supervisor = ChildSupervisor::new();
    let keyboard = Arc::new(Keyboard::typing(&["1", "installer", "secret1", "secret1"]));
    let console = Arc::new(Console::default());
    let remote = Remote::default();
    let started_as = Arc::clone(&remote.started_as);

    let services = SessionServices {
        facts: Arc::new(Facts),
        prompter: Arc::new(ConsolePrompter::new(keyboard.clone(), 80)),
        display: Arc::new(KioskLauncher::new(
            &config,
            Arc::new(supervisor.clone()),
            runtime.path().to_path_buf(),
        )),
        remote: Box::new(remote),
        vt: console.clone(),
        memory: Arc::new(StartupMemoryCheck::new(&MemoryConfig::default(), true)),
        interface: console.clone(),
        readiness: Arc::new(NoDisplayConfig),
        resolution: Arc::new(NoDisplayConfig),
    };

    let options = SessionOptions::resolve(
        BootOptions::parse("inst.xtimeout=1"),
        TargetKind::Hardware,
        Duration::from_secs(60),
    );
    let mut settings = SelectorSettings::from_config(&config);
    settings.fallback_delay = Duration::ZERO;

    let mut selector = SessionSelector::new(options, settings, services);
    let decision = selector.select_and_start_session().await.unwrap();

    assert_eq!(decision.mode, DisplayMode::RemoteGraphical);
    assert!(decision.graphical_failed);
    assert_eq!(started_as.lock().as_deref(), Some("installer"));
    assert_eq!(*console.switched_to.lock(), vec![1]);
    assert_eq!(*console.started.lock(), vec![DisplayMode::RemoteGraphical]);

    let screen = keyboard.screen.lock().join("\n");
    assert!(screen.contains("1) Start RDP"));

    // The timed-out local compositor is gone, the headless one runs
    for _ in 0..50 {
        if supervisor.running_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(supervisor.running_count(), 1);
}

#[tokio::test]
async fn test_rescue_mode_starts_nothing() {
    let config = Config::default();
    let supervisor = ChildSupervisor::new();
    let console = Arc::new(Console::default());

    let services = SessionServices {
        facts: Arc::new(Facts),
        prompter: Arc::new(ConsolePrompter::new(Arc::new(Keyboard::typing(&[])), 80)),
        display: Arc::new(KioskLauncher::new(
            &config,
            Arc::new(supervisor.clone()),
            std::env::temp_dir(),
        )),
        remote: Box::new(Remote::default()),
        vt: console.clone(),
        memory: Arc::new(StartupMemoryCheck::new(&MemoryConfig::default(), false)),
        interface: console.clone(),
        readiness: Arc::new(NoDisplayConfig),
        resolution: Arc::new(NoDisplayConfig),
    };

    let options = SessionOptions::resolve(
        BootOptions::parse("inst.rescue"),
        TargetKind::Hardware,
        Duration::from_secs(60),
    );

    let mut selector =
        SessionSelector::new(options, SelectorSettings::from_config(&config), services);
    selector.select_and_start_session().await.unwrap();

    assert_eq!(supervisor.running_count(), 0);
    assert!(console.started.lock().is_empty());
}
