//! installer-session - installer display session bring-up
//!
//! Entry point for the session binary.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use installer_session::config::{Config, LoggingConfig};
use installer_session::display::{ConsoleVt, KioskLauncher, MutterDisplayConfig};
use installer_session::interface::InterfaceLauncher;
use installer_session::network::NetworkManagerStatus;
use installer_session::options::{BootOptions, RequestedMode, SessionOptions, TargetKind};
use installer_session::process::{ChildSupervisor, ProcessSupervisor};
use installer_session::prompt::ConsolePrompter;
use installer_session::remote::GnomeRemoteDesktop;
use installer_session::session::{
    SelectorSettings, SessionSelector, SessionServices, StartupMemoryCheck, SystemFacts,
};
use installer_session::utils::{format_user_error, log_startup_diagnostics};

/// Log file name inside the configured log directory
const LOG_FILE_NAME: &str = "installer-session.log";

/// Command-line arguments for installer-session
#[derive(Parser, Debug)]
#[command(name = "installer-session")]
#[command(version, about = "Installer display session bring-up", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/installer-session/config.toml")]
    config: String,

    /// Kernel command line to read boot options from
    #[arg(long, default_value = "/proc/cmdline")]
    cmdline: PathBuf,

    /// Start in text mode
    #[arg(long, conflicts_with = "graphical")]
    text: bool,

    /// Start in graphical mode
    #[arg(long)]
    graphical: bool,

    /// Run the installer over a remote desktop (RDP) session
    #[arg(long)]
    rdp: bool,

    /// Remote desktop user name
    #[arg(long, env = "INSTALLER_RDP_USERNAME")]
    rdp_username: Option<String>,

    /// Remote desktop password
    #[arg(long, env = "INSTALLER_RDP_PASSWORD", hide_env_values = true)]
    rdp_password: Option<String>,

    /// Screen resolution of the local session (WIDTHxHEIGHT)
    #[arg(long)]
    resolution: Option<String>,

    /// Video driver override
    #[arg(long)]
    xdriver: Option<String>,

    /// Display startup timeout in seconds
    #[arg(long)]
    xtimeout: Option<u64>,

    /// Rescue mode, no installer session
    #[arg(long)]
    rescue: bool,

    /// Installation target
    #[arg(long, value_enum, default_value = "hardware")]
    target: TargetKind,

    /// Never ask questions
    #[arg(long)]
    noninteractive: bool,

    /// Skip the memory check
    #[arg(long)]
    nomemcheck: bool,

    /// Installer data directory override
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Root for the video driver configuration
    #[arg(long)]
    driver_root: Option<PathBuf>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "compact")]
    log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print system diagnostics and exit
    #[arg(long)]
    diagnose: bool,
}

impl Args {
    /// Options given on the command line, in boot option form
    fn boot_options(&self) -> BootOptions {
        let display_mode = if self.text {
            Some(RequestedMode::Text)
        } else if self.graphical {
            Some(RequestedMode::Graphical)
        } else {
            None
        };

        BootOptions {
            display_mode,
            noninteractive: self.noninteractive,
            rdp: self.rdp,
            rdp_username: self.rdp_username.clone(),
            rdp_password: self.rdp_password.clone(),
            resolution: self.resolution.clone(),
            xdriver: self.xdriver.clone(),
            xtimeout: self.xtimeout.map(|secs| secs.to_string()),
            rescue: self.rescue,
            memcheck: self.nomemcheck.then_some(false),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, config_error) = match Config::load(&args.config) {
        Ok(config) => (config, None),
        Err(e) => (Config::default_config()?, Some(e)),
    };
    let config = config.with_overrides(args.data_dir.clone(), args.driver_root.clone());

    let _log_guard = init_logging(&args, &config.logging)?;

    info!("════════════════════════════════════════════════════════");
    info!("  installer-session v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    if let Some(e) = config_error {
        warn!("Failed to load config: {:#}, using defaults", e);
    }

    if args.diagnose {
        log_startup_diagnostics(&config);
        return Ok(());
    }

    debug!("Config: {:?}", config);

    let raw = read_boot_options(&args.cmdline).merge(args.boot_options());
    let options = SessionOptions::resolve(raw, args.target, config.startup_timeout());
    info!("Session options: {:?}", options);

    let config = Arc::new(config);
    let supervisor: Arc<dyn ProcessSupervisor> = Arc::new(ChildSupervisor::new());
    let interface = Arc::new(InterfaceLauncher::new(config.interface.clone()));
    let display_config = Arc::new(MutterDisplayConfig::new());

    let services = SessionServices {
        facts: Arc::new(SystemFacts::new(
            Arc::clone(&config),
            Arc::new(NetworkManagerStatus::new()),
        )),
        prompter: Arc::new(ConsolePrompter::stdout()),
        display: Arc::new(KioskLauncher::from_env(&config, Arc::clone(&supervisor))),
        remote: Box::new(GnomeRemoteDesktop::new(
            config.remote_desktop.clone(),
            Arc::clone(&supervisor),
        )),
        vt: Arc::new(ConsoleVt::new()),
        memory: Arc::new(StartupMemoryCheck::new(&config.memory, options.memcheck)),
        interface: interface.clone(),
        readiness: display_config.clone(),
        resolution: display_config,
    };

    let mut selector = SessionSelector::new(options, SelectorSettings::from_config(&config), services);

    let decision = match selector.select_and_start_session().await {
        Ok(decision) => decision,
        Err(e) => {
            let e = anyhow::Error::new(e);
            eprintln!("{}", format_user_error(&e));
            return Err(e);
        }
    };

    info!("Session started: {:?}", decision);

    match interface.wait().await {
        Ok(Some(status)) => info!("Installer interface exited: {}", status),
        Ok(None) => info!("No installer interface was started"),
        Err(e) => warn!("Failed to wait for the installer interface: {}", e),
    }

    if let Some(task) = selector.take_resolution_task() {
        task.abort();
    }

    info!("Installer session finished");
    Ok(())
}

/// Boot options from the kernel command line; none if it cannot be read
fn read_boot_options(path: &Path) -> BootOptions {
    match std::fs::read_to_string(path) {
        Ok(cmdline) => BootOptions::parse(&cmdline),
        Err(e) => {
            warn!("Cannot read boot options from {}: {}", path.display(), e);
            BootOptions::default()
        }
    }
}

fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let log_level = match args.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // zbus is chatty at debug
        tracing_subscriber::EnvFilter::new(format!(
            "installer_session={level},zbus=warn,warn",
            level = log_level
        ))
    });

    let log_file = args
        .log_file
        .clone()
        .or_else(|| logging.log_dir.as_ref().map(|dir| dir.join(LOG_FILE_NAME)));

    // If log file is specified, write to both stdout and file
    if let Some(log_file_path) = &log_file {
        let dir = log_file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = log_file_path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid log file: {}", log_file_path.display()))?;
        std::fs::create_dir_all(dir)?;

        let (file, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            "pretty" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
        }
        info!("Logging to file: {}", log_file_path.display());

        Ok(Some(guard))
    } else {
        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            "pretty" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().compact())
                    .init();
            }
        }

        Ok(None)
    }
}
