//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::options::{RequestedMode, Resolution};

/// Display session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Virtual terminal of the text console
    pub text_vt: u32,

    /// Virtual terminal of the local graphical session
    pub local_vt: u32,

    /// Virtual terminal of the headless (remote desktop) session
    pub headless_vt: u32,

    /// Virtual monitor size of the headless session
    pub headless_resolution: Resolution,

    /// Display startup budget in seconds when `inst.xtimeout` is not given
    pub startup_timeout_secs: u64,

    /// How long to wait for the display configuration service before
    /// giving up on setting the requested resolution (seconds)
    pub readiness_timeout_secs: u64,

    /// Pause after a fallback message so it can be read (milliseconds)
    pub fallback_delay_ms: u64,

    /// Root under which the video driver configuration is written
    pub driver_root: PathBuf,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            text_vt: 1,
            local_vt: 6,
            headless_vt: 7,
            headless_resolution: Resolution::new(1280, 1024),
            startup_timeout_secs: 60,
            readiness_timeout_secs: 30,
            fallback_delay_ms: 2000,
            driver_root: PathBuf::from("/"),
        }
    }
}

/// Wayland compositor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Session wrapper placed in front of the compositor.
    /// `{vt}` is replaced with the virtual terminal number.
    pub session_wrapper: Vec<String>,

    /// Compositor command line. `{socket}` is replaced with the socket name.
    pub command: Vec<String>,

    /// Extra arguments for headless operation.
    /// `{resolution}` is replaced with the virtual monitor size.
    pub headless_args: Vec<String>,

    /// Wayland socket name, created under `XDG_RUNTIME_DIR`
    pub socket_name: String,

    /// Installer data directory (`ANACONDA_DATADIR` overrides it)
    pub data_dir: PathBuf,

    /// Start a user instance of systemd (and with it a session bus)
    pub start_user_systemd: bool,

    /// User systemd command line
    pub systemd_command: Vec<String>,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            session_wrapper: [
                "/usr/libexec/anaconda/run-in-new-session",
                "--user",
                "root",
                "--service",
                "anaconda",
                "--vt",
                "{vt}",
                "--session-type",
                "wayland",
                "--session-class",
                "user",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            command: [
                "gnome-kiosk",
                "--sm-disable",
                "--wayland",
                "--no-x11",
                "--wayland-display",
                "{socket}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            headless_args: ["--headless", "--virtual-monitor", "{resolution}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            socket_name: "wl-sysinstall-0".to_string(),
            data_dir: PathBuf::from("/usr/share/anaconda"),
            start_user_systemd: true,
            systemd_command: vec!["/usr/lib/systemd/systemd".to_string(), "--user".to_string()],
        }
    }
}

/// Memory thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Minimum memory to run the installer at all (MiB)
    pub min_ram_mib: u64,

    /// Minimum memory for a graphical session (MiB)
    pub min_gui_ram_mib: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_ram_mib: 320,
            min_gui_ram_mib: 410,
        }
    }
}

/// Remote desktop (GNOME Remote Desktop) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteDesktopConfig {
    /// Remote desktop control tool; its absence disables the RDP question
    pub grdctl_path: PathBuf,

    /// Remote desktop daemon
    pub daemon_path: PathBuf,

    /// Directory for the generated TLS certificate and key
    pub cert_dir: PathBuf,

    /// RDP port advertised in the connection information
    pub port: u16,

    /// Certificate validity (days)
    pub cert_validity_days: u32,
}

impl Default for RemoteDesktopConfig {
    fn default() -> Self {
        Self {
            grdctl_path: PathBuf::from("/usr/bin/grdctl"),
            daemon_path: PathBuf::from("/usr/libexec/gnome-remote-desktop-daemon"),
            cert_dir: PathBuf::from("/root/.local/share/gnome-remote-desktop"),
            port: 3389,
            cert_validity_days: 720,
        }
    }
}

/// User interface capabilities and launch commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// The graphical interface is installed
    pub graphical_available: bool,

    /// The web interface is installed; it is always able to run
    pub webui: bool,

    /// Command launched for graphical and remote sessions
    pub graphical_command: Vec<String>,

    /// Command launched for text sessions
    pub text_command: Vec<String>,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            graphical_available: true,
            webui: false,
            graphical_command: vec!["/usr/bin/anaconda".to_string(), "--graphical".to_string()],
            text_command: vec!["/usr/bin/anaconda".to_string(), "--text".to_string()],
        }
    }
}

/// Stored installer configuration (what a kickstart file would carry)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Display mode written in the stored configuration
    pub display_mode: Option<RequestedMode>,

    /// The installation is fully automated
    pub automated: bool,

    /// Stored remote desktop settings
    pub rdp: RdpData,
}

/// Remote desktop settings as stored in the installer configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RdpData {
    /// Whether RDP is enabled
    pub enabled: bool,

    /// Host address the RDP server runs on
    pub host: String,

    /// RDP port, -1 when not set
    pub port: i32,

    /// User name used by the RDP client
    pub username: String,

    /// Password required to connect
    #[serde(with = "secret_string")]
    pub password: Zeroizing<String>,
}

impl Default for RdpData {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: -1,
            username: String::new(),
            password: Zeroizing::new(String::new()),
        }
    }
}

impl fmt::Debug for RdpData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RdpData")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

mod secret_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use zeroize::Zeroizing;

    pub(super) fn serialize<S: Serializer>(
        value: &Zeroizing<String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_str())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Zeroizing<String>, D::Error> {
        String::deserialize(deserializer).map(Zeroizing::new)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is not set
    pub level: String,

    /// Log directory (None = stdout only)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}
