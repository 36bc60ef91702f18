//! Session options from the boot command line and CLI
//!
//! The installer is configured at boot through kernel command line
//! arguments (`inst.rdp`, `inst.text`, `inst.xtimeout=...`). The same keys
//! can be given on the installer-session command line; CLI values win.
//! [`SessionOptions`] is the resolved, immutable result.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::SessionError;

/// Startup timeout used when none is given or the given one is unusable
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Display mode requested by the user or the stored configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RequestedMode {
    /// Graphical installation
    Graphical,
    /// Text installation
    Text,
}

/// Installation target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TargetKind {
    /// Live boot on real (or virtual) hardware
    #[default]
    Hardware,
    /// Installation into a disk image
    Image,
    /// Installation into a directory
    Directory,
}

/// Screen resolution in `WIDTHxHEIGHT` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Resolution {
    /// Create a resolution
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl FromStr for Resolution {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SessionError::InvalidResolution(s.to_string());

        let (width, height) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = width.parse().map_err(|_| invalid())?;
        let height: u32 = height.parse().map_err(|_| invalid())?;

        if width == 0 || height == 0 {
            return Err(invalid());
        }

        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Raw, unvalidated options as found on the boot command line or CLI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootOptions {
    /// `inst.text` / `inst.graphical`
    pub display_mode: Option<RequestedMode>,
    /// `inst.noninteractive`
    pub noninteractive: bool,
    /// `inst.rdp`
    pub rdp: bool,
    /// `inst.rdp.username=`
    pub rdp_username: Option<String>,
    /// `inst.rdp.password=`
    pub rdp_password: Option<String>,
    /// `inst.resolution=`
    pub resolution: Option<String>,
    /// `inst.xdriver=`
    pub xdriver: Option<String>,
    /// `inst.xtimeout=`
    pub xtimeout: Option<String>,
    /// `inst.rescue`
    pub rescue: bool,
    /// `inst.memcheck` / `inst.nomemcheck`
    pub memcheck: Option<bool>,
}

impl BootOptions {
    /// Parse a kernel command line
    ///
    /// Keys may carry the `inst.` prefix or not. Unknown keys are ignored.
    pub fn parse(cmdline: &str) -> Self {
        let mut options = Self::default();

        for arg in cmdline.split_whitespace() {
            let arg = arg.strip_prefix("inst.").unwrap_or(arg);
            let (key, value) = match arg.split_once('=') {
                Some((key, value)) => (key, Some(value.to_string())),
                None => (arg, None),
            };

            match key {
                "text" => options.display_mode = Some(RequestedMode::Text),
                "graphical" => options.display_mode = Some(RequestedMode::Graphical),
                "rdp" => options.rdp = true,
                "rdp.username" => options.rdp_username = value,
                "rdp.password" => options.rdp_password = value,
                "resolution" => options.resolution = value,
                "xdriver" => options.xdriver = value,
                "xtimeout" => options.xtimeout = value,
                "rescue" => options.rescue = true,
                "noninteractive" => options.noninteractive = true,
                "memcheck" => options.memcheck = Some(true),
                "nomemcheck" => options.memcheck = Some(false),
                _ => continue,
            }

            debug!("Boot option: {}", key);
        }

        options
    }

    /// Overlay `other` on top of `self`; values set in `other` win
    pub fn merge(mut self, other: BootOptions) -> Self {
        if other.display_mode.is_some() {
            self.display_mode = other.display_mode;
        }
        self.noninteractive |= other.noninteractive;
        self.rdp |= other.rdp;
        self.rescue |= other.rescue;

        macro_rules! overlay {
            ($($field:ident),+) => {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field;
                    }
                )+
            };
        }
        overlay!(rdp_username, rdp_password, resolution, xdriver, xtimeout, memcheck);

        self
    }
}

/// Parse the startup timeout, falling back to the default on bad input
pub fn parse_startup_timeout(raw: Option<&str>, default: Duration) -> Duration {
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => {
            warn!(
                "Invalid xtimeout value '{}', using default of {}s",
                raw,
                default.as_secs()
            );
            default
        }
    }
}

/// Resolved session options
///
/// Built once from boot and CLI input, never mutated afterwards.
#[derive(Clone)]
pub struct SessionOptions {
    /// Requested display mode (`None` = installer default, graphical)
    pub display_mode: Option<RequestedMode>,
    /// Whether the user can be asked questions
    pub interactive: bool,
    /// Remote desktop requested on the boot command line
    pub rdp_enabled: bool,
    /// Remote desktop user name
    pub rdp_username: Option<String>,
    /// Remote desktop password
    pub rdp_password: Option<Zeroizing<String>>,
    /// Requested screen resolution for the local session
    pub resolution: Option<Resolution>,
    /// Video driver override
    pub xdriver: Option<String>,
    /// Display startup budget
    pub startup_timeout: Duration,
    /// Rescue mode: no installer session at all
    pub rescue: bool,
    /// Installation target
    pub target: TargetKind,
    /// Run the memory check
    pub memcheck: bool,
}

impl SessionOptions {
    /// Resolve raw options into session options
    ///
    /// Unusable values (timeout, resolution) are logged and replaced by
    /// defaults rather than rejected.
    pub fn resolve(raw: BootOptions, target: TargetKind, default_timeout: Duration) -> Self {
        let startup_timeout = parse_startup_timeout(raw.xtimeout.as_deref(), default_timeout);

        let resolution = raw.resolution.as_deref().and_then(|r| match r.parse() {
            Ok(res) => Some(res),
            Err(e) => {
                warn!("Ignoring requested resolution: {}", e);
                None
            }
        });

        Self {
            display_mode: raw.display_mode,
            interactive: !raw.noninteractive,
            rdp_enabled: raw.rdp,
            rdp_username: raw.rdp_username.filter(|u| !u.is_empty()),
            rdp_password: raw
                .rdp_password
                .filter(|p| !p.is_empty())
                .map(Zeroizing::new),
            resolution,
            xdriver: raw.xdriver.filter(|d| !d.is_empty()),
            startup_timeout,
            rescue: raw.rescue,
            target,
            memcheck: raw.memcheck.unwrap_or(true),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::resolve(
            BootOptions::default(),
            TargetKind::Hardware,
            DEFAULT_STARTUP_TIMEOUT,
        )
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("display_mode", &self.display_mode)
            .field("interactive", &self.interactive)
            .field("rdp_enabled", &self.rdp_enabled)
            .field("rdp_username", &self.rdp_username)
            .field("rdp_password", &self.rdp_password.as_ref().map(|_| "<redacted>"))
            .field("resolution", &self.resolution)
            .field("xdriver", &self.xdriver)
            .field("startup_timeout", &self.startup_timeout)
            .field("rescue", &self.rescue)
            .field("target", &self.target)
            .field("memcheck", &self.memcheck)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(
            "1280x1024".parse::<Resolution>().unwrap(),
            Resolution::new(1280, 1024)
        );
        assert_eq!(
            "800X600".parse::<Resolution>().unwrap(),
            Resolution::new(800, 600)
        );
        assert!("1280".parse::<Resolution>().is_err());
        assert!("0x600".parse::<Resolution>().is_err());
        assert!("wide x tall".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_parse_boot_cmdline() {
        let cmdline = "BOOT_IMAGE=/images/pxeboot/vmlinuz inst.stage2=hd:LABEL=x quiet \
                       inst.rdp inst.rdp.username=admin inst.resolution=1024x768 \
                       inst.xtimeout=120 inst.nomemcheck";
        let options = BootOptions::parse(cmdline);

        assert!(options.rdp);
        assert_eq!(options.rdp_username.as_deref(), Some("admin"));
        assert_eq!(options.rdp_password, None);
        assert_eq!(options.resolution.as_deref(), Some("1024x768"));
        assert_eq!(options.xtimeout.as_deref(), Some("120"));
        assert_eq!(options.memcheck, Some(false));
        assert_eq!(options.display_mode, None);
        assert!(!options.rescue);
    }

    #[test]
    fn test_unprefixed_keys_and_last_mode_wins() {
        let options = BootOptions::parse("graphical text rescue");
        assert_eq!(options.display_mode, Some(RequestedMode::Text));
        assert!(options.rescue);
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let boot = BootOptions::parse("inst.text inst.rdp.username=boot inst.xdriver=vesa");
        let cli = BootOptions {
            display_mode: Some(RequestedMode::Graphical),
            rdp_username: Some("cli".to_string()),
            ..Default::default()
        };

        let merged = boot.merge(cli);
        assert_eq!(merged.display_mode, Some(RequestedMode::Graphical));
        assert_eq!(merged.rdp_username.as_deref(), Some("cli"));
        assert_eq!(merged.xdriver.as_deref(), Some("vesa"));
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let default = Duration::from_secs(60);
        assert_eq!(parse_startup_timeout(None, default), default);
        assert_eq!(parse_startup_timeout(Some("90"), default), Duration::from_secs(90));
        assert_eq!(parse_startup_timeout(Some("soon"), default), default);
        assert_eq!(parse_startup_timeout(Some("0"), default), default);
    }

    #[test]
    fn test_resolve_drops_empty_and_invalid_values() {
        let raw = BootOptions::parse("inst.rdp.password= inst.resolution=huge inst.noninteractive");
        let options = SessionOptions::resolve(raw, TargetKind::Hardware, DEFAULT_STARTUP_TIMEOUT);

        assert!(options.rdp_password.is_none());
        assert!(options.resolution.is_none());
        assert!(!options.interactive);
        assert!(options.memcheck);
        assert_eq!(options.startup_timeout, DEFAULT_STARTUP_TIMEOUT);
    }

    #[test]
    fn test_debug_redacts_password() {
        let raw = BootOptions::parse("inst.rdp.password=hunter2");
        let options = SessionOptions::resolve(raw, TargetKind::Hardware, DEFAULT_STARTUP_TIMEOUT);
        let rendered = format!("{:?}", options);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
