//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - CLI arguments
//!
//! Boot command line options are not configuration; they are resolved
//! separately into [`crate::options::SessionOptions`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod types;

pub use types::{
    CompositorConfig, DisplayConfig, InstallerConfig, InterfaceConfig, LoggingConfig,
    MemoryConfig, RdpData, RemoteDesktopConfig,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Display session configuration
    #[serde(default)]
    pub display: DisplayConfig,
    /// Compositor configuration
    #[serde(default)]
    pub compositor: CompositorConfig,
    /// Memory thresholds
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Remote desktop configuration
    #[serde(default)]
    pub remote_desktop: RemoteDesktopConfig,
    /// User interface configuration
    #[serde(default)]
    pub interface: InterfaceConfig,
    /// Stored installer configuration
    #[serde(default)]
    pub installer: InstallerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.compositor.command.is_empty() {
            anyhow::bail!("Compositor command must not be empty");
        }

        if self.compositor.socket_name.is_empty() || self.compositor.socket_name.contains('/') {
            anyhow::bail!("Invalid Wayland socket name: {:?}", self.compositor.socket_name);
        }

        if self.compositor.start_user_systemd && self.compositor.systemd_command.is_empty() {
            anyhow::bail!("User systemd is enabled but its command is empty");
        }

        let display = &self.display;
        if display.text_vt == 0 || display.local_vt == 0 || display.headless_vt == 0 {
            anyhow::bail!("Virtual terminal numbers start at 1");
        }

        if display.local_vt == display.text_vt || display.headless_vt == display.text_vt {
            anyhow::bail!(
                "Graphical sessions must not share the text console VT ({})",
                display.text_vt
            );
        }

        if display.headless_vt == display.local_vt {
            anyhow::bail!(
                "Headless session VT must differ from the local session VT ({})",
                display.local_vt
            );
        }

        if display.startup_timeout_secs == 0 {
            anyhow::bail!("Display startup timeout must be positive");
        }

        if self.memory.min_ram_mib == 0 || self.memory.min_gui_ram_mib == 0 {
            anyhow::bail!("Memory thresholds must be positive");
        }

        if self.memory.min_gui_ram_mib < self.memory.min_ram_mib {
            anyhow::bail!(
                "min_gui_ram_mib ({}) cannot be lower than min_ram_mib ({})",
                self.memory.min_gui_ram_mib,
                self.memory.min_ram_mib
            );
        }

        if self.interface.graphical_command.is_empty() || self.interface.text_command.is_empty() {
            anyhow::bail!("Interface commands must not be empty");
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Invalid log level: {}", other),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, data_dir: Option<PathBuf>, driver_root: Option<PathBuf>) -> Self {
        if let Some(data_dir) = data_dir {
            self.compositor.data_dir = data_dir;
        }

        if let Some(driver_root) = driver_root {
            self.display.driver_root = driver_root;
        }

        self
    }

    /// Default display startup budget
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.display.startup_timeout_secs)
    }

    /// Pause after a user-facing fallback message
    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.display.fallback_delay_ms)
    }

    /// Budget for the display configuration service to appear
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.display.readiness_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{RequestedMode, Resolution};

    #[test]
    fn test_default_config() {
        let config = Config::default_config().unwrap();
        assert_eq!(config.display.local_vt, 6);
        assert_eq!(config.display.text_vt, 1);
        assert_eq!(config.display.headless_resolution, Resolution::new(1280, 1024));
        assert_eq!(config.compositor.socket_name, "wl-sysinstall-0");
        assert_eq!(config.startup_timeout(), Duration::from_secs(60));
        assert_eq!(config.installer.rdp.port, -1);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
            [display]
            headless_resolution = "1920x1080"
            fallback_delay_ms = 0

            [installer]
            display_mode = "text"
            automated = true

            [installer.rdp]
            enabled = true
            username = "admin"
            password = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.display.headless_resolution, Resolution::new(1920, 1080));
        assert_eq!(config.display.local_vt, 6);
        assert_eq!(config.installer.display_mode, Some(RequestedMode::Text));
        assert!(config.installer.automated);
        assert!(config.installer.rdp.enabled);
        assert_eq!(config.installer.rdp.password.as_str(), "secret");
        assert!(!format!("{:?}", config.installer.rdp).contains("secret"));
    }

    #[test]
    fn test_config_validation_vt_collision() {
        let mut config = Config::default_config().unwrap();
        config.display.headless_vt = config.display.local_vt;
        assert!(config.validate().is_err());

        let mut config = Config::default_config().unwrap();
        config.display.local_vt = config.display.text_vt;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_memory() {
        let mut config = Config::default_config().unwrap();
        config.memory.min_gui_ram_mib = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_resolution() {
        let result = Config::from_toml(
            r#"
            [display]
            headless_resolution = "big"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default_config().unwrap();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::default_config()
            .unwrap()
            .with_overrides(Some(PathBuf::from("/tmp/data")), None);
        assert_eq!(config.compositor.data_dir, PathBuf::from("/tmp/data"));
        assert_eq!(config.display.driver_root, PathBuf::from("/"));
    }
}
