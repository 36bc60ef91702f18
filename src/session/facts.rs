//! Environment facts queried at decision time
//!
//! Facts are gathered fresh each time they are needed; they may go stale
//! over the run and nothing caches them.

use async_trait::async_trait;
use nix::unistd::{access, AccessFlags};
use std::path::Path;
use std::sync::Arc;
use sysinfo::System;
use tracing::debug;

use crate::config::Config;
use crate::network::NetworkStatus;
use crate::options::RequestedMode;

/// Snapshot of the environment the decision depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentFacts {
    /// Total system memory (MiB)
    pub total_memory_mib: u64,

    /// Memory required for a graphical session (MiB)
    pub min_gui_memory_mib: u64,

    /// Network is being brought up
    pub network_connecting: bool,

    /// Network is up
    pub network_connected: bool,

    /// The installation is automated
    pub automated_install: bool,

    /// The stored installer configuration asks for text mode
    pub text_requested_in_config: bool,

    /// The remote desktop control tool is installed
    pub rd_tooling_available: bool,

    /// The graphical interface is installed
    pub graphical_ui_available: bool,

    /// The web interface is installed
    pub webui_available: bool,

    /// Hardware without a local display (e.g. s390x)
    pub headless_hardware: bool,

    /// A display session is already running (live media)
    pub preexisting_display: bool,
}

impl EnvironmentFacts {
    /// Memory is below the graphical minimum
    pub fn insufficient_memory(&self) -> bool {
        self.total_memory_mib < self.min_gui_memory_mib
    }

    /// Network is neither up nor coming up
    pub fn network_unavailable(&self) -> bool {
        !self.network_connecting && !self.network_connected
    }
}

/// Source of environment facts
#[async_trait]
pub trait FactsProvider: Send + Sync {
    /// Gather a fresh snapshot
    async fn gather(&self) -> EnvironmentFacts;
}

/// Facts from the running system
pub struct SystemFacts {
    config: Arc<Config>,
    network: Arc<dyn NetworkStatus>,
}

impl SystemFacts {
    /// Create a provider backed by the live system
    pub fn new(config: Arc<Config>, network: Arc<dyn NetworkStatus>) -> Self {
        Self { config, network }
    }

    fn total_memory_mib() -> u64 {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.total_memory() / 1024 / 1024
    }
}

/// Check that `path` exists and is executable
pub fn is_executable(path: &Path) -> bool {
    access(path, AccessFlags::X_OK).is_ok()
}

#[async_trait]
impl FactsProvider for SystemFacts {
    async fn gather(&self) -> EnvironmentFacts {
        let facts = EnvironmentFacts {
            total_memory_mib: Self::total_memory_mib(),
            min_gui_memory_mib: self.config.memory.min_gui_ram_mib,
            network_connecting: self.network.is_connecting().await,
            network_connected: self.network.is_connected().await,
            automated_install: self.config.installer.automated,
            text_requested_in_config: self.config.installer.display_mode
                == Some(RequestedMode::Text),
            rd_tooling_available: is_executable(&self.config.remote_desktop.grdctl_path),
            graphical_ui_available: self.config.interface.graphical_available,
            webui_available: self.config.interface.webui,
            headless_hardware: cfg!(target_arch = "s390x"),
            preexisting_display: std::env::var_os("WAYLAND_DISPLAY").is_some(),
        };

        debug!("Environment facts: {:?}", facts);
        facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_is_executable() {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("grdctl");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o644)).unwrap();
        // root may execute anything with any x bit; 0644 has none
        assert!(!is_executable(&tool));

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&tool));

        assert!(!is_executable(&dir.path().join("missing")));
    }

    #[test]
    fn test_fact_helpers() {
        let facts = EnvironmentFacts {
            total_memory_mib: 300,
            min_gui_memory_mib: 410,
            network_connecting: false,
            network_connected: false,
            automated_install: false,
            text_requested_in_config: false,
            rd_tooling_available: true,
            graphical_ui_available: true,
            webui_available: false,
            headless_hardware: false,
            preexisting_display: false,
        };

        assert!(facts.insufficient_memory());
        assert!(facts.network_unavailable());
    }
}
