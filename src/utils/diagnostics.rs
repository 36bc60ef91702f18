//! System Diagnostics
//!
//! Startup diagnostics and the `--diagnose` report: host facts and what
//! the display session will find on this machine.

use std::path::Path;
use sysinfo::System;
use tracing::info;

use crate::config::Config;
use crate::session::facts::is_executable;

/// System information for diagnostics
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Operating system name (e.g., "Fedora Linux")
    pub os_name: String,
    /// Operating system version string
    pub os_version: String,

    /// Kernel version string
    pub kernel_version: String,

    /// Number of logical CPU cores
    pub cpu_count: usize,

    /// Total system memory in MiB
    pub total_memory_mib: u64,

    /// System hostname
    pub hostname: String,
}

impl SystemInfo {
    /// Gather system information
    pub fn gather() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        Self {
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version().unwrap_or_else(|| "Unknown".to_string()),
            cpu_count: sys.cpus().len(),
            total_memory_mib: sys.total_memory() / 1024 / 1024,
            hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Log system information
    pub fn log(&self) {
        info!("=== System Information ===");
        info!("  OS: {} {}", self.os_name, self.os_version);
        info!("  Kernel: {}", self.kernel_version);
        info!("  Hostname: {}", self.hostname);
        info!("  CPUs: {}", self.cpu_count);
        info!("  Memory: {} MiB", self.total_memory_mib);
    }
}

/// Display already provided by the environment, if any
pub fn detect_existing_display() -> Option<String> {
    if let Ok(display) = std::env::var("WAYLAND_DISPLAY") {
        return Some(format!("Wayland ({})", display));
    }

    if let Ok(display) = std::env::var("DISPLAY") {
        return Some(format!("X11 ({})", display));
    }

    None
}

/// Find `program` in `PATH` unless it is already a path
pub fn find_program(program: &str) -> Option<String> {
    which::which(program).ok().map(|p| p.display().to_string())
}

fn tool_status(path: &Path) -> &'static str {
    if is_executable(path) {
        "found"
    } else {
        "missing"
    }
}

/// Log complete diagnostics on startup
pub fn log_startup_diagnostics(config: &Config) {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║          Installer Session Diagnostics                     ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let sys_info = SystemInfo::gather();
    sys_info.log();

    info!("=== Environment ===");
    match detect_existing_display() {
        Some(found) => info!("  Display: {}", found),
        None => info!("  Display: none (console boot)"),
    }
    info!(
        "  XDG_RUNTIME_DIR: {}",
        std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "<unset>".to_string())
    );
    info!(
        "  Session bus: {}",
        std::env::var("DBUS_SESSION_BUS_ADDRESS").unwrap_or_else(|_| "<unset>".to_string())
    );

    info!("=== Tools ===");
    let compositor = config
        .compositor
        .command
        .first()
        .map(String::as_str)
        .unwrap_or("<none>");
    match find_program(compositor) {
        Some(path) => info!("  Compositor: {}", path),
        None => info!("  Compositor: {} not found", compositor),
    }
    info!(
        "  grdctl: {} ({})",
        config.remote_desktop.grdctl_path.display(),
        tool_status(&config.remote_desktop.grdctl_path)
    );
    info!(
        "  Remote desktop daemon: {} ({})",
        config.remote_desktop.daemon_path.display(),
        tool_status(&config.remote_desktop.daemon_path)
    );

    info!("=== Thresholds ===");
    info!(
        "  Memory: {} MiB minimum, {} MiB for graphical",
        config.memory.min_ram_mib, config.memory.min_gui_ram_mib
    );
    info!("  Startup timeout: {}s", config.display.startup_timeout_secs);

    info!("=== Build ===");
    info!("  Version: {}", env!("CARGO_PKG_VERSION"));
    #[cfg(debug_assertions)]
    info!("  Build: debug");
    #[cfg(not(debug_assertions))]
    info!("  Build: release");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_system_info_gather() {
        let info = SystemInfo::gather();
        assert!(!info.os_name.is_empty());
        assert!(info.cpu_count > 0);
        assert!(info.total_memory_mib > 0);
    }

    #[test]
    fn test_find_program_by_path() {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("gnome-kiosk");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();

        let as_str = tool.display().to_string();
        assert_eq!(find_program(&as_str), None);

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_program(&as_str), Some(as_str.clone()));
    }

    #[test]
    fn test_find_program_in_path() {
        assert!(find_program("sh").is_some());
        assert!(find_program("surely-not-an-installed-program").is_none());
    }

    #[test]
    fn test_startup_diagnostics_report() {
        let config = Config::default();
        log_startup_diagnostics(&config);

        assert_eq!(find_program("/nonexistent/gnome-kiosk"), None);
    }
}
