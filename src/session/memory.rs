//! Startup memory check
//!
//! Runs after the remote desktop questions. It can end the run when there
//! is not enough memory for the installer at all, and it downgrades a
//! graphical session to text when there is not enough for a display.

use tracing::{info, warn};

use super::SessionDecision;
use crate::config::MemoryConfig;
use crate::error::{Result, SessionError};

/// Secondary memory check that may rewrite the mode
pub trait MemoryCheck: Send + Sync {
    /// Check `total_memory_mib` and adjust `decision`
    fn check(&self, decision: &mut SessionDecision, total_memory_mib: u64) -> Result<()>;
}

/// Threshold-based memory check
#[derive(Debug, Clone)]
pub struct StartupMemoryCheck {
    min_ram_mib: u64,
    min_gui_ram_mib: u64,
    enabled: bool,
}

impl StartupMemoryCheck {
    /// Create a check from configured thresholds
    pub fn new(config: &MemoryConfig, enabled: bool) -> Self {
        Self {
            min_ram_mib: config.min_ram_mib,
            min_gui_ram_mib: config.min_gui_ram_mib,
            enabled,
        }
    }
}

impl MemoryCheck for StartupMemoryCheck {
    fn check(&self, decision: &mut SessionDecision, total_memory_mib: u64) -> Result<()> {
        if !self.enabled {
            info!("Memory check disabled");
            return Ok(());
        }

        if total_memory_mib < self.min_ram_mib {
            return Err(SessionError::InsufficientMemory {
                available: total_memory_mib,
                required: self.min_ram_mib,
            });
        }

        // Remote sessions render on this machine too
        if decision.mode.is_graphical() && total_memory_mib < self.min_gui_ram_mib {
            warn!(
                "Not enough memory for a graphical installation ({} MiB < {} MiB), using text mode",
                total_memory_mib, self.min_gui_ram_mib
            );
            decision.downgrade_to_text();
        }

        Ok(())
    }
}
