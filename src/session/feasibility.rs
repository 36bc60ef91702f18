//! Remote desktop feasibility
//!
//! Decides whether the remote desktop question may be asked at all. Each
//! blocker only disables the question; none of them changes the mode.

use std::fmt;

use super::{DisplayMode, EnvironmentFacts, SessionDecision};

/// Condition that prevents asking about a remote desktop session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdBlocker {
    /// Less memory than a graphical session needs
    InsufficientMemory {
        /// Total memory (MiB)
        available: u64,
        /// Graphical minimum (MiB)
        required: u64,
    },
    /// Automated installation already running in text mode
    AutomatedTextInstall,
    /// The stored configuration explicitly asks for text mode
    TextRequestedInConfig,
    /// Network is neither connecting nor connected
    NoNetwork,
    /// The remote desktop control tool is not installed
    ToolingMissing,
}

impl fmt::Display for RdBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdBlocker::InsufficientMemory {
                available,
                required,
            } => write!(
                f,
                "Not asking for remote desktop session because current memory ({}) < MIN_GUI_RAM ({})",
                available, required
            ),
            RdBlocker::AutomatedTextInstall => write!(
                f,
                "Not asking for remote desktop session because of an automated install"
            ),
            RdBlocker::TextRequestedInConfig => write!(
                f,
                "Not asking for remote desktop session because text mode was explicitly asked for in the installer configuration"
            ),
            RdBlocker::NoNetwork => write!(
                f,
                "Not asking for remote desktop session because we don't have a network"
            ),
            RdBlocker::ToolingMissing => write!(
                f,
                "Not asking for remote desktop session because we don't have GNOME Remote Desktop"
            ),
        }
    }
}

/// Outcome of [`check_rd_can_be_started`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdFeasibility {
    /// The question may be asked
    pub possible: bool,
    /// Every triggered blocker, in evaluation order
    pub reasons: Vec<RdBlocker>,
}

/// Check whether a remote desktop session can be offered
///
/// Blockers are evaluated in a fixed order and all of them are collected:
/// memory, automated text install, text in stored configuration, network,
/// control tool.
pub fn check_rd_can_be_started(decision: &SessionDecision, facts: &EnvironmentFacts) -> RdFeasibility {
    let mut reasons = Vec::new();

    if facts.insufficient_memory() {
        reasons.push(RdBlocker::InsufficientMemory {
            available: facts.total_memory_mib,
            required: facts.min_gui_memory_mib,
        });
    }

    if decision.mode == DisplayMode::Text && facts.automated_install {
        reasons.push(RdBlocker::AutomatedTextInstall);
    }

    if facts.text_requested_in_config {
        reasons.push(RdBlocker::TextRequestedInConfig);
    }

    if facts.network_unavailable() {
        reasons.push(RdBlocker::NoNetwork);
    }

    if !facts.rd_tooling_available {
        reasons.push(RdBlocker::ToolingMissing);
    }

    RdFeasibility {
        possible: reasons.is_empty(),
        reasons,
    }
}
