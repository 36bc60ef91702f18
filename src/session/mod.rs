//! Session mode selection
//!
//! Decides whether the installer runs a local graphical session, a remote
//! desktop (RDP) session on a headless compositor, or a text session, and
//! starts it.
//!
//! # Flow
//!
//! ```text
//! SessionOptions ─┐
//!                 ├─> SessionSelector ──> SessionDecision
//! EnvironmentFacts┘        │
//!                          ├─> Prompter (RDP question, credentials)
//!                          ├─> DisplayLauncher (local / headless compositor)
//!                          ├─> RemoteDesktopServer
//!                          └─> UserInterface (handoff)
//! ```
//!
//! The decision is an explicit record threaded through the procedure;
//! every mutation goes through one of the transition methods below.

pub mod facts;
pub mod feasibility;
pub mod memory;
pub mod selector;

pub use facts::{EnvironmentFacts, FactsProvider, SystemFacts};
pub use feasibility::{check_rd_can_be_started, RdBlocker, RdFeasibility};
pub use memory::{MemoryCheck, StartupMemoryCheck};
pub use selector::{SelectorSettings, SessionSelector, SessionServices};

use std::fmt;
use zeroize::Zeroizing;

use crate::options::RequestedMode;

/// Session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Graphical interface on the local display
    Graphical,
    /// Graphical interface on a headless display, reached over RDP
    RemoteGraphical,
    /// Text interface on the console
    Text,
}

impl DisplayMode {
    /// True when the graphical interface is used, locally or remotely
    pub fn is_graphical(&self) -> bool {
        matches!(self, DisplayMode::Graphical | DisplayMode::RemoteGraphical)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Graphical => write!(f, "graphical"),
            DisplayMode::RemoteGraphical => write!(f, "graphical (remote desktop)"),
            DisplayMode::Text => write!(f, "text"),
        }
    }
}

impl From<RequestedMode> for DisplayMode {
    fn from(mode: RequestedMode) -> Self {
        match mode {
            RequestedMode::Graphical => DisplayMode::Graphical,
            RequestedMode::Text => DisplayMode::Text,
        }
    }
}

/// Where the remote desktop request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdRequestSource {
    /// Not requested
    None,
    /// `inst.rdp` on the boot command line
    BootOption,
    /// Enabled in the stored installer configuration
    StoredConfig,
    /// Accepted in an interactive question
    Question,
}

/// Remote desktop credentials
#[derive(Clone, Default)]
pub struct Credentials {
    /// User name
    pub username: String,
    /// Password
    pub password: Zeroizing<String>,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Both user name and password are set
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Fill empty fields from `other`
    pub fn fill_from(&mut self, other: &Credentials) {
        if self.username.is_empty() {
            self.username = other.username.clone();
        }
        if self.password.is_empty() {
            self.password = other.password.clone();
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field(
                "password",
                &if self.password.is_empty() { "<empty>" } else { "<redacted>" },
            )
            .finish()
    }
}

/// Mutable state of one session bring-up
#[derive(Debug, Clone)]
pub struct SessionDecision {
    /// Current mode
    pub mode: DisplayMode,

    /// A graphical startup attempt failed
    pub graphical_failed: bool,

    /// Remote desktop credentials
    pub credentials: Credentials,

    /// Origin of the remote desktop request
    pub rd_source: RdRequestSource,

    rd_question_eligible: bool,
}

impl SessionDecision {
    /// Start from the requested mode; graphical when nothing was requested
    pub fn new(requested: Option<RequestedMode>) -> Self {
        Self {
            mode: requested.map(DisplayMode::from).unwrap_or(DisplayMode::Graphical),
            graphical_failed: false,
            credentials: Credentials::default(),
            rd_source: RdRequestSource::None,
            rd_question_eligible: true,
        }
    }

    /// The remote desktop question may still be asked
    pub fn rd_question_eligible(&self) -> bool {
        self.rd_question_eligible
    }

    /// Remove eligibility for the remote desktop question for the rest of the run
    pub fn revoke_rd_question(&mut self) {
        self.rd_question_eligible = false;
    }

    /// Remote desktop is the chosen transport
    pub fn uses_remote_desktop(&self) -> bool {
        self.mode == DisplayMode::RemoteGraphical
    }

    /// Remote desktop was asked for before any question was shown
    pub fn rd_requested_upfront(&self) -> bool {
        matches!(
            self.rd_source,
            RdRequestSource::BootOption | RdRequestSource::StoredConfig
        )
    }

    /// Switch to a remote desktop session
    pub fn request_remote_desktop(&mut self, source: RdRequestSource) {
        self.mode = DisplayMode::RemoteGraphical;
        self.rd_source = source;
    }

    /// Abandon remote desktop and use text mode, without a failed start
    pub fn downgrade_to_text(&mut self) {
        self.mode = DisplayMode::Text;
    }

    /// A graphical start attempt failed; text mode from now on
    pub fn fail_to_text(&mut self) {
        self.mode = DisplayMode::Text;
        self.graphical_failed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_defaults_to_graphical() {
        let decision = SessionDecision::new(None);
        assert_eq!(decision.mode, DisplayMode::Graphical);
        assert!(decision.rd_question_eligible());
        assert!(!decision.graphical_failed);

        let decision = SessionDecision::new(Some(RequestedMode::Text));
        assert_eq!(decision.mode, DisplayMode::Text);
    }

    #[test]
    fn test_remote_desktop_transitions() {
        let mut decision = SessionDecision::new(Some(RequestedMode::Text));
        decision.request_remote_desktop(RdRequestSource::BootOption);

        assert!(decision.uses_remote_desktop());
        assert!(decision.mode.is_graphical());
        assert!(decision.rd_requested_upfront());

        decision.fail_to_text();
        assert_eq!(decision.mode, DisplayMode::Text);
        assert!(decision.graphical_failed);
        assert!(!decision.uses_remote_desktop());
    }

    #[test]
    fn test_credentials() {
        let mut partial = Credentials::new("admin", "");
        assert!(!partial.is_complete());

        partial.fill_from(&Credentials::new("other", "secret"));
        assert_eq!(partial.username, "admin");
        assert_eq!(partial.password.as_str(), "secret");
        assert!(partial.is_complete());

        let rendered = format!("{:?}", partial);
        assert!(!rendered.contains("secret"));
    }
}
