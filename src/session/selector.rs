//! Session Mode Selector
//!
//! Runs the bring-up procedure once:
//!
//! 1. Early exits (rescue, image/directory targets)
//! 2. Video driver override
//! 3. Remote desktop requested at boot or in the stored configuration
//! 4. Graphical interface availability
//! 5. Remote desktop feasibility
//! 6. Missing remote desktop credentials
//! 7. Remote desktop offer in text mode
//! 8. Memory re-check
//! 9. Local graphical startup
//! 10. Remote desktop offer after a failed graphical start
//! 11. Remote desktop startup
//! 12. Interface handoff
//!
//! Startup failures never abort the installer: they are logged, explained
//! on the console and turned into text mode.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use super::{
    check_rd_can_be_started, Credentials, DisplayMode, FactsProvider, MemoryCheck,
    RdRequestSource, SessionDecision,
};
use crate::config::{Config, InstallerConfig};
use crate::display::{write_xdriver, DisplayLauncher, DisplayReadiness, ResolutionSetter, VirtualTerminal};
use crate::error::Result;
use crate::interface::UserInterface;
use crate::options::{Resolution, SessionOptions, TargetKind};
use crate::prompt::{Prompter, RdAnswer, RdQuestion};
use crate::remote::RemoteDesktopServer;

/// Printed when the compositor did not come up in time
pub const TIMEOUT_MESSAGE: &str = "Wayland did not start in the expected time, falling back to \
                                   text mode. There are multiple ways to avoid this issue:";

/// Printed when the compositor failed to start
pub const FAILURE_MESSAGE: &str = "Wayland did not start, falling back to text mode.";

/// Printed when the remote desktop session failed to start
pub const RD_FAILURE_MESSAGE: &str =
    "The remote desktop session did not start, falling back to text mode.";

/// Printed on hardware without a local display
pub const HEADLESS_MESSAGE: &str = "No local display available. Starting text mode.";

/// Remediation advice printed after a startup timeout
pub fn timeout_advice(timeout: Duration, width: usize) -> String {
    let items = [
        format!(
            "Wait longer for Wayland to start with the inst.xtimeout=<SECONDS> boot option. \
             The current limit is {} seconds.",
            timeout.as_secs()
        ),
        "Use a remote graphical installation with the inst.rdp boot option.".to_string(),
        "Use text mode from the start with the inst.text boot option.".to_string(),
        "Use a faster network connection or local installation media if the installer \
         image is loaded over the network."
            .to_string(),
    ];

    let options = textwrap::Options::new(width)
        .initial_indent("  * ")
        .subsequent_indent("    ");

    items
        .iter()
        .map(|item| textwrap::fill(item, &options))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collaborators of the selector
pub struct SessionServices {
    /// Environment facts
    pub facts: Arc<dyn FactsProvider>,
    /// Interactive questions
    pub prompter: Arc<dyn Prompter>,
    /// Compositor and session bus
    pub display: Arc<dyn DisplayLauncher>,
    /// Remote desktop server
    pub remote: Box<dyn RemoteDesktopServer>,
    /// Console switching
    pub vt: Arc<dyn VirtualTerminal>,
    /// Memory re-check
    pub memory: Arc<dyn MemoryCheck>,
    /// Installer interface
    pub interface: Arc<dyn UserInterface>,
    /// Display configuration readiness
    pub readiness: Arc<dyn DisplayReadiness>,
    /// Resolution setting
    pub resolution: Arc<dyn ResolutionSetter>,
}

/// Fixed parameters of the procedure
#[derive(Debug, Clone)]
pub struct SelectorSettings {
    /// Console VT to return to after a failure
    pub text_vt: u32,
    /// Virtual monitor of the headless session
    pub headless_resolution: Resolution,
    /// Pause after a fallback message
    pub fallback_delay: Duration,
    /// Budget for display readiness before setting the resolution
    pub readiness_timeout: Duration,
    /// Root for the video driver override
    pub driver_root: PathBuf,
    /// Stored installer configuration
    pub stored: InstallerConfig,
    /// Width for wrapped console messages
    pub message_width: usize,
}

impl SelectorSettings {
    /// Settings from the configuration file
    pub fn from_config(config: &Config) -> Self {
        Self {
            text_vt: config.display.text_vt,
            headless_resolution: config.display.headless_resolution,
            fallback_delay: config.fallback_delay(),
            readiness_timeout: config.readiness_timeout(),
            driver_root: config.display.driver_root.clone(),
            stored: config.installer.clone(),
            message_width: 80,
        }
    }
}

/// Session Mode Selector
pub struct SessionSelector {
    options: SessionOptions,
    settings: SelectorSettings,
    services: SessionServices,
    resolution_task: Option<JoinHandle<()>>,
}

impl SessionSelector {
    /// Create a selector for one bring-up
    pub fn new(options: SessionOptions, settings: SelectorSettings, services: SessionServices) -> Self {
        Self {
            options,
            settings,
            services,
            resolution_task: None,
        }
    }

    /// The detached resolution task, if one was started
    pub fn take_resolution_task(&mut self) -> Option<JoinHandle<()>> {
        self.resolution_task.take()
    }

    /// Decide the session mode, start it and hand over to the interface
    ///
    /// The returned decision is never in an unstartable state: failed
    /// graphical or remote starts have been rewritten to text.
    pub async fn select_and_start_session(&mut self) -> Result<SessionDecision> {
        let requested = self.options.display_mode.or(self.settings.stored.display_mode);
        let mut decision = SessionDecision::new(requested);

        if self.options.rescue {
            info!("Rescue mode, not starting an installer session");
            return Ok(decision);
        }

        if self.options.target != TargetKind::Hardware {
            info!(
                "Installing to {:?} target, display mode = {}",
                self.options.target, decision.mode
            );
            self.services.interface.initialize(&decision).await?;
            return Ok(decision);
        }

        if let Some(driver) = &self.options.xdriver {
            if let Err(e) = write_xdriver(&self.settings.driver_root, driver) {
                error!("Failed to write video driver override '{}': {}", driver, e);
            }
        }

        self.apply_requested_remote_desktop(&mut decision);

        if !self.options.interactive {
            info!("Non-interactive installation, not asking about remote desktop");
            decision.revoke_rd_question();
        }

        let facts = self.services.facts.gather().await;

        if decision.mode.is_graphical() && !facts.graphical_ui_available && !facts.webui_available {
            warn!("Graphical user interface not available, falling back to text mode");
            decision.downgrade_to_text();
            decision.rd_source = RdRequestSource::None;
            decision.revoke_rd_question();
        }

        let feasibility = check_rd_can_be_started(&decision, &facts);
        if !feasibility.possible {
            for reason in &feasibility.reasons {
                warn!("{}", reason);
            }
            decision.revoke_rd_question();
        }

        if feasibility.possible
            && decision.rd_requested_upfront()
            && !decision.credentials.is_complete()
        {
            self.complete_credentials(&mut decision).await;
        }

        if decision.mode == DisplayMode::Text && decision.rd_question_eligible() {
            match self.ask(RdQuestion::TextModeLimits).await {
                RdAnswer::Accepted(credentials) => {
                    decision.request_remote_desktop(RdRequestSource::Question);
                    decision.credentials = credentials;
                }
                RdAnswer::Declined => {
                    info!("Text mode chosen, not asking about remote desktop again");
                    decision.revoke_rd_question();
                }
            }
        }

        info!("Display mode = {}", decision.mode);

        // May downgrade a remote session accepted above; the question is
        // not asked again in that case
        let facts = self.services.facts.gather().await;
        self.services.memory.check(&mut decision, facts.total_memory_mib)?;

        let mut want_graphical = decision.mode == DisplayMode::Graphical
            && !facts.preexisting_display
            && !decision.uses_remote_desktop();

        if want_graphical && facts.headless_hardware {
            self.fall_back_to_text(&mut decision, HEADLESS_MESSAGE, false).await;
            want_graphical = false;
        }

        if want_graphical {
            match self.start_local_session().await {
                Ok(()) => self.schedule_resolution(&decision),
                Err(e) => {
                    warn!("Wayland startup failed: {}", e);
                    let message = if e.is_timeout() { TIMEOUT_MESSAGE } else { FAILURE_MESSAGE };
                    self.fall_back_to_text(&mut decision, message, e.is_timeout()).await;
                }
            }
        }

        if decision.mode == DisplayMode::Text
            && decision.graphical_failed
            && decision.rd_question_eligible()
            && decision.rd_source == RdRequestSource::None
        {
            if let RdAnswer::Accepted(credentials) = self.ask(RdQuestion::GraphicalStartupFailed).await {
                decision.request_remote_desktop(RdRequestSource::Question);
                decision.credentials = credentials;
            }
        }

        if decision.uses_remote_desktop() {
            if let Err(e) = self.start_remote_session(&decision).await {
                warn!("Remote desktop startup failed: {}", e);
                let message = if e.is_timeout() { TIMEOUT_MESSAGE } else { RD_FAILURE_MESSAGE };
                self.fall_back_to_text(&mut decision, message, e.is_timeout()).await;
            }
        }

        if decision.graphical_failed {
            if let Err(e) = self.services.interface.reinitialize_locale() {
                warn!("Failed to re-initialize the locale: {}", e);
            }
        }

        self.services.interface.initialize(&decision).await?;

        Ok(decision)
    }

    fn apply_requested_remote_desktop(&self, decision: &mut SessionDecision) {
        if self.options.rdp_enabled {
            decision.request_remote_desktop(RdRequestSource::BootOption);
            decision.credentials = Credentials {
                username: self.options.rdp_username.clone().unwrap_or_default(),
                password: self
                    .options
                    .rdp_password
                    .clone()
                    .unwrap_or_else(|| Zeroizing::new(String::new())),
            };
        }

        let stored = &self.settings.stored.rdp;
        if stored.enabled {
            if !decision.uses_remote_desktop() {
                decision.request_remote_desktop(RdRequestSource::StoredConfig);
            }
            decision.credentials.fill_from(&Credentials {
                username: stored.username.clone(),
                password: stored.password.clone(),
            });
        }

        if decision.uses_remote_desktop() {
            info!(
                "Remote desktop requested ({:?}), credentials {}",
                decision.rd_source,
                if decision.credentials.is_complete() {
                    "complete"
                } else {
                    "incomplete"
                }
            );
        }
    }

    async fn complete_credentials(&self, decision: &mut SessionDecision) {
        if !self.options.interactive {
            warn!("RDP credentials are incomplete and the installation is non-interactive");
            return;
        }

        match self.services.prompter.ask_credentials(&decision.credentials).await {
            Ok(Some(credentials)) => {
                decision.credentials = credentials;
                decision.request_remote_desktop(decision.rd_source);
            }
            Ok(None) => {
                info!("RDP credential prompt cancelled, continuing in text mode");
                Self::abandon_remote_desktop(decision);
            }
            Err(e) => {
                warn!("RDP credential prompt failed, continuing in text mode: {}", e);
                Self::abandon_remote_desktop(decision);
            }
        }
    }

    fn abandon_remote_desktop(decision: &mut SessionDecision) {
        decision.downgrade_to_text();
        decision.rd_source = RdRequestSource::None;
        decision.revoke_rd_question();
    }

    /// Ask the remote desktop question; a broken prompt counts as decline
    async fn ask(&self, question: RdQuestion) -> RdAnswer {
        match self.services.prompter.ask_remote_desktop(question).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Remote desktop question failed: {}", e);
                RdAnswer::Declined
            }
        }
    }

    async fn ensure_session_bus(&self) {
        if let Err(e) = self.services.display.ensure_session_bus().await {
            warn!("Failed to start the user session bus: {}", e);
        }
    }

    async fn start_local_session(&self) -> Result<()> {
        self.ensure_session_bus().await;
        self.services
            .display
            .start_local(self.options.startup_timeout)
            .await
    }

    async fn start_remote_session(&mut self, decision: &SessionDecision) -> Result<()> {
        self.ensure_session_bus().await;
        self.services
            .display
            .start_headless(self.options.startup_timeout, self.settings.headless_resolution)
            .await?;

        self.services.remote.set_credentials(decision.credentials.clone());
        self.services.remote.start().await
    }

    /// Apply the requested resolution once the display can be configured
    fn schedule_resolution(&mut self, decision: &SessionDecision) {
        let Some(resolution) = self.options.resolution else {
            return;
        };
        if decision.uses_remote_desktop() || self.resolution_task.is_some() {
            return;
        }

        let readiness = Arc::clone(&self.services.readiness);
        let setter = Arc::clone(&self.services.resolution);
        let budget = self.settings.readiness_timeout;

        self.resolution_task = Some(tokio::spawn(async move {
            match tokio::time::timeout(budget, readiness.wait_ready()).await {
                Ok(Ok(())) => {
                    if let Err(e) = setter.set_resolution(resolution).await {
                        error!("The resolution was not set: {}", e);
                    }
                }
                Ok(Err(e)) => warn!("Display configuration unavailable, resolution not set: {}", e),
                Err(_) => warn!(
                    "Display not ready after {}s, resolution {} not set",
                    budget.as_secs(),
                    resolution
                ),
            }
        }));
    }

    async fn fall_back_to_text(&self, decision: &mut SessionDecision, message: &str, advice: bool) {
        warn!("{}", message);
        println!("{}", message);
        if advice {
            println!(
                "{}",
                timeout_advice(self.options.startup_timeout, self.settings.message_width)
            );
        }

        if let Err(e) = self.services.vt.activate(self.settings.text_vt) {
            warn!("Cannot switch to VT{}: {}", self.settings.text_vt, e);
        }

        decision.fail_to_text();
        tokio::time::sleep(self.settings.fallback_delay).await;
    }
}
