//! Installer user interface handoff
//!
//! Once the display session is settled the installer interface is
//! launched in the chosen mode. After a failed graphical start the locale
//! is checked first: the Linux console cannot render many scripts, so such
//! languages fall back to English in text mode.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::ExitStatus;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::InterfaceConfig;
use crate::error::{Result, SessionError};
use crate::session::{DisplayMode, SessionDecision};

/// Locale used when the console cannot display the requested language
pub const CONSOLE_FALLBACK_LOCALE: &str = "en_US.UTF-8";

/// Languages whose scripts the console font cannot show
const NON_CONSOLE_LANGUAGES: &[&str] = &[
    "am", "as", "bn", "gu", "hi", "ja", "km", "kn", "ko", "lo", "ml", "mr", "my", "ne", "or",
    "pa", "si", "ta", "te", "th", "zh",
];

/// Locale to use in text mode instead of `lang`, if any
pub fn text_mode_locale(lang: &str) -> Option<&'static str> {
    let language = lang
        .split(['_', '.', '@'])
        .next()
        .unwrap_or_default();

    NON_CONSOLE_LANGUAGES
        .contains(&language)
        .then_some(CONSOLE_FALLBACK_LOCALE)
}

/// Installer interface
#[async_trait]
pub trait UserInterface: Send + Sync {
    /// Start the interface for the decided mode
    async fn initialize(&self, decision: &SessionDecision) -> Result<()>;

    /// Re-check the locale for a text interface
    fn reinitialize_locale(&self) -> Result<()>;
}

/// Launches the installer interface as a child process
pub struct InterfaceLauncher {
    config: InterfaceConfig,
    locale: Mutex<Option<String>>,
    child: tokio::sync::Mutex<Option<Child>>,
}

impl InterfaceLauncher {
    /// Create a launcher
    pub fn new(config: InterfaceConfig) -> Self {
        Self {
            config,
            locale: Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
        }
    }

    /// Command line for `mode`
    pub fn command_for(&self, mode: DisplayMode) -> &[String] {
        match mode {
            DisplayMode::Graphical | DisplayMode::RemoteGraphical => &self.config.graphical_command,
            DisplayMode::Text => &self.config.text_command,
        }
    }

    /// Wait for the interface to exit; `None` when nothing was started
    pub async fn wait(&self) -> Result<Option<ExitStatus>> {
        let mut child = self.child.lock().await;
        match child.as_mut() {
            Some(child) => Ok(Some(child.wait().await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserInterface for InterfaceLauncher {
    async fn initialize(&self, decision: &SessionDecision) -> Result<()> {
        let argv = self.command_for(decision.mode);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SessionError::Interface(format!("no command for {} mode", decision.mode)))?;

        info!("Starting the {} interface: {}", decision.mode, argv.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args);
        let locale = self.locale.lock().clone();
        if let Some(locale) = locale {
            cmd.env("LANG", locale);
        }
        if decision.uses_remote_desktop() {
            cmd.env("INSTALLER_REMOTE_DESKTOP", "1");
        }

        let child = cmd
            .spawn()
            .map_err(|e| SessionError::Interface(format!("failed to start {}: {}", program, e)))?;

        *self.child.lock().await = Some(child);
        Ok(())
    }

    fn reinitialize_locale(&self) -> Result<()> {
        let lang = std::env::var("LANG").unwrap_or_default();

        match text_mode_locale(&lang) {
            Some(fallback) => {
                warn!(
                    "Language {} cannot be shown on the console, using {} instead",
                    lang, fallback
                );
                *self.locale.lock() = Some(fallback.to_string());
            }
            None => info!("Keeping language {:?} for text mode", lang),
        }

        Ok(())
    }
}
