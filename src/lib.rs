//! # installer-session
//!
//! Display session bring-up for an operating system installer.
//!
//! At boot the installer has to decide how it talks to the user: a local
//! graphical session on a Wayland kiosk compositor, a graphical session
//! served over RDP from a headless compositor, or a text session on the
//! console. This crate makes that decision from boot options, stored
//! configuration and the machine itself, starts the chosen session and
//! hands over to the installer interface.
//!
//! # Architecture
//!
//! ```text
//! installer-session
//!   ├─> SessionOptions (boot command line + CLI)
//!   ├─> SessionSelector
//!   │     ├─> FactsProvider (memory, network, tooling, hardware)
//!   │     ├─> Prompter (remote desktop question, credentials)
//!   │     ├─> DisplayLauncher (gnome-kiosk local / headless, session bus)
//!   │     ├─> RemoteDesktopServer (gnome-remote-desktop via grdctl)
//!   │     └─> MemoryCheck
//!   ├─> ResolutionSetter (Mutter DisplayConfig, detached)
//!   └─> UserInterface (installer in the chosen mode)
//! ```
//!
//! # Failure Handling
//!
//! A display that does not come up is not fatal. The selector explains
//! what happened on the console, switches back to the text VT and carries
//! on in text mode. Only a machine without enough memory to install at
//! all ends the run.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Configuration file
pub mod config;

/// Error types
pub mod error;

/// Boot and CLI options
pub mod options;

/// Session mode selection
///
/// The decision record, the environment facts it is based on, the remote
/// desktop feasibility rules and the bring-up procedure itself.
pub mod session;

/// Compositor startup and display plumbing
///
/// Starting gnome-kiosk locally or headless, waiting for its Wayland
/// socket, the user session bus, VT switching, video driver override and
/// resolution setting through Mutter.
pub mod display;

/// Child process supervision
pub mod process;

/// Console prompts
pub mod prompt;

/// Remote desktop server control
pub mod remote;

/// Network status from NetworkManager
pub mod network;

/// Installer interface handoff
pub mod interface;

/// Utility functions
pub mod utils;

pub use error::{Result, SessionError};
pub use session::{DisplayMode, SessionDecision, SessionSelector};
