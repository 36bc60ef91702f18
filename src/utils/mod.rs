//! Utility Functions and Diagnostics
//!
//! System diagnostics and user-friendly error formatting.
//!
//! ## Diagnostics
//!
//! The [`diagnostics`] module describes the machine the installer booted on:
//!
//! ```rust,no_run
//! use installer_session::utils::{detect_existing_display, SystemInfo};
//!
//! let sys_info = SystemInfo::gather();
//! sys_info.log();  // Logs: OS, kernel, CPU count, memory
//!
//! if let Some(display) = detect_existing_display() {
//!     println!("Already running on: {}", display);
//! }
//! ```
//!
//! **CLI access:**
//! ```bash
//! installer-session --diagnose    # Full system diagnostics, then exit
//! ```
//!
//! ## Error Formatting
//!
//! The [`errors`] module turns the errors that end a run into console
//! text with the boot options that work around them:
//!
//! ```rust,ignore
//! match selector.select_and_start_session().await {
//!     Err(e) => eprintln!("{}", format_user_error(&e.into())),
//!     Ok(decision) => { /* ... */ }
//! }
//! ```

pub mod diagnostics;
pub mod errors;

pub use diagnostics::{detect_existing_display, find_program, log_startup_diagnostics, SystemInfo};
pub use errors::format_user_error;
