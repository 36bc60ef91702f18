//! User-Friendly Error Formatting
//!
//! The few errors that end a run are shown on the console, usually to
//! someone looking at a freshly booted installer. They get a short
//! explanation and the boot options that avoid the problem.

use std::fmt::Write;

use crate::error::SessionError;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    match error.downcast_ref::<SessionError>() {
        Some(SessionError::InsufficientMemory {
            available,
            required,
        }) => format_memory_error(&mut output, *available, *required),
        Some(SessionError::StartupTimeout { .. } | SessionError::StartupFailed { .. }) => {
            format_display_error(&mut output)
        }
        Some(SessionError::DBus(_)) => format_dbus_error(&mut output),
        Some(SessionError::Interface(_)) => format_interface_error(&mut output),
        Some(SessionError::Config(_)) => format_config_error(&mut output),
        _ => {
            let error_msg = error.to_string();
            if error_msg.contains("config") || error_msg.contains("TOML") {
                format_config_error(&mut output);
            } else {
                format_generic_error(&mut output, &error_msg);
            }
        }
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: installer-session -vv"
    )
    .ok();
    writeln!(&mut output, "  - Check logs in: /tmp/installer-session/").ok();

    output
}

fn format_memory_error(output: &mut String, available: u64, required: u64) {
    writeln!(output, "Not Enough Memory").ok();
    writeln!(output).ok();
    writeln!(
        output,
        "The installer needs at least {} MiB of memory, this system has {} MiB.",
        required, available
    )
    .ok();
    writeln!(output).ok();
    writeln!(output, "What to do:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Add memory to the machine or virtual machine").ok();
    writeln!(output, "  2. Skip the check with the inst.nomemcheck boot option").ok();
    writeln!(output, "     → The installation may fail later").ok();
}

fn format_display_error(output: &mut String) {
    writeln!(output, "Display Session Error").ok();
    writeln!(output).ok();
    writeln!(output, "The display session could not be started.").ok();
    writeln!(output).ok();
    writeln!(output, "Boot options that may help:").ok();
    writeln!(output).ok();
    writeln!(output, "  - inst.xtimeout=<SECONDS> to wait longer for Wayland").ok();
    writeln!(output, "  - inst.xdriver=vesa to use a basic video driver").ok();
    writeln!(output, "  - inst.rdp to install over a remote desktop").ok();
    writeln!(output, "  - inst.text to install in text mode").ok();
}

fn format_dbus_error(output: &mut String) {
    writeln!(output, "D-Bus Error").ok();
    writeln!(output).ok();
    writeln!(output, "A system service could not be reached over D-Bus.").ok();
    writeln!(output).ok();
    writeln!(output, "Check:").ok();
    writeln!(output).ok();
    writeln!(output, "  - systemctl status dbus").ok();
    writeln!(output, "  - echo $DBUS_SESSION_BUS_ADDRESS").ok();
}

fn format_interface_error(output: &mut String) {
    writeln!(output, "Installer Interface Error").ok();
    writeln!(output).ok();
    writeln!(output, "The installer interface could not be started.").ok();
    writeln!(output).ok();
    writeln!(output, "Check the [interface] commands in the configuration file.").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Out of range values").ok();
    writeln!(output, "     → Virtual terminals must be between 1 and 63").ok();
    writeln!(output, "     → Command lines must not be empty").ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Installer Session Error").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
    writeln!(output).ok();
    writeln!(output, "Try booting with inst.text to bypass the display session.").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_error_formatting() {
        let error = anyhow::Error::new(SessionError::InsufficientMemory {
            available: 256,
            required: 320,
        });
        let formatted = format_user_error(&error);
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("inst.nomemcheck"));
        assert!(formatted.contains("256 MiB"));
    }

    #[test]
    fn test_config_error_formatting() {
        let error = anyhow::anyhow!("Failed to parse config file");
        let formatted = format_user_error(&error);
        assert!(formatted.contains("Configuration Error"));
    }

    #[test]
    fn test_wrapped_session_error_is_recognized() {
        let error = anyhow::Error::new(SessionError::startup_failed("gnome-kiosk", "exited"));
        let formatted = format_user_error(&error.context("Session bring-up failed"));
        assert!(formatted.contains("Display Session Error"));
        assert!(formatted.contains("Session bring-up failed"));
    }
}
