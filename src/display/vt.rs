//! Virtual terminal switching

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{Result, SessionError};

#[allow(unreachable_pub)]
mod ioctls {
    nix::ioctl_write_int_bad!(vt_activate, 0x5606);
    nix::ioctl_write_int_bad!(vt_wait_active, 0x5607);
}

/// Switch the active virtual terminal
pub trait VirtualTerminal: Send + Sync {
    /// Make `vt` the active terminal
    fn activate(&self, vt: u32) -> Result<()>;
}

/// Kernel console switching through `/dev/tty0`
#[derive(Debug, Clone)]
pub struct ConsoleVt {
    device: PathBuf,
}

impl ConsoleVt {
    /// Use the current console device
    pub fn new() -> Self {
        Self {
            device: PathBuf::from("/dev/tty0"),
        }
    }
}

impl Default for ConsoleVt {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTerminal for ConsoleVt {
    #[allow(unsafe_code)]
    fn activate(&self, vt: u32) -> Result<()> {
        let number = i32::try_from(vt)
            .map_err(|_| SessionError::Config(format!("invalid virtual terminal {}", vt)))?;

        let console = OpenOptions::new().write(true).open(&self.device)?;
        let fd = console.as_raw_fd();

        debug!("Activating VT{} via {}", vt, self.device.display());

        // SAFETY: fd is an open console descriptor for the duration of both calls
        unsafe {
            ioctls::vt_activate(fd, number)?;
            ioctls::vt_wait_active(fd, number)?;
        }

        info!("Switched to VT{}", vt);
        Ok(())
    }
}
