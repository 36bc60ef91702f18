//! Video driver override
//!
//! `inst.xdriver=<name>` is persisted as a minimal X server device section
//! before any display server starts.

use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;

/// Driver configuration file relative to the target root
pub const XORG_CONF: &str = "etc/X11/xorg.conf";

/// Device section naming `driver`
pub fn device_section(driver: &str) -> String {
    format!(
        "Section \"Device\"\n\tIdentifier \"Videocard0\"\n\tDriver \"{}\"\nEndSection\n",
        driver
    )
}

/// Write the driver override under `root`, creating `etc/X11` if needed
pub fn write_xdriver(root: &Path, driver: &str) -> Result<PathBuf> {
    let path = root.join(XORG_CONF);

    if let Some(dir) = path.parent() {
        if !dir.is_dir() {
            fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)?;
        }
    }

    fs::write(&path, device_section(driver))?;
    info!("Wrote video driver override '{}' to {}", driver, path.display());

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_write_xdriver_creates_directory() {
        let root = TempDir::new().unwrap();

        let path = write_xdriver(root.path(), "vesa").unwrap();
        assert_eq!(path, root.path().join("etc/X11/xorg.conf"));

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Section \"Device\"\n\tIdentifier \"Videocard0\"\n\tDriver \"vesa\"\nEndSection\n"
        );

        let mode = fs::metadata(root.path().join("etc/X11"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777 & !0o022, 0o755 & !0o022);
    }

    #[test]
    fn test_write_xdriver_overwrites() {
        let root = TempDir::new().unwrap();
        write_xdriver(root.path(), "vesa").unwrap();
        let path = write_xdriver(root.path(), "modesetting").unwrap();

        assert!(fs::read_to_string(path).unwrap().contains("\"modesetting\""));
    }
}
