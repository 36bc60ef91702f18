//! Environment for the display session
//!
//! The compositor reads its schema overrides and configuration from the
//! installer data directory, which is put in front of the XDG search paths.

use std::path::{Path, PathBuf};

/// Overrides the configured installer data directory
pub const DATADIR_ENV: &str = "ANACONDA_DATADIR";

/// Search path tail when `XDG_DATA_DIRS` is unset
pub const DEFAULT_DATA_DIRS: &str = "/usr/share";

/// Search path tail when `XDG_CONFIG_DIRS` is unset
pub const DEFAULT_CONFIG_DIRS: &str = "/etc/xdg";

/// Installer data directory: `$ANACONDA_DATADIR` or the configured one
pub fn resolve_data_dir(configured: &Path, env_value: Option<&str>) -> PathBuf {
    env_value
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| configured.to_path_buf())
}

/// `XDG_DATA_DIRS` with the window manager overrides first
pub fn data_dirs(data_dir: &Path, current: Option<&str>) -> String {
    let tail = current.filter(|v| !v.is_empty()).unwrap_or(DEFAULT_DATA_DIRS);
    format!("{}:{}", data_dir.join("window-manager").display(), tail)
}

/// `XDG_CONFIG_DIRS` with the window manager configuration first
pub fn config_dirs(data_dir: &Path, current: Option<&str>) -> String {
    let tail = current.filter(|v| !v.is_empty()).unwrap_or(DEFAULT_CONFIG_DIRS);
    format!(
        "{}:{}",
        data_dir.join("window-manager").join("config").display(),
        tail
    )
}

/// Session bus address inside the runtime directory
pub fn session_bus_address(runtime_dir: &Path) -> String {
    format!("unix:path={}", runtime_dir.join("bus").display())
}

/// Runtime directory: `$XDG_RUNTIME_DIR` or `/run/user/<uid>`
pub fn runtime_dir(env_value: Option<&str>, uid: u32) -> PathBuf {
    env_value
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("/run/user/{}", uid)))
}

/// Substitute `{name}` placeholders in a command line
pub fn expand_argv(template: &[String], vars: &[(&str, String)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |arg, (name, value)| {
                arg.replace(&format!("{{{}}}", name), value)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_paths_are_extended() {
        let data_dir = Path::new("/usr/share/anaconda");

        assert_eq!(
            data_dirs(data_dir, None),
            "/usr/share/anaconda/window-manager:/usr/share"
        );
        assert_eq!(
            data_dirs(data_dir, Some("/opt/share:/usr/share")),
            "/usr/share/anaconda/window-manager:/opt/share:/usr/share"
        );
        assert_eq!(
            config_dirs(data_dir, Some("")),
            "/usr/share/anaconda/window-manager/config:/etc/xdg"
        );
    }

    #[test]
    fn test_data_dir_override() {
        let configured = Path::new("/usr/share/anaconda");
        assert_eq!(resolve_data_dir(configured, None), configured);
        assert_eq!(
            resolve_data_dir(configured, Some("/tmp/updates")),
            PathBuf::from("/tmp/updates")
        );
    }

    #[test]
    fn test_runtime_paths() {
        assert_eq!(runtime_dir(None, 0), PathBuf::from("/run/user/0"));
        assert_eq!(
            session_bus_address(&runtime_dir(Some("/run/user/1000"), 0)),
            "unix:path=/run/user/1000/bus"
        );
    }

    #[test]
    fn test_expand_argv() {
        let template: Vec<String> = ["--vt", "{vt}", "--virtual-monitor", "{resolution}", "plain"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let argv = expand_argv(
            &template,
            &[("vt", "7".to_string()), ("resolution", "1280x1024".to_string())],
        );
        assert_eq!(argv, vec!["--vt", "7", "--virtual-monitor", "1280x1024", "plain"]);
    }
}
