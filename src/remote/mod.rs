//! Remote desktop server
//!
//! GNOME Remote Desktop serves the headless compositor over RDP. It is
//! configured through `grdctl --headless` (TLS material, credentials) and
//! then started as a watched daemon.

pub mod certificates;

pub use certificates::{ensure_tls_files, TlsFiles};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RemoteDesktopConfig;
use crate::error::{Result, SessionError};
use crate::process::{ProcessHandle, ProcessSupervisor, SpawnSpec};
use crate::session::Credentials;

/// Name the daemon is watched under
pub const DAEMON_NAME: &str = "gnome-remote-desktop";

/// Controllable remote desktop server
#[async_trait]
pub trait RemoteDesktopServer: Send + Sync {
    /// Credentials used by the next `start`
    fn set_credentials(&mut self, credentials: Credentials);

    /// Configure and launch the server
    async fn start(&mut self) -> Result<()>;

    /// Stop a running server
    async fn stop(&mut self) -> Result<()>;
}

/// `grdctl` argument lists, in the order they must run
pub fn grdctl_commands(tls: &TlsFiles, credentials: &Credentials) -> Vec<Vec<String>> {
    let rdp = |args: &[&str]| -> Vec<String> {
        ["--headless", "rdp"]
            .iter()
            .chain(args)
            .map(|s| s.to_string())
            .collect()
    };

    let cert = tls.cert.display().to_string();
    let key = tls.key.display().to_string();

    vec![
        rdp(&["set-tls-cert", cert.as_str()]),
        rdp(&["set-tls-key", key.as_str()]),
        rdp(&[
            "set-credentials",
            credentials.username.as_str(),
            credentials.password.as_str(),
        ]),
        rdp(&["enable"]),
    ]
}

/// GNOME Remote Desktop controller
pub struct GnomeRemoteDesktop {
    config: RemoteDesktopConfig,
    supervisor: Arc<dyn ProcessSupervisor>,
    credentials: Credentials,
    daemon: Option<ProcessHandle>,
}

impl GnomeRemoteDesktop {
    /// Create a controller; nothing runs until `start`
    pub fn new(config: RemoteDesktopConfig, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        Self {
            config,
            supervisor,
            credentials: Credentials::default(),
            daemon: None,
        }
    }

    async fn grdctl(&self, args: &[String]) -> Result<()> {
        let program = self.config.grdctl_path.display().to_string();

        // The credentials command carries the password
        let shown = if args.iter().any(|a| a == "set-credentials") {
            "--headless rdp set-credentials <redacted>".to_string()
        } else {
            args.join(" ")
        };
        debug!("Running {} {}", program, shown);

        let output = Command::new(&self.config.grdctl_path)
            .args(args)
            .output()
            .await
            .map_err(|source| SessionError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SessionError::startup_failed(
                DAEMON_NAME,
                format!(
                    "grdctl {} failed ({}): {}",
                    shown,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        Ok(())
    }

    fn hostname() -> String {
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string())
    }
}

#[async_trait]
impl RemoteDesktopServer for GnomeRemoteDesktop {
    fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    async fn start(&mut self) -> Result<()> {
        if !self.credentials.is_complete() {
            return Err(SessionError::startup_failed(
                DAEMON_NAME,
                "RDP user name and password are required",
            ));
        }

        info!("Starting GNOME remote desktop");

        let host = Self::hostname();
        let tls = ensure_tls_files(&self.config.cert_dir, &host, self.config.cert_validity_days)?;

        for args in grdctl_commands(&tls, &self.credentials) {
            self.grdctl(&args).await?;
        }

        let spec = SpawnSpec::new(vec![
            self.config.daemon_path.display().to_string(),
            "--headless".to_string(),
        ])
        .ignore_sigint();

        let handle = self.supervisor.spawn(&spec)?;
        self.supervisor.watch(&handle, DAEMON_NAME)?;
        self.daemon = Some(handle);

        let message = format!(
            "GNOME remote desktop is now running. Connect via RDP to {}:{} as user '{}'.",
            host, self.config.port, self.credentials.username
        );
        info!("{}", message);
        println!("{}", message);

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.daemon.take() {
            self.supervisor.unwatch(&handle);
            self.supervisor.terminate(&handle)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ChildSupervisor;
    use std::path::PathBuf;

    #[test]
    fn test_grdctl_commands() {
        let tls = TlsFiles::in_dir(&PathBuf::from("/root/.local/share/gnome-remote-desktop"));
        let commands = grdctl_commands(&tls, &Credentials::new("admin", "secret1"));

        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0][..3], ["--headless", "rdp", "set-tls-cert"]);
        assert!(commands[0][3].ends_with("rdp-tls.crt"));
        assert_eq!(commands[1][2], "set-tls-key");
        assert_eq!(
            commands[2],
            vec!["--headless", "rdp", "set-credentials", "admin", "secret1"]
        );
        assert_eq!(commands[3], vec!["--headless", "rdp", "enable"]);
    }

    #[tokio::test]
    async fn test_start_requires_credentials() {
        let mut server = GnomeRemoteDesktop::new(
            RemoteDesktopConfig::default(),
            Arc::new(ChildSupervisor::new()),
        );
        server.set_credentials(Credentials::new("admin", ""));

        let err = server.start().await.unwrap_err();
        assert!(err.to_string().contains("required"));

        // Nothing started, nothing to stop
        server.stop().await.unwrap();
    }
}
