//! Waiting for a display socket
//!
//! Watches the socket's directory for changes and re-checks on a slow
//! interval in case the watch cannot be set up (the runtime directory may
//! not exist yet when the compositor is spawned).

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn watch_parent(path: &Path, tx: mpsc::UnboundedSender<()>) -> Option<RecommendedWatcher> {
    let parent = path.parent()?;

    let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(_) => {
            let _ = tx.send(());
        }
        Err(e) => warn!("Socket watch error: {:?}", e),
    });

    let mut watcher = match watcher {
        Ok(watcher) => watcher,
        Err(e) => {
            warn!("Cannot create socket watcher, polling instead: {}", e);
            return None;
        }
    };

    if let Err(e) = watcher.watch(parent, RecursiveMode::NonRecursive) {
        debug!("Cannot watch {}, polling instead: {}", parent.display(), e);
        return None;
    }

    Some(watcher)
}

/// Wait until `path` exists, at most `timeout`
pub async fn wait_for_socket(path: &Path, timeout: Duration) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    info!("Waiting for {} ...", path.display());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _watcher = watch_parent(path, tx);

    let wait = async {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            // The socket may have appeared before the watch was installed
            if path.exists() {
                return;
            }

            tokio::select! {
                Some(()) = rx.recv() => {}
                _ = ticker.tick() => {}
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(()) => {
            info!("Socket ready: {}", path.display());
            Ok(())
        }
        Err(_) => Err(SessionError::StartupTimeout {
            what: path.display().to_string(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_socket_appears() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("wl-test-0");

        let create = socket.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            std::fs::write(&create, b"").unwrap();
        });

        wait_for_socket(&socket, Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_socket_timeout() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("wl-test-0");

        let err = wait_for_socket(&socket, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_missing_directory_falls_back_to_polling() {
        let dir = TempDir::new().unwrap();
        let runtime = dir.path().join("run/user/0");
        let socket = runtime.join("wl-test-0");

        let create = runtime.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            std::fs::create_dir_all(&create).unwrap();
            std::fs::write(create.join("wl-test-0"), b"").unwrap();
        });

        wait_for_socket(&socket, Duration::from_secs(5)).await.unwrap();
    }
}
