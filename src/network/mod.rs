//! Network status
//!
//! Only used to decide whether offering a remote desktop session makes
//! sense. A NetworkManager that cannot be reached counts as no network.

use async_trait::async_trait;
use tracing::{debug, warn};
use zbus::{proxy, Connection};

/// NetworkManager global state (`NM_STATE_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmState {
    /// Unknown, asleep or disconnected
    Offline,
    /// Activating a connection
    Connecting,
    /// Local, site or global connectivity
    Connected,
}

impl NmState {
    /// Map the raw `State` property value
    pub fn from_raw(state: u32) -> Self {
        match state {
            40 => NmState::Connecting,
            50 | 60 | 70 => NmState::Connected,
            _ => NmState::Offline,
        }
    }
}

#[proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager"
)]
trait NetworkManager {
    /// Overall networking state
    #[zbus(property)]
    fn state(&self) -> zbus::Result<u32>;
}

/// Network status query
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkStatus: Send + Sync {
    /// A connection is being activated
    async fn is_connecting(&self) -> bool;

    /// At least one connection is up
    async fn is_connected(&self) -> bool;
}

/// NetworkManager on the system bus
#[derive(Debug, Clone, Default)]
pub struct NetworkManagerStatus;

impl NetworkManagerStatus {
    /// Create a client; the bus is connected per query
    pub fn new() -> Self {
        Self
    }

    async fn state(&self) -> NmState {
        let raw = async {
            let connection = Connection::system().await?;
            let proxy = NetworkManagerProxy::new(&connection).await?;
            proxy.state().await
        };

        match raw.await {
            Ok(state) => {
                debug!("NetworkManager state: {}", state);
                NmState::from_raw(state)
            }
            Err(e) => {
                warn!("Cannot query NetworkManager: {}", e);
                NmState::Offline
            }
        }
    }
}

#[async_trait]
impl NetworkStatus for NetworkManagerStatus {
    async fn is_connecting(&self) -> bool {
        self.state().await == NmState::Connecting
    }

    async fn is_connected(&self) -> bool {
        self.state().await == NmState::Connected
    }
}
