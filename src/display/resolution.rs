//! Display readiness and screen resolution
//!
//! The compositor exposes `org.gnome.Mutter.DisplayConfig` on the session
//! bus once it can be queried. Readiness is the moment that name gets an
//! owner; the resolution is then applied as a temporary monitor
//! configuration.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use zbus::fdo::DBusProxy;
use zbus::names::BusName;
use zbus::zvariant::OwnedValue;
use zbus::{proxy, Connection};

use crate::error::{Result, SessionError};
use crate::options::Resolution;

/// Well-known name of the display configuration service
pub const DISPLAY_CONFIG_SERVICE: &str = "org.gnome.Mutter.DisplayConfig";

/// `ApplyMonitorsConfig` method: apply without persisting
const METHOD_TEMPORARY: u32 = 1;

const BUS_RETRY_INTERVAL: Duration = Duration::from_millis(500);

type Properties = HashMap<String, OwnedValue>;

/// connector, vendor, product, serial
pub type MonitorSpec = (String, String, String, String);

/// id, width, height, refresh rate, preferred scale, supported scales, properties
pub type MonitorMode = (String, i32, i32, f64, f64, Vec<f64>, Properties);

/// Physical monitor with its modes
pub type Monitor = (MonitorSpec, Vec<MonitorMode>, Properties);

/// x, y, scale, transform, primary, monitors, properties
pub type LogicalMonitor = (i32, i32, f64, u32, bool, Vec<MonitorSpec>, Properties);

/// x, y, scale, transform, primary, (connector, mode id, properties)
pub type LogicalMonitorConfig = (i32, i32, f64, u32, bool, Vec<(String, String, Properties)>);

#[proxy(
    interface = "org.gnome.Mutter.DisplayConfig",
    default_service = "org.gnome.Mutter.DisplayConfig",
    default_path = "/org/gnome/Mutter/DisplayConfig"
)]
trait DisplayConfig {
    /// Current monitor layout
    fn get_current_state(
        &self,
    ) -> zbus::Result<(u32, Vec<Monitor>, Vec<LogicalMonitor>, Properties)>;

    /// Apply a monitor layout
    fn apply_monitors_config(
        &self,
        serial: u32,
        method: u32,
        logical_monitors: Vec<LogicalMonitorConfig>,
        properties: Properties,
    ) -> zbus::Result<()>;
}

/// Resolves once the display configuration service can be queried
#[async_trait]
pub trait DisplayReadiness: Send + Sync {
    /// Wait until the display is ready; callers bound this with a timeout
    async fn wait_ready(&self) -> Result<()>;
}

/// Applies a screen resolution
#[async_trait]
pub trait ResolutionSetter: Send + Sync {
    /// Set the resolution of the primary monitor
    async fn set_resolution(&self, resolution: Resolution) -> Result<()>;
}

/// Pick the mode matching `resolution`, highest refresh rate first
pub fn find_mode(modes: &[MonitorMode], resolution: Resolution) -> Option<&MonitorMode> {
    modes
        .iter()
        .filter(|(_, width, height, ..)| {
            u32::try_from(*width).ok() == Some(resolution.width)
                && u32::try_from(*height).ok() == Some(resolution.height)
        })
        .max_by(|a, b| a.3.total_cmp(&b.3))
}

/// Layout with the first monitor alone, running `resolution`
pub fn single_monitor_config(
    monitors: &[Monitor],
    resolution: Resolution,
) -> Result<Vec<LogicalMonitorConfig>> {
    let (spec, modes, _) = monitors
        .first()
        .ok_or_else(|| SessionError::startup_failed("resolution", "no monitors reported"))?;

    let (mode_id, ..) = find_mode(modes, resolution).ok_or_else(|| {
        SessionError::startup_failed(
            "resolution",
            format!("{} does not support {}", spec.0, resolution),
        )
    })?;

    Ok(vec![(
        0,
        0,
        1.0,
        0,
        true,
        vec![(spec.0.clone(), mode_id.clone(), Properties::new())],
    )])
}

/// Mutter display configuration client on the session bus
#[derive(Debug, Clone, Default)]
pub struct MutterDisplayConfig;

impl MutterDisplayConfig {
    /// Create a client; the bus is connected on first use
    pub fn new() -> Self {
        Self
    }

    /// The session bus only exists once the user session is up
    async fn connect_when_available() -> Connection {
        loop {
            match Connection::session().await {
                Ok(connection) => return connection,
                Err(e) => {
                    debug!("Session bus not available yet: {}", e);
                    tokio::time::sleep(BUS_RETRY_INTERVAL).await;
                }
            }
        }
    }
}

#[async_trait]
impl DisplayReadiness for MutterDisplayConfig {
    async fn wait_ready(&self) -> Result<()> {
        let connection = Self::connect_when_available().await;
        let dbus = DBusProxy::new(&connection).await?;

        // Subscribe before checking so an owner change in between is not lost
        let mut owner_changes = dbus.receive_name_owner_changed().await?;

        let name = BusName::try_from(DISPLAY_CONFIG_SERVICE).map_err(zbus::Error::from)?;
        if dbus.name_has_owner(name).await? {
            debug!("{} already available", DISPLAY_CONFIG_SERVICE);
            return Ok(());
        }

        while let Some(signal) = owner_changes.next().await {
            let Ok(args) = signal.args() else {
                continue;
            };

            if args.name().as_str() == DISPLAY_CONFIG_SERVICE && args.new_owner().is_some() {
                info!("{} is available", DISPLAY_CONFIG_SERVICE);
                return Ok(());
            }
        }

        Err(SessionError::startup_failed(
            DISPLAY_CONFIG_SERVICE,
            "session bus closed before the service appeared",
        ))
    }
}

#[async_trait]
impl ResolutionSetter for MutterDisplayConfig {
    async fn set_resolution(&self, resolution: Resolution) -> Result<()> {
        info!("Setting the screen resolution to: {}", resolution);

        let connection = Connection::session().await?;
        let proxy = DisplayConfigProxy::new(&connection).await?;

        let (serial, monitors, _, _) = proxy.get_current_state().await?;
        let layout = match single_monitor_config(&monitors, resolution) {
            Ok(layout) => layout,
            Err(e) => {
                let available: Vec<String> = monitors
                    .iter()
                    .flat_map(|(_, modes, _)| modes.iter().map(|m| format!("{}x{}", m.1, m.2)))
                    .collect();
                warn!("Supported modes: {}", available.join(", "));
                return Err(e);
            }
        };

        proxy
            .apply_monitors_config(serial, METHOD_TEMPORARY, layout, Properties::new())
            .await?;

        info!("Screen resolution set to {}", resolution);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(id: &str, width: i32, height: i32, refresh: f64) -> MonitorMode {
        (
            id.to_string(),
            width,
            height,
            refresh,
            1.0,
            vec![1.0],
            Properties::new(),
        )
    }

    fn monitor(connector: &str, modes: Vec<MonitorMode>) -> Monitor {
        (
            (
                connector.to_string(),
                "RHT".to_string(),
                "QEMU Monitor".to_string(),
                "0x00000000".to_string(),
            ),
            modes,
            Properties::new(),
        )
    }

    #[test]
    fn test_find_mode_prefers_highest_refresh() {
        let modes = vec![
            mode("1024x768@60", 1024, 768, 60.0),
            mode("1024x768@75", 1024, 768, 75.0),
            mode("800x600@60", 800, 600, 60.0),
        ];

        let found = find_mode(&modes, Resolution::new(1024, 768)).unwrap();
        assert_eq!(found.0, "1024x768@75");
        assert!(find_mode(&modes, Resolution::new(1920, 1080)).is_none());
    }

    #[test]
    fn test_single_monitor_config() {
        let monitors = vec![
            monitor("Virtual-1", vec![mode("800x600@60", 800, 600, 60.0)]),
            monitor("Virtual-2", vec![mode("800x600@60", 800, 600, 60.0)]),
        ];

        let layout = single_monitor_config(&monitors, Resolution::new(800, 600)).unwrap();
        assert_eq!(layout.len(), 1);

        let (x, y, scale, _, primary, assigned) = &layout[0];
        assert_eq!((*x, *y), (0, 0));
        assert_eq!(*scale, 1.0);
        assert!(*primary);
        assert_eq!(assigned[0].0, "Virtual-1");
        assert_eq!(assigned[0].1, "800x600@60");
    }

    #[test]
    fn test_unsupported_resolution() {
        let monitors = vec![monitor("Virtual-1", vec![mode("800x600@60", 800, 600, 60.0)])];
        assert!(single_monitor_config(&monitors, Resolution::new(1280, 1024)).is_err());
        assert!(single_monitor_config(&[], Resolution::new(800, 600)).is_err());
    }
}
