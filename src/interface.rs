use log::{error, warn};
use serde::{Deserialize, Serialize};
use zbus::{Connection, interface, object_server::SignalEmitter};
use zvariant::Type;

use crate::{
    event::{Event, EventBus},
    session::Session,
};

pub const OBJECT_PATH: &str = "/io/github/ddcbrightnessd";
pub const SERVICE_NAME: &str = "io.github.ddcbrightnessd";

/// Wire form of one display for D-Bus clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Type)]
pub struct DisplayInfo {
    pub bus: String,
    pub name: String,
    pub percent: u8,
}

pub struct DBusInterface {
    pub session: Session,
    pub event_bus: EventBus,
    pub version: String,
}

impl DBusInterface {
    /// Emits `DisplaysChanged` on the served object.
    pub async fn notify_displays_changed(connection: &Connection) -> zbus::Result<()> {
        let iface_ref = connection
            .object_server()
            .interface::<_, Self>(OBJECT_PATH)
            .await?;
        iface_ref.signal_emitter().displays_changed().await
    }
}

#[interface(name = "io.github.ddcbrightnessd1")]
impl DBusInterface {
    /// Emitted after the display list changed; clients re-call
    /// `ListDisplays`.
    #[zbus(signal)]
    async fn displays_changed(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn stopped(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    async fn list_displays(&self) -> Vec<DisplayInfo> {
        self.session
            .displays()
            .into_iter()
            .map(|d| DisplayInfo {
                percent: d.percent(),
                bus: d.bus,
                name: d.name,
            })
            .collect()
    }

    async fn set_brightness(&self, bus: String, percent: u8) -> zbus::fdo::Result<()> {
        self.session
            .set_brightness(&bus, percent)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Requests a bus re-scan, e.g. after a monitor was plugged in.
    async fn rescan(&self) {
        if let Err(e) = self.event_bus.publish(Event::RescanRequested) {
            warn!("Rescan request dropped: {e}");
        }
    }

    async fn stop(
        &self,
        #[zbus(signal_emitter)] emitter: SignalEmitter<'_>,
    ) -> zbus::fdo::Result<()> {
        emitter.stopped().await?;
        if let Err(e) = self.event_bus.publish(Event::SystemShutdown) {
            error!("{e}");
        }

        Ok(())
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }
}
