//! D-Bus service provider for dependency injection.

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use tokio_util::sync::CancellationToken;
use zbus::Connection;

use crate::{
    event::{Event, EventBus},
    interface::{DBusInterface, OBJECT_PATH, SERVICE_NAME},
    providers::traits::ServiceProvider,
    session::Session,
    task_manager::TaskManager,
};

/// D-Bus service provider for external system integration.
///
/// Exposes the display list and brightness control on the session bus:
/// shell applets and scripts call `ListDisplays`/`SetBrightness`, ask for
/// a `Rescan` after hot-plug, and follow the `DisplaysChanged` signal to
/// keep their view current.
///
/// # Priority and Criticality
///
/// - **Priority**: 8 (high)
/// - **Critical**: No (brightness keeps working headless; creation fails
///   gracefully when no session bus is available)
///
/// # Interface
///
/// - **Service Name**: `io.github.ddcbrightnessd`
/// - **Object Path**: `/io/github/ddcbrightnessd`
pub struct DBusServiceProvider {
    session: Session,
    event_bus: EventBus,
    connection: Connection,
}

impl DBusServiceProvider {
    /// Creates a new D-Bus service provider with session bus connection.
    pub async fn new(session: Session, event_bus: EventBus) -> Result<Self> {
        let connection = Connection::session().await?;
        Ok(Self {
            session,
            event_bus,
            connection,
        })
    }
}

#[async_trait]
impl ServiceProvider for DBusServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let session = self.session.clone();
        let event_bus = self.event_bus.clone();
        let connection = self.connection.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_dbus_service(session, event_bus, connection, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "DBusService"
    }

    fn priority(&self) -> i32 {
        8
    }

    fn is_critical(&self) -> bool {
        false
    }
}

/// Serves the interface and relays display-list changes as the
/// `DisplaysChanged` signal until cancellation.
async fn run_dbus_service(
    session: Session,
    event_bus: EventBus,
    connection: Connection,
    cancel_token: CancellationToken,
) -> Result<()> {
    let interface = DBusInterface {
        session,
        event_bus: event_bus.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    connection.object_server().at(OBJECT_PATH, interface).await?;
    connection.request_name(SERVICE_NAME).await?;
    info!("D-Bus service available as {SERVICE_NAME}");

    let mut event_rx = event_bus.subscribe();

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("D-Bus service cancelled");
                break;
            }
            event = event_rx.recv() => {
                match event {
                    Ok(Event::DisplaysRebuilt) => {
                        if let Err(e) = DBusInterface::notify_displays_changed(&connection).await {
                            warn!("Failed to emit DisplaysChanged signal: {e}");
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("D-Bus service lagged by {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}
