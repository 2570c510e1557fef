use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    session::Session,
    task_manager::TaskManager,
};

/// Display discovery service provider.
///
/// Provides the critical service that discovers the attached displays on
/// startup and rediscovers them whenever a re-scan is requested: monitor
/// hot-plug, a `Rescan` D-Bus call, or a configuration change that
/// invalidates the display list.
///
/// # Priority and Criticality
///
/// - **Priority**: 10 (highest)
/// - **Critical**: Yes (the daemon is useless without displays)
pub struct DiscoveryServiceProvider {
    session: Session,
    event_bus: EventBus,
}

impl DiscoveryServiceProvider {
    pub fn new(session: Session, event_bus: EventBus) -> Self {
        Self { session, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for DiscoveryServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let session = self.session.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_discovery_service(session, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "DiscoveryService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

async fn run_discovery_service(
    session: Session,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut event_rx = event_bus.subscribe();

    // Initial pass. Finding nothing is not an error: ddcutil may be
    // missing or all displays asleep, and a later rescan can recover.
    match session.rediscover().await {
        Ok(0) => warn!("Initial discovery found no displays"),
        Ok(n) => info!("Initial discovery found {n} display(s)"),
        Err(e) => error!("Initial discovery failed: {e}"),
    }

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Discovery service cancelled");
                break;
            }
            event = event_rx.recv() => {
                match event {
                    Ok(Event::RescanRequested) => {
                        info!("Re-scan requested, rediscovering displays");
                        if let Err(e) = session.rediscover().await {
                            error!("Rediscovery failed: {e}");
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Discovery service lagged by {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        warn!("Event bus closed, discovery service exiting");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}
