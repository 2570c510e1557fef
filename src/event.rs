//! Event-driven communication system for inter-service messaging.

use anyhow::Result;
use tokio::sync::broadcast;

/// Type of configuration change detected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChangeType {
    /// Changes applied in place: timing, write pacing, extra arguments
    HotReload,
    /// Changes that invalidate the discovered display list
    Rediscover {
        /// The discovery-affecting keys that changed
        changed_keys: Vec<String>,
    },
}

/// Application events for inter-service communication.
///
/// Events are published through the EventBus and consumed by interested services.
/// This enables loose coupling between components.
#[derive(Debug, Clone)]
pub enum Event {
    /// Configuration change detection with type classification
    ConfigChangeDetected(ConfigChangeType),
    /// A full re-scan of the I2C buses was requested (hot-plug, D-Bus call)
    RescanRequested,
    /// The display list changed and consumers should refresh their view
    DisplaysRebuilt,
    SystemShutdown,
}

/// Event bus for publish-subscribe messaging between services.
///
/// Provides a centralized communication mechanism that allows services
/// to communicate without direct dependencies.
///
/// # Example
///
/// ```no_run
/// use ddcbrightnessd::event::{Event, EventBus};
///
/// // Create event bus and subscriber
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
///
/// // Publish an event
/// event_bus.publish(Event::RescanRequested);
///
/// // In async context, receive events:
/// // let event = subscriber.recv().await;
/// ```
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new EventBus with default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each subscriber receives all events published after subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn rescan_request_fans_out_to_every_service() {
        // Discovery rediscovers on it, the D-Bus relay ignores it; both
        // must see a hot-plug rescan.
        let bus = EventBus::new();
        let mut discovery_rx = bus.subscribe();
        let mut dbus_rx = bus.subscribe();

        bus.publish(Event::RescanRequested).unwrap();

        assert!(matches!(
            discovery_rx.recv().await.unwrap(),
            Event::RescanRequested
        ));
        assert!(matches!(
            dbus_rx.recv().await.unwrap(),
            Event::RescanRequested
        ));
    }

    #[tokio::test]
    async fn config_change_carries_its_classification() {
        // The watcher classifies, the coordinator acts on exactly the keys
        // the watcher named.
        let bus = EventBus::new();
        let mut coordinator_rx = bus.subscribe();

        let change = ConfigChangeType::Rediscover {
            changed_keys: vec!["vcp-codes".to_string()],
        };
        bus.publish(Event::ConfigChangeDetected(change.clone()))
            .unwrap();

        match coordinator_rx.recv().await.unwrap() {
            Event::ConfigChangeDetected(received) => assert_eq!(received, change),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_does_not_overtake_an_earlier_rebuild() {
        // The coordinator drains its queue in publication order, so the
        // D-Bus relay still emits its signal before the loop stops.
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(Event::DisplaysRebuilt).unwrap();
        bus.publish(Event::SystemShutdown).unwrap();

        assert!(matches!(rx.recv().await.unwrap(), Event::DisplaysRebuilt));
        assert!(matches!(rx.recv().await.unwrap(), Event::SystemShutdown));
    }

    #[test]
    fn publish_before_services_start_reports_an_error() {
        // The D-Bus Stop handler logs this case instead of failing the call
        let bus = EventBus::new();
        assert!(bus.publish(Event::SystemShutdown).is_err());
    }

    #[tokio::test]
    async fn service_starting_late_sees_only_later_events() {
        // A rebuilt event published before the D-Bus service came up is
        // gone; the next one reaches it.
        let bus = EventBus::new();
        let mut early = bus.subscribe();
        bus.publish(Event::DisplaysRebuilt).unwrap();
        early.recv().await.unwrap();

        let mut late = bus.subscribe();
        bus.publish(Event::RescanRequested).unwrap();

        assert!(matches!(late.recv().await.unwrap(), Event::RescanRequested));
    }

    #[tokio::test]
    async fn reload_callback_clone_publishes_into_the_same_channel() {
        // Reload callbacks hold their own clones of the bus and publish
        // from spawned tasks.
        let bus = EventBus::new();
        let publisher = bus.clone();
        let mut rx = bus.subscribe();

        tokio::spawn(async move {
            publisher.publish(Event::DisplaysRebuilt).unwrap();
        })
        .await
        .unwrap();

        assert!(matches!(rx.recv().await.unwrap(), Event::DisplaysRebuilt));
    }
}
