//! Dependency injection providers for service management.
//!
//! This module contains all providers for creating and managing system components
//! using the Dependency Injection pattern for loose coupling and testability.

pub mod config_watcher;
pub mod dbus;
pub mod discovery;
pub mod session;
pub mod traits;

// Re-export core types for convenience
pub use config_watcher::ConfigWatcherServiceProvider;
pub use dbus::DBusServiceProvider;
pub use discovery::DiscoveryServiceProvider;
pub use session::SessionProvider;
pub use traits::{AsyncProvider, ServiceProvider};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::{
        config::{Config, ConfigManager},
        event::EventBus,
        reload::{ReloadCallbacks, reload_coordinator},
        runner::testing::ScriptedRunner,
        session::Session,
    };
    use pretty_assertions::assert_eq;
    use std::{path::PathBuf, sync::Arc, time::Duration};

    async fn test_session() -> Session {
        let manager = Arc::new(ConfigManager::new(
            Config::default(),
            PathBuf::from("/tmp/test.yml"),
        ));
        let (handle, _worker) = reload_coordinator(
            Duration::from_millis(100),
            Duration::from_millis(100),
            ReloadCallbacks {
                rebuild_menu: Box::new(|| {}),
                reload_session: Box::new(|| Box::pin(async {})),
            },
        );
        Session::new(manager, Arc::new(ScriptedRunner::new()), handle).await
    }

    #[tokio::test]
    async fn providers_share_session_and_event_bus() {
        let session = test_session().await;
        let event_bus = EventBus::new();

        let discovery = DiscoveryServiceProvider::new(session.clone(), event_bus.clone());
        let watcher = ConfigWatcherServiceProvider::new(
            session.config_manager.clone(),
            event_bus.clone(),
        );

        assert_eq!(discovery.name(), "DiscoveryService");
        assert_eq!(watcher.name(), "ConfigWatcherService");
        assert!(discovery.priority() > watcher.priority());
        assert!(discovery.is_critical());
        assert!(!watcher.is_critical());
    }

    #[tokio::test]
    async fn session_provider_builds_a_session() {
        let manager = Arc::new(ConfigManager::new(
            Config::default(),
            PathBuf::from("/tmp/test.yml"),
        ));
        let (handle, _worker) = reload_coordinator(
            Duration::from_millis(100),
            Duration::from_millis(100),
            ReloadCallbacks {
                rebuild_menu: Box::new(|| {}),
                reload_session: Box::new(|| Box::pin(async {})),
            },
        );

        let provider = SessionProvider::new(manager, Arc::new(ScriptedRunner::new()), handle);
        let session = provider.provide().await.unwrap();
        assert!(session.displays().is_empty());
    }
}
