//! System coordinator for managing service lifecycle and dependency injection.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    config::ConfigManager,
    event::{ConfigChangeType, Event, EventBus},
    providers::{
        AsyncProvider, ConfigWatcherServiceProvider, DBusServiceProvider,
        DiscoveryServiceProvider, ServiceProvider, SessionProvider,
    },
    reload::{ReloadCallbacks, ReloadHandle, reload_coordinator},
    runner::ProcessRunner,
    session::Session,
    task_manager::TaskManager,
};

/// SystemCoordinator with Dependency Injection pattern.
///
/// Manages the complete lifecycle of all services using a provider-based
/// architecture for loose coupling and testability.
///
/// # Features
/// - Service prioritization (critical vs non-critical)
/// - Graceful degradation on service failures
/// - Event-driven communication between services
/// - Proper async initialization and shutdown
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    session: Option<Session>,
    reload: Option<ReloadHandle>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            session: None,
            reload: None,
            service_providers: Vec::new(),
        }
    }

    /// Asynchronously initializes all components: the reload coordinator,
    /// the shared session, and the service providers.
    pub async fn initialize(&mut self, config_manager: Arc<ConfigManager>) -> Result<()> {
        info!("Initializing SystemCoordinator...");

        let config = config_manager.clone_config().await;

        // Both debounced actions are realized as events: a menu rebuild
        // tells consumers to refresh their view, a session reload funnels
        // into the same rediscovery path a manual rescan takes.
        let rebuild_bus = self.event_bus.clone();
        let reload_bus = self.event_bus.clone();
        let (reload_handle, reload_worker) = reload_coordinator(
            config.menu_reload_debounce(),
            config.session_reload_debounce(),
            ReloadCallbacks {
                rebuild_menu: Box::new(move || {
                    let _ = rebuild_bus.publish(Event::DisplaysRebuilt);
                }),
                reload_session: Box::new(move || {
                    let bus = reload_bus.clone();
                    Box::pin(async move {
                        let _ = bus.publish(Event::RescanRequested);
                    })
                }),
            },
        );
        self.task_manager
            .spawn_task("ReloadCoordinator".to_string(), |token| async move {
                reload_worker.run(token).await
            })
            .await?;

        let session_provider = SessionProvider::new(
            config_manager,
            Arc::new(ProcessRunner::new()),
            reload_handle.clone(),
        );
        let session = session_provider
            .provide()
            .await
            .context("Failed to initialize session")?;

        self.reload = Some(reload_handle);
        self.session = Some(session.clone());

        self.register_service_providers(session)
            .await
            .context("Failed to register service providers")?;

        info!("SystemCoordinator initialization completed");
        Ok(())
    }

    /// Registers all service providers with prioritization.
    async fn register_service_providers(&mut self, session: Session) -> Result<()> {
        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(DiscoveryServiceProvider::new(
                session.clone(),
                self.event_bus.clone(),
            )),
            Box::new(ConfigWatcherServiceProvider::new(
                session.config_manager.clone(),
                self.event_bus.clone(),
            )),
        ];

        match DBusServiceProvider::new(session, self.event_bus.clone()).await {
            Ok(provider) => {
                providers.push(Box::new(provider));
            }
            Err(e) => {
                log::warn!(
                    "Failed to create D-Bus service provider: {}, skipping D-Bus service",
                    e
                );
            }
        }

        providers.sort_by_key(|b| std::cmp::Reverse(b.priority()));
        self.service_providers = providers;

        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );

        Ok(())
    }

    /// Starts all registered services in priority order.
    ///
    /// Critical services must start successfully, while non-critical services
    /// can fail without stopping the system.
    pub async fn start_all_services(&mut self) -> Result<()> {
        info!(
            "Starting {} services in priority order...",
            self.service_providers.len()
        );

        for provider in &self.service_providers {
            let is_critical = provider.is_critical();

            match provider.start(&mut self.task_manager).await {
                Ok(()) => {
                    info!(
                        "Service '{}' started successfully (priority: {}, critical: {})",
                        provider.name(),
                        provider.priority(),
                        is_critical
                    );
                }
                Err(e) if is_critical => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => {
                    log::warn!(
                        "Non-critical service '{}' failed to start: {}",
                        provider.name(),
                        e
                    );
                }
            }
        }

        info!("All critical services started successfully");
        Ok(())
    }

    /// Main event loop with enhanced error handling.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = self.event_bus.subscribe();
        info!("Starting main event loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => {
                            info!("Received Ctrl+C, initiating graceful shutdown...");
                            self.shutdown().await
                                .context("Failed to shutdown gracefully after Ctrl+C")?;
                            break;
                        }
                        Err(e) => {
                            bail!("Failed to listen for shutdown signal: {}", e);
                        }
                    }
                }

                event = event_rx.recv() => {
                    if !self.handle_event(event).await? {
                        break;
                    }
                }
            }
        }

        info!("Main event loop terminated");
        Ok(())
    }

    /// Handles application events. Returns `false` when the loop should
    /// stop.
    async fn handle_event(
        &mut self,
        event_result: Result<Event, tokio::sync::broadcast::error::RecvError>,
    ) -> Result<bool> {
        match event_result {
            Ok(Event::ConfigChangeDetected(change_type)) => {
                info!("Processing ConfigChangeDetected event");
                self.handle_config_change(change_type)
                    .await
                    .context("Failed to handle config change")?;
            }
            Ok(Event::SystemShutdown) => {
                info!("Processing SystemShutdown event");
                self.shutdown()
                    .await
                    .context("Failed to shutdown gracefully after SystemShutdown event")?;
                return Ok(false);
            }
            Ok(event) => {
                log::debug!("Received event: {event:?}");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                bail!("Event bus channel closed unexpectedly");
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("Event bus lagged by {n} messages");
            }
        }
        Ok(true)
    }

    /// Handles configuration change based on type. Both kinds start with
    /// reloading the file into memory; a discovery-affecting change then
    /// schedules a debounced session reload.
    async fn handle_config_change(&self, change_type: ConfigChangeType) -> Result<()> {
        let Some(session) = &self.session else {
            log::warn!("Cannot reload config: system not initialized");
            return Ok(());
        };

        session
            .config_manager
            .reload()
            .await
            .context("Failed to reload configuration")?;
        session.apply_hot_config().await;

        match change_type {
            ConfigChangeType::HotReload => {
                info!("Hot configuration reload completed");
            }
            ConfigChangeType::Rediscover { changed_keys } => {
                info!(
                    "Configuration keys {changed_keys:?} invalidate the display list, \
                     scheduling session reload"
                );
                if let Some(reload) = &self.reload {
                    reload.schedule_session_reload();
                }
            }
        }
        Ok(())
    }

    /// Performs graceful shutdown of all components.
    async fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        if let Some(session) = &self.session {
            session.clear();
        }

        if let Err(e) = self.task_manager.shutdown_all().await {
            log::error!("Error during task shutdown: {}", e);
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Returns a reference to the EventBus for testing purposes.
    #[allow(dead_code)]
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    #[allow(dead_code)]
    pub fn running_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }
}
