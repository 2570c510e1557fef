use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use notify::{Event, EventHandler, RecursiveMode, Watcher, recommended_watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConfigManager,
    event::{ConfigChangeType, Event as AppEvent, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Configuration file monitoring service provider.
///
/// Provides a non-critical service that watches the configuration file
/// with filesystem notifications (inotify on Linux) and publishes a
/// classified change event when the file is modified, enabling
/// hot-reloading without a daemon restart.
///
/// # Priority and Criticality
///
/// - **Priority**: 6 (medium)
/// - **Critical**: No (optional service)
pub struct ConfigWatcherServiceProvider {
    config_manager: Arc<ConfigManager>,
    event_bus: EventBus,
}

impl ConfigWatcherServiceProvider {
    pub fn new(config_manager: Arc<ConfigManager>, event_bus: EventBus) -> Self {
        Self {
            config_manager,
            event_bus,
        }
    }
}

#[async_trait]
impl ServiceProvider for ConfigWatcherServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let config_manager = self.config_manager.clone();
        let event_bus = self.event_bus.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_config_watcher_service(config_manager, event_bus, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "ConfigWatcherService"
    }

    fn priority(&self) -> i32 {
        6
    }

    fn is_critical(&self) -> bool {
        false
    }
}

/// Bridges the synchronous notify callback into the async loop.
#[derive(Debug)]
struct AsyncEventHandler {
    sender: mpsc::UnboundedSender<notify::Result<Event>>,
}

impl EventHandler for AsyncEventHandler {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        if let Err(e) = self.sender.send(event) {
            error!("Failed to send filesystem event to async handler: {}", e);
        }
    }
}

async fn run_config_watcher_service(
    config_manager: Arc<ConfigManager>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    let config_path = config_manager.path().to_path_buf();
    info!("Config watcher started for: {}", config_path.display());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut watcher = recommended_watcher(AsyncEventHandler { sender: event_tx })?;

    // Watch the directory: editors replace the file atomically, which
    // would invalidate a watch on the file itself
    let watch_path = match config_path.parent() {
        Some(parent) => parent.to_path_buf(),
        None => config_path.clone(),
    };

    watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;
    debug!("Watching directory: {}", watch_path.display());

    let mut debounce_interval = tokio::time::interval(Duration::from_millis(2000));
    debounce_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut has_pending_event = false;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Config watcher service cancelled");
                break;
            }

            event_result = event_rx.recv() => {
                match event_result {
                    Some(Ok(event)) => {
                        let affects_config = event.paths.iter().any(|path| {
                            path == &config_path
                                || path.file_name() == config_path.file_name()
                        });
                        let is_relevant = event.kind.is_modify() || event.kind.is_create();

                        if affects_config && is_relevant {
                            debug!("Config file touched, marking for debounced analysis");
                            has_pending_event = true;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Filesystem watcher error: {}", e);
                    }
                    None => {
                        warn!("Filesystem event channel closed, exiting");
                        break;
                    }
                }
            }

            _ = debounce_interval.tick(), if has_pending_event => {
                has_pending_event = false;

                if !config_path.exists() {
                    warn!("Configuration file {} no longer exists", config_path.display());
                    continue;
                }

                info!("Configuration file change detected, analyzing changes...");
                match config_manager.analyze_config_changes().await {
                    Ok(change_type) => {
                        match &change_type {
                            ConfigChangeType::HotReload => {
                                info!("Hot-reloadable changes detected");
                            }
                            ConfigChangeType::Rediscover { changed_keys } => {
                                info!(
                                    "Discovery-affecting keys changed: {changed_keys:?}, \
                                     display list will be rebuilt"
                                );
                            }
                        }
                        if let Err(e) =
                            event_bus.publish(AppEvent::ConfigChangeDetected(change_type))
                        {
                            error!("Failed to publish config change event: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to analyze configuration changes: {}", e);
                    }
                }
            }
        }
    }

    if let Err(e) = watcher.unwatch(&watch_path) {
        warn!("Failed to unwatch path during cleanup: {}", e);
    }

    info!("Config watcher service stopped");
    Ok(())
}
