//! Daemon entry point tying configuration to the coordinator.

use std::sync::Arc;

use crate::{config::ConfigManager, coordinator::SystemCoordinator};
use anyhow::Result;

/// Top-level daemon object.
///
/// Built once in `main` and consumed by [`run`](Application::run), which
/// walks the whole lifecycle: coordinator initialization, service
/// startup, the event loop, and (from within the loop) shutdown.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use ddcbrightnessd::application::Application;
/// use ddcbrightnessd::config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = Arc::new(config::ConfigManager::load_or_default(None).await?);
/// let mut app = Application::builder()
///     .with_config_manager(config_manager)
///     .build()
///     .await?;
///
/// app.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    pub coordinator: SystemCoordinator,
    config_manager: Arc<ConfigManager>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Runs the daemon until a shutdown signal or event arrives.
    pub async fn run(&mut self) -> Result<()> {
        self.coordinator
            .initialize(self.config_manager.clone())
            .await?;
        self.coordinator.start_all_services().await?;
        self.coordinator.run_main_loop().await
    }
}

/// Builder assembling an [`Application`] from its configuration.
pub struct ApplicationBuilder {
    config_manager: Option<Arc<ConfigManager>>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            config_manager: None,
        }
    }

    pub fn with_config_manager(mut self, config_manager: Arc<ConfigManager>) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    pub async fn build(self) -> Result<Application> {
        let config_manager = self
            .config_manager
            .ok_or_else(|| anyhow::anyhow!("Configuration manager is required"))?;

        Ok(Application {
            coordinator: SystemCoordinator::new(),
            config_manager,
        })
    }
}
