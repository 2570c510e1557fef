//! Shared session state: the discovered displays and their write path.
//!
//! One `Session` is built when the daemon starts and lives until shutdown;
//! a session reload rediscovers the displays in place. Everything here is
//! cheap to clone and safe to share across services.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::{
    config::ConfigManager,
    display::{Display, raw_from_percent},
    prober::Prober,
    reload::ReloadHandle,
    runner::CommandRunner,
    scheduler::WriteScheduler,
};

/// Shared session state for the running daemon.
#[derive(Clone)]
pub struct Session {
    /// Configuration manager for centralized config handling
    pub config_manager: Arc<ConfigManager>,
    /// Displays found by the last discovery pass
    displays: Arc<Mutex<Vec<Display>>>,
    /// Debounced per-bus write scheduler
    scheduler: WriteScheduler,
    /// External-command execution
    runner: Arc<dyn CommandRunner>,
    /// Debounced rebuild/reload scheduling
    reload: ReloadHandle,
}

impl Session {
    pub async fn new(
        config_manager: Arc<ConfigManager>,
        runner: Arc<dyn CommandRunner>,
        reload: ReloadHandle,
    ) -> Self {
        let quiet_window = config_manager.get().await.quiet_window();
        Self {
            config_manager,
            displays: Arc::new(Mutex::new(Vec::new())),
            scheduler: WriteScheduler::new(quiet_window),
            runner,
            reload,
        }
    }

    /// Snapshot of the current display list.
    pub fn displays(&self) -> Vec<Display> {
        self.lock_displays().clone()
    }

    /// Drops all discovered displays and every pending write.
    pub fn clear(&self) {
        self.scheduler.clear();
        self.lock_displays().clear();
        debug!("session cleared");
    }

    /// Runs a discovery pass, replacing the display list. Each display is
    /// appended as its probe completes and schedules a debounced menu
    /// rebuild, so consumers see partial results early.
    pub async fn rediscover(&self) -> Result<usize> {
        let config = self.config_manager.clone_config().await;
        self.clear();

        let prober = Prober::new(self.runner.clone());
        let displays = self.displays.clone();
        let reload = self.reload.clone();
        let found = prober
            .discover(&config, |display| {
                displays
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(display.clone());
                reload.schedule_menu_rebuild();
            })
            .await
            .context("Display discovery failed")?;

        info!("Discovery finished: {} display(s)", found.len());
        Ok(found.len())
    }

    /// Sets the brightness of one display to a percentage.
    ///
    /// The write itself is debounced per bus; the in-memory display state
    /// is updated immediately and not rolled back on a failed write.
    pub async fn set_brightness(&self, bus: &str, percent: u8) -> Result<()> {
        let config = self.config_manager.clone_config().await;

        let (vcp_code, max) = {
            let displays = self.lock_displays();
            let display = displays
                .iter()
                .find(|d| d.bus == bus)
                .with_context(|| format!("No display on bus {bus}"))?;
            (display.vcp_code.clone(), display.max)
        };

        let raw = raw_from_percent(percent, max, config.allow_zero_brightness);
        if let Some(display) = self.lock_displays().iter_mut().find(|d| d.bus == bus) {
            display.current = f64::from(raw) / f64::from(max);
        }

        let argv = config.setvcp_argv(&vcp_code, raw, bus);
        let runner = self.runner.clone();
        let bus_owned = bus.to_string();
        self.scheduler.request(
            bus,
            Box::pin(async move {
                debug!("bus {bus_owned}: writing raw brightness {raw}");
                let outcome = runner.run(argv).await;
                if !outcome.succeeded {
                    warn!(
                        "Brightness write on bus {} failed: {}",
                        bus_owned,
                        outcome.output.trim()
                    );
                }
            }),
        );
        Ok(())
    }

    /// Applies configuration changes that do not require rediscovery.
    ///
    /// A bus already draining keeps its old quiet window and its pending
    /// write; the new window applies from the next write on.
    pub async fn apply_hot_config(&self) {
        let config = self.config_manager.clone_config().await;
        self.scheduler.set_quiet_window(config.quiet_window());
        self.reload.set_debounce(
            config.menu_reload_debounce(),
            config.session_reload_debounce(),
        );
        log::set_max_level(if config.verbose_debugging {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        });
        debug!("hot configuration applied");
    }

    pub fn reload_handle(&self) -> &ReloadHandle {
        &self.reload
    }

    fn lock_displays(&self) -> std::sync::MutexGuard<'_, Vec<Display>> {
        self.displays.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn insert_display(&self, display: Display) {
        self.lock_displays().push(display);
    }
}
