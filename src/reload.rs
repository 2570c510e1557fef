//! Debounced coordination of display-list rebuilds and session reloads.
//!
//! Discovery appends devices one at a time and several sources (config
//! edits, hot-plug, D-Bus calls) can each demand a refresh; this module
//! collapses those bursts. A menu rebuild refreshes consumers' view of the
//! display list; a session reload tears the session down and rediscovers
//! from scratch. Both are debounce-restart timers: every new demand pushes
//! the deadline out again.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use log::debug;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

enum Trigger {
    MenuRebuild,
    SessionReload,
}

/// Actions the worker invokes when a debounce window closes.
pub struct ReloadCallbacks {
    /// Refresh consumers' view of the current display list.
    pub rebuild_menu: Box<dyn Fn() + Send>,
    /// Tear down and rebuild the whole session.
    pub reload_session: Box<dyn Fn() -> BoxFuture<'static, ()> + Send>,
}

struct Shared {
    reloading: AtomicBool,
    menu_debounce_ms: AtomicU64,
    session_debounce_ms: AtomicU64,
}

/// Cheap cloneable handle for scheduling rebuilds and reloads.
#[derive(Clone)]
pub struct ReloadHandle {
    trigger_tx: mpsc::UnboundedSender<Trigger>,
    shared: Arc<Shared>,
}

impl ReloadHandle {
    /// Requests a display-list rebuild once the menu debounce window has
    /// been quiet. Ignored while a session reload is in flight, which
    /// would rebuild anyway.
    pub fn schedule_menu_rebuild(&self) {
        if self.shared.reloading.load(Ordering::Acquire) {
            debug!("menu rebuild suppressed: session reload in progress");
            return;
        }
        let _ = self.trigger_tx.send(Trigger::MenuRebuild);
    }

    /// Requests a full session reload once the session debounce window has
    /// been quiet.
    pub fn schedule_session_reload(&self) {
        let _ = self.trigger_tx.send(Trigger::SessionReload);
    }

    /// Updates both debounce windows; applies to demands arriving after
    /// the call.
    pub fn set_debounce(&self, menu: Duration, session: Duration) {
        self.shared
            .menu_debounce_ms
            .store(menu.as_millis() as u64, Ordering::Relaxed);
        self.shared
            .session_debounce_ms
            .store(session.as_millis() as u64, Ordering::Relaxed);
    }
}

/// Worker loop owning the two deadlines; run it through the task manager.
pub struct ReloadWorker {
    trigger_rx: mpsc::UnboundedReceiver<Trigger>,
    shared: Arc<Shared>,
    callbacks: ReloadCallbacks,
}

pub fn reload_coordinator(
    menu_debounce: Duration,
    session_debounce: Duration,
    callbacks: ReloadCallbacks,
) -> (ReloadHandle, ReloadWorker) {
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        reloading: AtomicBool::new(false),
        menu_debounce_ms: AtomicU64::new(menu_debounce.as_millis() as u64),
        session_debounce_ms: AtomicU64::new(session_debounce.as_millis() as u64),
    });
    (
        ReloadHandle {
            trigger_tx,
            shared: shared.clone(),
        },
        ReloadWorker {
            trigger_rx,
            shared,
            callbacks,
        },
    )
}

impl ReloadWorker {
    pub async fn run(mut self, token: CancellationToken) -> Result<()> {
        let mut menu_deadline: Option<Instant> = None;
        let mut session_deadline: Option<Instant> = None;

        loop {
            // Disabled arms still need a deadline value to sleep on
            let far = Instant::now() + Duration::from_secs(3600);

            tokio::select! {
                _ = token.cancelled() => {
                    debug!("reload coordinator stopping");
                    return Ok(());
                }
                trigger = self.trigger_rx.recv() => {
                    match trigger {
                        Some(Trigger::MenuRebuild) => {
                            let window = self.shared.menu_debounce_ms.load(Ordering::Relaxed);
                            menu_deadline =
                                Some(Instant::now() + Duration::from_millis(window));
                        }
                        Some(Trigger::SessionReload) => {
                            let window = self.shared.session_debounce_ms.load(Ordering::Relaxed);
                            session_deadline =
                                Some(Instant::now() + Duration::from_millis(window));
                        }
                        None => return Ok(()),
                    }
                }
                _ = sleep_until(menu_deadline.unwrap_or(far)), if menu_deadline.is_some() => {
                    menu_deadline = None;
                    if self.shared.reloading.load(Ordering::Acquire) {
                        debug!("menu rebuild skipped: session reload in progress");
                    } else {
                        debug!("rebuilding display menu");
                        (self.callbacks.rebuild_menu)();
                    }
                }
                _ = sleep_until(session_deadline.unwrap_or(far)), if session_deadline.is_some() => {
                    session_deadline = None;
                    // The reload ends in a rediscovery that rebuilds anyway
                    menu_deadline = None;
                    self.shared.reloading.store(true, Ordering::Release);
                    debug!("reloading session");
                    (self.callbacks.reload_session)().await;
                    self.shared.reloading.store(false, Ordering::Release);
                }
            }
        }
    }
}
