//! Per-bus serialization and debouncing of brightness writes.
//!
//! DDC/CI writes on one I2C bus must be spaced apart or the display
//! firmware drops them, while writes to different buses are independent.
//! The scheduler keeps one small state machine per bus: the first request
//! is issued almost immediately, then the bus enters a quiet window during
//! which newer requests coalesce (latest value wins) until the window
//! elapses and the pending write is issued.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use log::debug;
use tokio::task::JoinHandle;

/// A prepared write, executed fire-and-forget when its slot comes up.
pub type WriteFuture = BoxFuture<'static, ()>;

/// Countdown granularity. The quiet window is drained in ticks of this
/// size so a replacement request never has to cancel and re-arm a timer.
const TICK: Duration = Duration::from_millis(1);

struct BusEntry {
    /// Pending write, replaced wholesale by newer requests.
    writer: Option<WriteFuture>,
    /// Ticks remaining before the pending write may be issued.
    countdown: u32,
    /// Draining task; `None` while the bus is resting between bursts.
    ticker: Option<JoinHandle<()>>,
}

struct Inner {
    buses: DashMap<String, Mutex<BusEntry>>,
    quiet_ticks: AtomicU32,
}

/// Debounced, serialized write scheduler keyed by I2C bus.
///
/// `request` is synchronous and cheap; the actual command runs on a
/// background task. Cloning shares the same bus table.
#[derive(Clone)]
pub struct WriteScheduler {
    inner: Arc<Inner>,
}

impl WriteScheduler {
    pub fn new(quiet_window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                buses: DashMap::new(),
                quiet_ticks: AtomicU32::new(window_ticks(quiet_window)),
            }),
        }
    }

    /// Adjusts the quiet window. Applies to writes issued after the call;
    /// a bus already draining finishes on its old schedule.
    pub fn set_quiet_window(&self, quiet_window: Duration) {
        self.inner
            .quiet_ticks
            .store(window_ticks(quiet_window), Ordering::Relaxed);
    }

    /// Schedules a write for `bus`, replacing any write still pending
    /// there. On a bus not seen before (or resting with an elapsed quiet
    /// window) the write goes out on the next tick; otherwise it waits for
    /// the remainder of the window.
    pub fn request(&self, bus: &str, write: WriteFuture) {
        match self.inner.buses.entry(bus.to_string()) {
            Entry::Occupied(occupied) => {
                let mut entry = lock(occupied.get());
                entry.writer = Some(write);
                if entry.ticker.is_none() {
                    debug!("bus {bus}: waking from rest, draining quiet window");
                    entry.ticker = Some(spawn_ticker(self.inner.clone(), bus.to_string()));
                }
            }
            Entry::Vacant(vacant) => {
                debug!("bus {bus}: first write request");
                let cell = vacant.insert(Mutex::new(BusEntry {
                    writer: Some(write),
                    countdown: 0,
                    ticker: None,
                }));
                lock(&cell).ticker = Some(spawn_ticker(self.inner.clone(), bus.to_string()));
            }
        }
    }

    /// Drops all per-bus state and stops every draining task. Writes
    /// already handed to the runtime are not interrupted.
    pub fn clear(&self) {
        for cell in self.inner.buses.iter() {
            if let Some(ticker) = lock(cell.value()).ticker.take() {
                ticker.abort();
            }
        }
        self.inner.buses.clear();
        debug!("write scheduler cleared");
    }

    #[cfg(test)]
    fn bus_count(&self) -> usize {
        self.inner.buses.len()
    }
}

fn window_ticks(window: Duration) -> u32 {
    window.as_millis().min(u128::from(u32::MAX)) as u32
}

fn lock<'a>(cell: &'a Mutex<BusEntry>) -> std::sync::MutexGuard<'a, BusEntry> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drains one bus: every tick either issues the pending write (countdown
/// reached zero) or counts down. After issuing, the entry is parked with a
/// full quiet window on the clock and the task exits; the next request
/// restarts draining, so two writes on one bus are always at least a quiet
/// window apart.
fn spawn_ticker(inner: Arc<Inner>, bus: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(TICK).await;

            let Some(cell) = inner.buses.get(&bus) else {
                // Cleared while we slept
                return;
            };
            let mut entry = lock(&cell);

            if entry.countdown > 0 {
                entry.countdown -= 1;
                continue;
            }

            if let Some(write) = entry.writer.take() {
                debug!("bus {bus}: issuing write");
                tokio::spawn(write);
            }
            entry.countdown = inner.quiet_ticks.load(Ordering::Relaxed);
            entry.ticker = None;
            return;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::task::yield_now;
    use tokio::time::advance;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> WriteFuture) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |value: u32| -> WriteFuture {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().push(value);
            })
        };
        (log, make)
    }

    fn written(log: &Arc<Mutex<Vec<u32>>>) -> Vec<u32> {
        log.lock().unwrap().clone()
    }

    /// Lets freshly spawned tasks register their timers.
    async fn settle() {
        for _ in 0..5 {
            yield_now().await;
        }
    }

    /// Advances `n` ticks of virtual time, running tickers in between.
    async fn run_ticks(n: u32) {
        for _ in 0..n {
            advance(TICK).await;
            settle().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_to_single_latest_write() {
        let scheduler = WriteScheduler::new(Duration::from_millis(100));
        let (log, write) = recorder();

        // Synchronous burst: the slider moved five times before the first
        // tick ever ran.
        for value in 1..=5 {
            scheduler.request("3", write(value));
        }
        settle().await;
        run_ticks(2).await;

        assert_eq!(written(&log), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_write_goes_out_on_first_tick() {
        let scheduler = WriteScheduler::new(Duration::from_millis(100));
        let (log, write) = recorder();

        scheduler.request("3", write(42));
        settle().await;
        assert_eq!(written(&log), Vec::<u32>::new());

        run_ticks(1).await;
        assert_eq!(written(&log), vec![42]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_write_waits_out_the_quiet_window() {
        let scheduler = WriteScheduler::new(Duration::from_millis(10));
        let (log, write) = recorder();

        scheduler.request("3", write(1));
        settle().await;
        run_ticks(1).await;
        assert_eq!(written(&log), vec![1]);

        // Immediately request again: the bus is resting with a full quiet
        // window on the clock.
        scheduler.request("3", write(2));
        settle().await;

        run_ticks(9).await;
        assert_eq!(written(&log), vec![1], "write must not jump the window");

        run_ticks(3).await;
        assert_eq!(written(&log), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_during_drain_keep_only_the_latest() {
        let scheduler = WriteScheduler::new(Duration::from_millis(10));
        let (log, write) = recorder();

        scheduler.request("3", write(1));
        settle().await;
        run_ticks(1).await;

        scheduler.request("3", write(2));
        settle().await;
        run_ticks(4).await;
        scheduler.request("3", write(3));
        run_ticks(10).await;

        assert_eq!(written(&log), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn buses_drain_independently() {
        let scheduler = WriteScheduler::new(Duration::from_millis(100));
        let (log, write) = recorder();

        scheduler.request("3", write(10));
        scheduler.request("5", write(20));
        settle().await;
        run_ticks(2).await;

        let mut values = written(&log);
        values.sort_unstable();
        assert_eq!(values, vec![10, 20]);
        assert_eq!(scheduler.bus_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn redundant_value_is_still_written() {
        let scheduler = WriteScheduler::new(Duration::from_millis(5));
        let (log, write) = recorder();

        scheduler.request("3", write(7));
        settle().await;
        run_ticks(1).await;
        scheduler.request("3", write(7));
        settle().await;
        run_ticks(10).await;

        // No value diffing: the device may have changed state on its own
        assert_eq!(written(&log), vec![7, 7]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_pending_writes() {
        let scheduler = WriteScheduler::new(Duration::from_millis(100));
        let (log, write) = recorder();

        scheduler.request("3", write(1));
        scheduler.request("5", write(2));
        settle().await;
        scheduler.clear();
        run_ticks(5).await;

        assert_eq!(written(&log), Vec::<u32>::new());
        assert_eq!(scheduler.bus_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduling_works_after_clear() {
        let scheduler = WriteScheduler::new(Duration::from_millis(5));
        let (log, write) = recorder();

        scheduler.request("3", write(1));
        settle().await;
        scheduler.clear();
        scheduler.request("3", write(2));
        settle().await;
        run_ticks(2).await;

        assert_eq!(written(&log), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn narrower_window_applies_to_later_writes() {
        let scheduler = WriteScheduler::new(Duration::from_millis(50));
        let (log, write) = recorder();

        scheduler.request("3", write(1));
        settle().await;
        run_ticks(1).await;

        scheduler.set_quiet_window(Duration::from_millis(5));
        scheduler.request("3", write(2));
        settle().await;
        // Old 50 ms window still governs this write
        run_ticks(52).await;
        assert_eq!(written(&log), vec![1, 2]);

        scheduler.request("3", write(3));
        settle().await;
        run_ticks(7).await;
        assert_eq!(written(&log), vec![1, 2, 3]);
    }
}
