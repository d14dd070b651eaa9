//! Clock sources and the tick broadcaster

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, trace};

/// Source of the current epoch second
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `secs`, returning the new time
    pub fn advance(&self, secs: i64) -> i64 {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Default tick period
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

const TICK_CHANNEL_CAPACITY: usize = 64;

/// Broadcasts the current epoch second once per period
#[derive(Debug, Clone)]
pub struct TimeSource {
    tx: broadcast::Sender<i64>,
    period: Duration,
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new(TICK_PERIOD)
    }
}

impl TimeSource {
    pub fn new(period: Duration) -> Self {
        let (tx, _) = broadcast::channel(TICK_CHANNEL_CAPACITY);
        Self { tx, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Receiver for subsequent ticks
    pub fn subscribe(&self) -> broadcast::Receiver<i64> {
        self.tx.subscribe()
    }

    /// Emit one tick immediately. Returns the number of receivers reached.
    pub fn emit(&self, now: i64) -> usize {
        self.tx.send(now).unwrap_or(0)
    }

    /// Start ticking until `shutdown` flips to `true` or its sender is dropped
    pub fn spawn(
        &self,
        clock: Arc<dyn Clock>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let source = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(source.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(period_ms = source.period.as_millis() as u64, "Time source started");

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let now = clock.now();
                        let receivers = source.emit(now);
                        trace!(timestamp = now, receivers, "Tick");
                    }
                }
            }

            info!("Time source stopped");
        })
    }
}
