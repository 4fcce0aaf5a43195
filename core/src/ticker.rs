//! Repeating tick task owned by the sync engine.
//!
//! At most one task runs at a time. `start` and `stop` are idempotent, so
//! calling them on every state transition pairs each spawn with exactly one
//! abort. Dropping the `Ticker` aborts a running task. Subscribers only learn
//! that a tick happened; the running count stays internal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

pub(crate) const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

pub(crate) struct Ticker {
    period: Duration,
    handle: Option<JoinHandle<()>>,
    ticks: Arc<watch::Sender<()>>,
    fired: Arc<AtomicU64>,
    started: u64,
    cancelled: u64,
}

impl Ticker {
    pub(crate) fn new(period: Duration) -> Self {
        let (ticks, _) = watch::channel(());
        Self {
            period: non_zero(period),
            handle: None,
            ticks: Arc::new(ticks),
            fired: Arc::new(AtomicU64::new(0)),
            started: 0,
            cancelled: 0,
        }
    }

    /// Takes effect on the next `start`. A zero period falls back to
    /// [`DEFAULT_PERIOD`].
    pub(crate) fn set_period(&mut self, period: Duration) {
        self.period = non_zero(period);
    }

    /// Spawn the tick task unless one is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let ticks = Arc::clone(&self.ticks);
        let fired = Arc::clone(&self.fired);
        let period = self.period;
        self.handle = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                fired.fetch_add(1, Ordering::Relaxed);
                ticks.send_modify(|_| {});
            }
        }));
        self.started += 1;
        debug!(
            period_ms = period.as_millis() as u64,
            started = self.started,
            "tick task started"
        );
    }

    /// Abort the tick task if one is running.
    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            self.cancelled += 1;
            debug!(
                cancelled = self.cancelled,
                ticks = self.fired.load(Ordering::Relaxed),
                "tick task cancelled"
            );
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<()> {
        self.ticks.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn lifecycle(&self) -> (u64, u64) {
        (self.started, self.cancelled)
    }
}

fn non_zero(period: Duration) -> Duration {
    if period.is_zero() {
        DEFAULT_PERIOD
    } else {
        period
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
