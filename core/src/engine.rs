//! Client-side reconciliation of timer state for one work log.
//!
//! # Design
//! The server is the only source of truth. `TimerSyncEngine` keeps the last
//! fetched snapshot, derives the active (RUNNING) timer from it, and replaces
//! it wholesale on every successful `load`. `start` and `stop` never mutate
//! local state directly: they issue the call and then always reload.
//!
//! Interior state sits behind a mutex that is never held across an await, so
//! the engine can be shared by reference between concurrently polled tasks.
//! `pending_action` serializes start/stop: while one is in flight, further
//! start/stop calls return without touching the network. Concurrent `load`
//! calls are not ordered; the last one to complete wins.
//!
//! The snapshot belongs to the work log it was fetched for. Loading another
//! work log clears it before fetching, start/stop for any other work log see
//! no active timer, and a summary that arrives for a work log the engine has
//! since moved away from is dropped.
//!
//! While an active timer exists a tick task runs; it is spawned on the
//! transition into "has active timer" and aborted on the transition out, on
//! `shutdown`, and when the engine is dropped. After `shutdown` no tick task
//! is spawned again, even by a load that was already in flight. Elapsed time
//! is recomputed from the active timer's `created_at` on every read, never
//! accumulated from ticks.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::duration;
use crate::error::ApiError;
use crate::http::Transport;
use crate::repository::TimerRepository;
use crate::ticker::{self, Ticker};
use crate::types::{Timer, WorkLogId};

/// Diagnostic raised when a snapshot holds more than one RUNNING timer.
///
/// Non-fatal: the newest timer by `created_at` is shown as active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub running_ids: Vec<i64>,
    pub selected_id: i64,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} running timers reported; showing timer {}",
            self.running_ids.len(),
            self.selected_id
        )
    }
}

/// Everything the presentation layer renders, read under one lock.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerView {
    pub active_timer: Option<Timer>,
    pub elapsed_seconds: u64,
    pub display_duration: String,
    pub pending_action: bool,
    pub last_error: Option<ApiError>,
    pub anomaly: Option<Anomaly>,
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Start,
    Stop,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
        }
    }
}

/// Wall-clock reading paired with a monotonic instant, so "now" can be
/// derived without re-reading the wall clock.
#[derive(Debug, Clone, Copy)]
struct ClockAnchor {
    wall: DateTime<Utc>,
    monotonic: Instant,
}

impl ClockAnchor {
    fn capture() -> Self {
        Self {
            wall: Utc::now(),
            monotonic: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let since = TimeDelta::from_std(self.monotonic.elapsed()).unwrap_or_else(|_| TimeDelta::zero());
        self.wall + since
    }
}

struct ActiveTimer {
    timer: Timer,
    anchor: ClockAnchor,
}

struct EngineState {
    work_log: Option<WorkLogId>,
    snapshot: Vec<Timer>,
    active: Option<ActiveTimer>,
    anomaly: Option<Anomaly>,
    pending_action: bool,
    last_error: Option<ApiError>,
    ticker: Ticker,
    shut_down: bool,
}

impl EngineState {
    fn new(tick: Duration) -> Self {
        Self {
            work_log: None,
            snapshot: Vec::new(),
            active: None,
            anomaly: None,
            pending_action: false,
            last_error: None,
            ticker: Ticker::new(tick),
            shut_down: false,
        }
    }

    /// Point the state at `work_log_id`, discarding another work log's
    /// snapshot.
    fn select_work_log(&mut self, work_log_id: WorkLogId) {
        if self.work_log.replace(work_log_id) == Some(work_log_id) {
            return;
        }
        debug!(work_log_id = work_log_id.get(), "switching work log");
        self.apply_snapshot(Vec::new());
    }

    fn has_active(&self, work_log_id: WorkLogId) -> bool {
        self.work_log == Some(work_log_id) && self.active.is_some()
    }

    fn record_error(&mut self, err: ApiError) {
        warn!(error = %err, "timer operation failed");
        self.last_error = Some(err);
    }

    fn apply_snapshot(&mut self, snapshot: Vec<Timer>) {
        let (selected, anomaly) = select_active(&snapshot);
        if let Some(anomaly) = &anomaly {
            warn!(
                running = ?anomaly.running_ids,
                selected = anomaly.selected_id,
                "multiple running timers in snapshot"
            );
        }
        self.anomaly = anomaly;

        self.active = match (self.active.take(), selected) {
            (_, None) => {
                self.ticker.stop();
                None
            }
            (previous, Some(timer)) => {
                if !self.shut_down {
                    self.ticker.start();
                }
                let anchor = previous.map_or_else(ClockAnchor::capture, |p| p.anchor);
                Some(ActiveTimer { timer, anchor })
            }
        };
        self.snapshot = snapshot;

        debug!(
            timers = self.snapshot.len(),
            active = ?self.active.as_ref().map(|a| a.timer.id),
            ticking = self.ticker.is_running(),
            "snapshot applied"
        );
    }

    fn elapsed_seconds(&self) -> u64 {
        self.active.as_ref().map_or(0, |active| {
            duration::elapsed_seconds(active.timer.created_at, active.anchor.now())
        })
    }
}

/// Picks the RUNNING timer from a snapshot, newest `created_at` first.
fn select_active(snapshot: &[Timer]) -> (Option<Timer>, Option<Anomaly>) {
    let running: Vec<&Timer> = snapshot.iter().filter(|t| t.is_running()).collect();
    let Some(selected) = running.iter().copied().max_by_key(|t| (t.created_at, t.id)) else {
        return (None, None);
    };
    let anomaly = (running.len() > 1).then(|| Anomaly {
        running_ids: running.iter().map(|t| t.id).collect(),
        selected_id: selected.id,
    });
    (Some(selected.clone()), anomaly)
}

fn lock(state: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears `pending_action` when the owning start/stop call ends, including
/// when its future is dropped mid-flight.
struct PendingGuard<'a> {
    state: &'a Mutex<EngineState>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).pending_action = false;
    }
}

pub struct TimerSyncEngine<T> {
    repository: TimerRepository<T>,
    state: Mutex<EngineState>,
}

impl<T> TimerSyncEngine<T> {
    pub fn new(repository: TimerRepository<T>) -> Self {
        Self {
            repository,
            state: Mutex::new(EngineState::new(ticker::DEFAULT_PERIOD)),
        }
    }

    /// Override the tick period. A zero period falls back to one second.
    pub fn with_tick_interval(mut self, period: Duration) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .ticker
            .set_period(period);
        self
    }

    pub fn repository(&self) -> &TimerRepository<T> {
        &self.repository
    }

    pub fn active_timer(&self) -> Option<Timer> {
        lock(&self.state).active.as_ref().map(|a| a.timer.clone())
    }

    /// Whole seconds since the active timer started; 0 when none is active.
    pub fn elapsed_seconds(&self) -> u64 {
        lock(&self.state).elapsed_seconds()
    }

    pub fn display_duration(&self) -> String {
        duration::format_duration(self.elapsed_seconds())
    }

    pub fn pending_action(&self) -> bool {
        lock(&self.state).pending_action
    }

    pub fn last_error(&self) -> Option<ApiError> {
        lock(&self.state).last_error.clone()
    }

    pub fn anomaly(&self) -> Option<Anomaly> {
        lock(&self.state).anomaly.clone()
    }

    pub fn view(&self) -> TimerView {
        let state = lock(&self.state);
        let elapsed_seconds = state.elapsed_seconds();
        TimerView {
            active_timer: state.active.as_ref().map(|a| a.timer.clone()),
            elapsed_seconds,
            display_duration: duration::format_duration(elapsed_seconds),
            pending_action: state.pending_action,
            last_error: state.last_error.clone(),
            anomaly: state.anomaly.clone(),
        }
    }

    /// Marked changed once per tick while a timer is active. Re-read the
    /// engine whenever it fires.
    pub fn tick_updates(&self) -> watch::Receiver<()> {
        lock(&self.state).ticker.subscribe()
    }

    /// Cancel the tick task for good. Loads still refresh the snapshot,
    /// including ones already in flight, but never spawn a tick task again.
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        state.shut_down = true;
        state.ticker.stop();
    }

    fn record_error(&self, err: ApiError) {
        lock(&self.state).record_error(err);
    }
}

impl<T: Transport> TimerSyncEngine<T> {
    /// Replace the snapshot with the server's current timers.
    ///
    /// On failure the previous snapshot of the same work log stays in place
    /// and the error is stored in `last_error`; another work log's snapshot
    /// is cleared before the fetch. A malformed id fails without a network
    /// call.
    pub async fn load(&self, work_log_id: &str) {
        match work_log_id.parse::<WorkLogId>() {
            Ok(id) => self.reconcile(id).await,
            Err(err) => self.record_error(err),
        }
    }

    /// Start a timer unless one is already active or an action is in flight,
    /// then reload.
    pub async fn start(&self, work_log_id: &str) {
        self.run_action(work_log_id, Action::Start).await;
    }

    /// Stop the active timer unless none is active or an action is in flight,
    /// then reload.
    pub async fn stop(&self, work_log_id: &str) {
        self.run_action(work_log_id, Action::Stop).await;
    }

    async fn reconcile(&self, work_log_id: WorkLogId) {
        lock(&self.state).select_work_log(work_log_id);
        let fetched = self.repository.fetch_summary(work_log_id).await;

        let mut state = lock(&self.state);
        if state.work_log != Some(work_log_id) {
            debug!(work_log_id = work_log_id.get(), "stale summary dropped");
            return;
        }
        match fetched {
            Ok(timers) => {
                state.apply_snapshot(timers);
                state.last_error = None;
            }
            Err(err) => state.record_error(err),
        }
    }

    async fn run_action(&self, work_log_id: &str, action: Action) {
        let id = match work_log_id.parse::<WorkLogId>() {
            Ok(id) => id,
            Err(err) => return self.record_error(err),
        };

        let _pending = {
            let mut state = lock(&self.state);
            let active = state.has_active(id);
            let blocked = match action {
                Action::Start => active,
                Action::Stop => !active,
            };
            if blocked || state.pending_action {
                debug!(
                    action = action.as_str(),
                    work_log_id = id.get(),
                    pending = state.pending_action,
                    "action skipped"
                );
                return;
            }
            state.pending_action = true;
            PendingGuard { state: &self.state }
        };

        let outcome = match action {
            Action::Start => self.repository.start(id).await,
            Action::Stop => self.repository.stop(id).await,
        };
        self.reconcile(id).await;

        match outcome {
            Ok(timer) => info!(
                action = action.as_str(),
                work_log_id = id.get(),
                timer_id = timer.id,
                "timer action completed"
            ),
            Err(err) => self.record_error(err),
        }
    }
}
