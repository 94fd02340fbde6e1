//! Quiet-period debouncing
//!
//! Any number of change signals inside the window collapse into one pending
//! trigger. A ticker dispatches it once `now - last_seen_at >= window`, so a
//! burst that never goes quiet keeps deferring the cycle.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use vault_core::{CycleDispatch, HealthTracker};

/// The single live burst of changes awaiting dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTrigger {
    pub first_seen_at: Instant,
    pub last_seen_at: Instant,
    pub armed: bool,
    /// Change signals coalesced into this trigger
    pub events: u64,
}

/// Idle when `pending` is `None`, Armed otherwise
pub struct DebounceScheduler {
    window: Duration,
    pending: Mutex<Option<PendingTrigger>>,
    stopped: AtomicBool,
}

impl DebounceScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a change signal. Returns true when it armed a new trigger.
    pub fn record(&self, now: Instant) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }

        let mut pending = self.pending.lock();
        match pending.as_mut() {
            Some(trigger) => {
                trigger.last_seen_at = trigger.last_seen_at.max(now);
                trigger.events += 1;
                false
            }
            None => {
                *pending = Some(PendingTrigger {
                    first_seen_at: now,
                    last_seen_at: now,
                    armed: true,
                    events: 1,
                });
                true
            }
        }
    }

    /// Evaluate the quiet period. Returns the trigger to dispatch, leaving the
    /// scheduler Idle, once the window has elapsed since the last signal.
    pub fn poll(&self, now: Instant) -> Option<PendingTrigger> {
        let mut pending = self.pending.lock();
        let quiet = pending
            .as_ref()
            .is_some_and(|trigger| now.saturating_duration_since(trigger.last_seen_at) >= self.window);
        if quiet {
            pending.take().map(|mut trigger| {
                trigger.armed = false;
                trigger
            })
        } else {
            None
        }
    }

    /// Drop any pending trigger without dispatching it
    pub fn cancel(&self) -> Option<PendingTrigger> {
        self.pending.lock().take().map(|mut trigger| {
            trigger.armed = false;
            trigger
        })
    }

    /// Stop accepting signals and cancel the pending trigger
    pub fn stop(&self) -> Option<PendingTrigger> {
        self.stopped.store(true, Ordering::Release);
        self.cancel()
    }

    pub fn pending(&self) -> Option<PendingTrigger> {
        *self.pending.lock()
    }

    pub fn is_armed(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Ticker loop. Flushes detector-path health writes every tick and hands a
    /// quiet trigger to `dispatch`. Returns as soon as shutdown is signalled.
    pub async fn run(
        self: Arc<Self>,
        dispatch: Arc<dyn CycleDispatch>,
        tracker: Arc<HealthTracker>,
        tick: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    tracker.flush();
                    if let Some(trigger) = self.poll(Instant::now()) {
                        info!(
                            events = trigger.events,
                            burst_secs = trigger.last_seen_at.duration_since(trigger.first_seen_at).as_secs(),
                            "Debounce period elapsed, requesting backup cycle"
                        );
                        dispatch.request_cycle();
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Some(trigger) = self.stop() {
            debug!(events = trigger.events, "Pending trigger cancelled by shutdown");
        }
        tracker.flush();
    }
}
