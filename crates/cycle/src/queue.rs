//! Serialized cycle execution
//!
//! `CycleQueue` holds at most one stored request: any number of requests that
//! arrive while a cycle is running collapse into a single follow-up cycle.

use crate::controller::{CycleController, CycleRun};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};
use vault_core::CycleDispatch;

#[derive(Default)]
pub struct CycleQueue {
    notify: Notify,
    requests: AtomicU64,
}

impl CycleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total requests received, coalesced or not
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    async fn next(&self) {
        self.notify.notified().await;
    }
}

impl CycleDispatch for CycleQueue {
    fn request_cycle(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        // Stores one permit when the runner is busy; further calls are no-ops
        self.notify.notify_one();
    }
}

/// Run queued cycles one at a time until shutdown
///
/// A cycle that has started always runs to completion; shutdown is only
/// observed between cycles. Each finished run is passed to `on_finished`.
pub async fn run_cycles<F>(
    controller: Arc<CycleController>,
    queue: Arc<CycleQueue>,
    mut shutdown: watch::Receiver<bool>,
    mut on_finished: F,
) where
    F: FnMut(&CycleRun) + Send,
{
    info!("Cycle runner started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = queue.next() => {
                if *shutdown.borrow() {
                    debug!("Dropping cycle request received during shutdown");
                    break;
                }
                let run = controller.run_cycle().await;
                on_finished(&run);
            }
        }
    }
    info!("Cycle runner stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Collaborators, CycleOutcome, CycleSettings};
    use crate::testing::{FakeEngine, FakeVcs, RecordingNotifier};
    use std::time::Duration;
    use vault_core::HealthTracker;

    struct Setup {
        vcs: Arc<FakeVcs>,
        queue: Arc<CycleQueue>,
        shutdown_tx: watch::Sender<bool>,
        outcomes: Arc<parking_lot::Mutex<Vec<CycleOutcome>>>,
        runner: tokio::task::JoinHandle<()>,
    }

    fn setup() -> Setup {
        let vcs = Arc::new(FakeVcs::new());
        let controller = Arc::new(CycleController::new(
            Collaborators {
                vcs: vcs.clone(),
                engine: Arc::new(FakeEngine::initialized()),
                summarizer: None,
                notifier: Arc::new(RecordingNotifier::new()),
            },
            Arc::new(HealthTracker::new()),
            CycleSettings::default(),
        ));
        let queue = Arc::new(CycleQueue::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let outcomes = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let sink = outcomes.clone();
        let runner = tokio::spawn(run_cycles(
            controller,
            queue.clone(),
            shutdown_rx,
            move |run: &CycleRun| sink.lock().push(run.outcome),
        ));

        Setup {
            vcs,
            queue,
            shutdown_tx,
            outcomes,
            runner,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_during_cycle_coalesce() {
        let s = setup();
        s.vcs.set_commit_delay(Duration::from_secs(30));
        s.vcs.touch("a.md");

        s.queue.request_cycle();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Cycle is in its commit; three more requests arrive
        s.vcs.touch("b.md");
        for _ in 0..3 {
            s.queue.request_cycle();
        }

        tokio::time::sleep(Duration::from_secs(120)).await;

        let commits = s.vcs.commits();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].files, vec!["a.md"]);
        assert_eq!(commits[1].files, vec!["b.md"]);
        assert_eq!(s.queue.requests(), 4);
        assert_eq!(*s.outcomes.lock(), vec![CycleOutcome::Success, CycleOutcome::Success]);

        s.shutdown_tx.send(true).unwrap();
        s.runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_inflight_cycle_finish() {
        let s = setup();
        s.vcs.set_commit_delay(Duration::from_secs(30));
        s.vcs.touch("a.md");

        s.queue.request_cycle();
        tokio::time::sleep(Duration::from_secs(1)).await;
        s.queue.request_cycle();

        s.shutdown_tx.send(true).unwrap();
        s.runner.await.unwrap();

        // The running cycle completed, the queued one never started
        assert_eq!(s.vcs.commits().len(), 1);
        assert_eq!(s.outcomes.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_no_cycle_after_shutdown() {
        let s = setup();
        s.vcs.touch("a.md");

        s.shutdown_tx.send(true).unwrap();
        s.runner.await.unwrap();
        s.queue.request_cycle();

        assert!(s.vcs.commits().is_empty());
    }
}
