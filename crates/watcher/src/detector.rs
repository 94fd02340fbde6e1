//! Change detector
//!
//! A notify watcher feeds a crossbeam channel drained by a dedicated thread.
//! The thread filters events, records changes in the health tracker, and
//! signals the debounce scheduler. Loss of the watch ends the thread with
//! `BackupError::WatchLost`, delivered through the returned oneshot.

use crate::debounce::DebounceScheduler;
use crate::ignore::IgnoreRules;
use crate::{ChangeEvent, ChangeKind};
use anyhow::Context;
use chrono::Utc;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use notify::event::{CreateKind, RemoveKind};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use vault_core::{BackupError, HealthTracker};

pub struct ChangeDetector {
    rules: Arc<IgnoreRules>,
    tracker: Arc<HealthTracker>,
    scheduler: Arc<DebounceScheduler>,
    poll_interval: Duration,
}

/// Running detector. Dropping it stops the watch.
pub struct DetectorHandle {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
    watcher: Option<RecommendedWatcher>,
}

impl ChangeDetector {
    pub fn new(
        rules: IgnoreRules,
        tracker: Arc<HealthTracker>,
        scheduler: Arc<DebounceScheduler>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            rules: Arc::new(rules),
            tracker,
            scheduler,
            poll_interval,
        }
    }

    /// Start watching the root recursively
    ///
    /// The receiver resolves with the fatal error if the watch is lost. It
    /// resolves with `RecvError` once the detector is stopped normally.
    pub fn spawn(self) -> anyhow::Result<(DetectorHandle, oneshot::Receiver<BackupError>)> {
        let root = self.rules.root().to_path_buf();
        let (event_tx, event_rx) = unbounded::<notify::Result<Event>>();
        let (stop_tx, stop_rx) = unbounded::<()>();
        let (lost_tx, lost_rx) = oneshot::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.send(res);
            },
            NotifyConfig::default().with_poll_interval(self.poll_interval),
        )
        .context("Failed to initialize filesystem watcher")?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        let thread = std::thread::Builder::new()
            .name("vault-watcher".to_string())
            .spawn(move || {
                if let Err(e) = self.drain(&event_rx, &stop_rx) {
                    error!(error = %e, "Change detector stopped");
                    let _ = lost_tx.send(e);
                }
            })
            .context("Failed to spawn watcher thread")?;

        info!(root = %root.display(), "Watching vault");

        Ok((
            DetectorHandle {
                stop_tx,
                thread: Some(thread),
                watcher: Some(watcher),
            },
            lost_rx,
        ))
    }

    fn drain(
        &self,
        event_rx: &Receiver<notify::Result<Event>>,
        stop_rx: &Receiver<()>,
    ) -> vault_core::Result<()> {
        loop {
            select! {
                recv(stop_rx) -> _ => return Ok(()),
                recv(event_rx) -> msg => match msg {
                    Ok(Ok(event)) => self.handle_event(event)?,
                    Ok(Err(e)) => return Err(self.lost(format!("watch backend error: {e}"))),
                    Err(_) => {
                        // Stop may have raced the watcher being dropped
                        if stop_rx.try_recv().is_ok() {
                            return Ok(());
                        }
                        return Err(self.lost("event channel disconnected".to_string()));
                    }
                },
            }
        }
    }

    fn handle_event(&self, event: Event) -> vault_core::Result<()> {
        let root = self.rules.root();

        if matches!(event.kind, EventKind::Remove(_)) && !root.exists() {
            return Err(self.lost("watched root was removed".to_string()));
        }

        if event.need_rescan() {
            warn!("Watch backend dropped events, treating as a change");
            self.record(ChangeEvent::now(root.to_path_buf(), ChangeKind::Modified));
            return Ok(());
        }

        let Some(kind) = ChangeKind::from_notify(&event.kind) else {
            return Ok(());
        };
        if is_directory_event(&event.kind) {
            return Ok(());
        }

        for path in event.paths {
            if self.rules.should_ignore(&path) {
                continue;
            }
            // Directory metadata changes carry no note content
            if kind == ChangeKind::Modified && path.is_dir() {
                continue;
            }
            self.record(ChangeEvent::now(path, kind));
        }

        Ok(())
    }

    fn record(&self, event: ChangeEvent) {
        debug!(path = %event.path.display(), kind = ?event.kind, "File event");
        self.tracker.record_change(event.observed_at);
        if self.scheduler.record(tokio::time::Instant::now()) {
            info!(
                debounce_secs = self.scheduler.window().as_secs(),
                "Change detected, backup scheduled"
            );
        }
    }

    fn lost(&self, reason: String) -> BackupError {
        BackupError::WatchLost {
            root: self.rules.root().to_path_buf(),
            reason,
        }
    }
}

fn is_directory_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
    )
}

impl DetectorHandle {
    /// Stop the watch and join the detector thread. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        self.watcher.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Watcher thread panicked");
            }
        }
    }
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ChangeEvent {
    fn now(path: PathBuf, kind: ChangeKind) -> Self {
        Self {
            path,
            kind,
            observed_at: Utc::now(),
        }
    }
}

/// Canonical form of the vault root, so event paths strip cleanly against it
pub fn canonical_root(path: &Path) -> anyhow::Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Vault path {} is not accessible", path.display()))
}
