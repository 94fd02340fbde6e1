//! Daemon lifecycle
//!
//! Wires the change detector, debounce ticker, cycle runner and health
//! endpoint around one `HealthTracker`, then waits for a shutdown signal or
//! the loss of the watch.

use crate::server::{self, HealthContext};
use adapters::{GitRepo, LlmSummarizer, ResticRepo, WebhookNotifier};
use anyhow::{Context, Result};
use cycle::{
    run_cycles, Collaborators, CycleController, CycleQueue, CycleRun, CycleSettings,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};
use vault_core::{
    BackupError, Config, CycleDispatch, HealthTracker, Notification, NotifyStatus, Notifier,
    NullNotifier, StateStore, Summarizer,
};
use watcher::{canonical_root, ChangeDetector, DebounceScheduler, IgnoreRules};

/// Why the daemon stopped
#[derive(Debug)]
pub enum Exit {
    Shutdown,
    WatchLost(BackupError),
}

/// Subprocess and HTTP collaborators described by `config`
pub async fn connect(config: &Config) -> Result<Collaborators> {
    let git = GitRepo::new(
        &config.vault_path,
        &config.git,
        config.command_timeout(),
        config.dry_run,
    );
    if config.dry_run {
        info!("[DRY RUN] Commits and snapshots will be logged, not made");
    } else {
        git.ensure_repository()
            .await
            .context("Failed to prepare git repository")?;
    }

    let engine = ResticRepo::new(
        &config.vault_path,
        &config.backup.tags,
        config.command_timeout(),
        config.dry_run,
    );

    let summarizer = LlmSummarizer::from_config(&config.llm)
        .map(|s| Arc::new(s) as Arc<dyn Summarizer>);
    if summarizer.is_none() {
        info!("No summarizer configured, using fallback commit messages");
    }

    let notifier: Arc<dyn Notifier> = if config.notify.enabled() {
        Arc::new(WebhookNotifier::from_config(&config.notify)?)
    } else {
        Arc::new(NullNotifier)
    };

    Ok(Collaborators {
        vcs: Arc::new(git),
        engine: Arc::new(engine),
        summarizer,
        notifier,
    })
}

/// Wait for SIGINT or SIGTERM
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
            }
            _ => {
                warn!("Failed to install signal handlers, falling back to Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

pub struct Daemon {
    config: Config,
    root: PathBuf,
    tracker: Arc<HealthTracker>,
    collaborators: Collaborators,
}

impl Daemon {
    /// Resolve the vault and load persisted health from the state directory
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        let root = canonical_root(&config.vault_path)?;
        let tracker = Arc::new(HealthTracker::with_store(StateStore::new(&config.state_dir)));
        Ok(Self {
            config,
            root,
            tracker,
            collaborators,
        })
    }

    pub fn tracker(&self) -> Arc<HealthTracker> {
        self.tracker.clone()
    }

    /// Run until `shutdown` resolves or the watch is lost
    ///
    /// Detection and debouncing stop first; a cycle already running is
    /// awaited; the health endpoint goes down last.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<Exit>
    where
        F: Future<Output = ()>,
    {
        let Daemon {
            config,
            root,
            tracker,
            collaborators,
        } = self;

        let rules = IgnoreRules::load(&root, &config.watch)?;
        let scheduler = Arc::new(DebounceScheduler::new(config.debounce_window()));
        let queue = Arc::new(CycleQueue::new());
        let notifier = collaborators.notifier.clone();

        let health = Arc::new(HealthContext::new(
            tracker.clone(),
            Some(collaborators.vcs.clone()),
            root.clone(),
            config.unhealthy_threshold(),
        ));
        let controller = Arc::new(CycleController::new(
            collaborators,
            tracker.clone(),
            CycleSettings::from_config(&config),
        ));

        let (stop_tx, stop_rx) = watch::channel(false);
        let (server_stop_tx, server_stop_rx) = watch::channel(false);

        let server = tokio::spawn(server::serve(
            listener,
            health,
            wait_for_stop(server_stop_rx),
        ));

        let (mut detector, lost_rx) = ChangeDetector::new(
            rules,
            tracker.clone(),
            scheduler.clone(),
            config.poll_interval(),
        )
        .spawn()?;

        let ticker = tokio::spawn(scheduler.clone().run(
            queue.clone(),
            tracker.clone(),
            config.poll_interval(),
            stop_rx.clone(),
        ));

        let runner = tokio::spawn(run_cycles(controller, queue.clone(), stop_rx, |run| {
            if !run.outcome.is_settled() {
                warn!(
                    cycle = %run.id,
                    outcome = ?run.outcome,
                    "Cycle did not settle the vault, waiting for the next change"
                );
            }
        }));

        info!(
            vault = %root.display(),
            debounce_secs = config.watch.debounce_secs,
            dry_run = config.dry_run,
            "Watching vault"
        );

        // Changes that landed while no daemon was watching
        if tracker.snapshot().pending_changes {
            info!("Pending changes from a previous run, scheduling a cycle");
            queue.request_cycle();
        }

        let exit = tokio::select! {
            lost = lost_rx => watch_exit(lost, &root),
            _ = shutdown => Exit::Shutdown,
        };

        info!("Shutting down");
        detector.stop();
        let _ = stop_tx.send(true);

        if let Err(e) = ticker.await {
            error!(error = %e, "Debounce ticker panicked");
        }
        if let Err(e) = runner.await {
            error!(error = %e, "Cycle runner panicked");
        }
        let _ = server_stop_tx.send(true);
        match server.await {
            Ok(Err(e)) => error!(error = %e, "Health endpoint stopped with an error"),
            Err(e) => error!(error = %e, "Health endpoint panicked"),
            Ok(Ok(())) => {}
        }
        tracker.flush();

        if let Exit::WatchLost(e) = &exit {
            notifier
                .send(&Notification::new(
                    "Vault watch lost",
                    format!("{e}. The backup sidecar is exiting."),
                    NotifyStatus::Error,
                ))
                .await;
        }

        info!(exit = ?exit, "Daemon stopped");
        Ok(exit)
    }
}

/// The detector only drops its sender without an error when it is stopped,
/// which happens after this point. An early drop means its thread died.
fn watch_exit(lost: Result<BackupError, oneshot::error::RecvError>, root: &Path) -> Exit {
    match lost {
        Ok(e) => Exit::WatchLost(e),
        Err(_) => Exit::WatchLost(BackupError::WatchLost {
            root: root.to_path_buf(),
            reason: "detector thread exited".to_string(),
        }),
    }
}

async fn wait_for_stop(mut stop: watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Run a single cycle outside the daemon, against the persisted health state
pub async fn run_once(config: &Config, collaborators: Collaborators) -> CycleRun {
    let tracker = Arc::new(HealthTracker::with_store(StateStore::new(&config.state_dir)));
    let controller =
        CycleController::new(collaborators, tracker, CycleSettings::from_config(config));
    controller.run_cycle().await
}
