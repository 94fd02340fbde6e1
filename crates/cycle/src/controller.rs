//! Backup cycle state machine
//!
//! ```text
//! CheckDirty -> Stage -> ComposeMessage -> Commit -> Archive -> Prune -> Done
//!     |           |                          |          |
//!     +-> NoOp    +-> NoOp                   |          +-> BackupFailed
//!                                            +-> CommitFailed
//! ```
//!
//! A clean tree goes straight to Archive when the previous cycle committed but
//! failed to archive, so the owed backup is retried on the next trigger.

use crate::message;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use ulid::Ulid;
use vault_core::{
    BackupEngine, CommitId, Config, HealthTracker, Notification, NotifyStatus, Notifier,
    RetentionPolicy, SnapshotId, StagedChanges, Summarizer, VersionControl,
};

/// Pipeline position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckDirty,
    Stage,
    ComposeMessage,
    Commit,
    Archive,
    Prune,
    Done(CycleOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleOutcome {
    Success,
    NoOp,
    CommitFailed,
    BackupFailed,
}

impl CycleOutcome {
    /// The vault ended the cycle with nothing left to do
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success | Self::NoOp)
    }
}

/// Record of one pass through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct CycleRun {
    pub id: Ulid,
    pub started_at: DateTime<Utc>,
    pub staged_files: Vec<String>,
    pub stats: String,
    pub message: Option<String>,
    pub commit_id: Option<CommitId>,
    pub backup_id: Option<SnapshotId>,
    pub backup_skipped: bool,
    pub outcome: CycleOutcome,
    /// Failure that ended the cycle, if any
    pub error: Option<String>,
}

impl CycleRun {
    fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new(),
            started_at,
            staged_files: Vec::new(),
            stats: String::new(),
            message: None,
            commit_id: None,
            backup_id: None,
            backup_skipped: false,
            outcome: CycleOutcome::NoOp,
            error: None,
        }
    }

    fn subject(&self) -> &str {
        self.message
            .as_deref()
            .and_then(|m| m.lines().next())
            .unwrap_or("")
    }
}

/// External systems a cycle drives
pub struct Collaborators {
    pub vcs: Arc<dyn VersionControl>,
    pub engine: Arc<dyn BackupEngine>,
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub tags: Vec<String>,
    pub retention: RetentionPolicy,
    pub summary_timeout: Duration,
}

impl CycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tags: config.backup.tags.clone(),
            retention: config.retention,
            summary_timeout: config.llm.timeout(),
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct CycleController {
    collaborators: Collaborators,
    tracker: Arc<HealthTracker>,
    settings: CycleSettings,
    /// Set when a commit landed but its snapshot did not
    backup_owed: AtomicBool,
}

impl CycleController {
    pub fn new(
        collaborators: Collaborators,
        tracker: Arc<HealthTracker>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            collaborators,
            tracker,
            settings,
            backup_owed: AtomicBool::new(false),
        }
    }

    pub fn tracker(&self) -> &Arc<HealthTracker> {
        &self.tracker
    }

    pub fn backup_owed(&self) -> bool {
        self.backup_owed.load(Ordering::Acquire)
    }

    /// Run the pipeline once. Never fails: every error becomes an outcome.
    pub async fn run_cycle(&self) -> CycleRun {
        let mut run = CycleRun::begin(Utc::now());
        let mark = self.tracker.begin_cycle();
        info!(cycle = %run.id, "Starting backup cycle");

        let mut stage = Stage::CheckDirty;
        let outcome = loop {
            stage = match stage {
                Stage::Done(outcome) => break outcome,
                current => self.step(current, &mut run).await,
            };
        };
        run.outcome = outcome;

        self.tracker.finish_cycle(mark, outcome.is_settled());
        self.notify(&run).await;

        info!(
            cycle = %run.id,
            outcome = ?run.outcome,
            files = run.staged_files.len(),
            commit = ?run.commit_id.as_ref().map(|c| c.0.as_str()),
            snapshot = ?run.backup_id.as_ref().map(|s| s.0.as_str()),
            backup_skipped = run.backup_skipped,
            "Backup cycle finished"
        );
        run
    }

    /// Transition function: perform `stage` and return the next one
    pub async fn step(&self, stage: Stage, run: &mut CycleRun) -> Stage {
        let c = &self.collaborators;
        match stage {
            Stage::CheckDirty => match c.vcs.has_uncommitted_changes().await {
                Ok(true) => Stage::Stage,
                Ok(false) if self.backup_owed() => {
                    info!("No new changes, retrying owed backup");
                    Stage::Archive
                }
                Ok(false) => {
                    info!("No changes to backup");
                    Stage::Done(CycleOutcome::NoOp)
                }
                Err(e) => self.fail_commit(run, format!("status check failed: {e:#}")),
            },

            Stage::Stage => match c.vcs.stage_all().await {
                Ok(staged) if staged.is_empty() => {
                    info!("No changes to commit after staging");
                    Stage::Done(CycleOutcome::NoOp)
                }
                Ok(staged) => {
                    info!(file_count = staged.files.len(), stats = %staged.stats, "Changes staged");
                    run.staged_files = staged.files;
                    run.stats = staged.stats;
                    Stage::ComposeMessage
                }
                Err(e) => self.fail_commit(run, format!("staging failed: {e:#}")),
            },

            Stage::ComposeMessage => {
                let staged = StagedChanges {
                    files: run.staged_files.clone(),
                    stats: run.stats.clone(),
                };
                let composed = message::compose(
                    c.summarizer.as_deref(),
                    &staged,
                    self.settings.summary_timeout,
                    Utc::now(),
                )
                .await;
                run.message = Some(composed);
                Stage::Commit
            }

            Stage::Commit => {
                let message = run.message.clone().unwrap_or_default();
                match c.vcs.commit(&message).await {
                    Ok(id) => {
                        info!(commit = %id, message = %run.subject(), "Commit created");
                        self.tracker.record_commit(Utc::now());
                        run.commit_id = Some(id);
                        Stage::Archive
                    }
                    Err(e) => self.fail_commit(run, e.to_string()),
                }
            }

            Stage::Archive => match c.engine.is_initialized().await {
                Ok(true) => match c.engine.snapshot(&self.settings.tags).await {
                    Ok(id) => {
                        info!(snapshot_id = %id, "Backup completed");
                        self.tracker.record_backup(Utc::now());
                        self.backup_owed.store(false, Ordering::Release);
                        run.backup_id = Some(id);
                        Stage::Prune
                    }
                    Err(e) => self.fail_backup(run, e.to_string()),
                },
                Ok(false) => {
                    warn!("Backup repository not initialized, skipping backup");
                    run.backup_skipped = true;
                    Stage::Done(CycleOutcome::Success)
                }
                Err(e) => self.fail_backup(run, format!("repository check failed: {e:#}")),
            },

            Stage::Prune => {
                if let Err(e) = c.engine.prune(&self.settings.retention).await {
                    warn!(error = %e, "Prune failed");
                }
                Stage::Done(CycleOutcome::Success)
            }

            Stage::Done(outcome) => Stage::Done(outcome),
        }
    }

    fn fail_commit(&self, run: &mut CycleRun, reason: String) -> Stage {
        error!(error = %reason, "Commit failed");
        run.error = Some(reason);
        Stage::Done(CycleOutcome::CommitFailed)
    }

    fn fail_backup(&self, run: &mut CycleRun, reason: String) -> Stage {
        error!(error = %reason, "Backup failed");
        self.backup_owed.store(true, Ordering::Release);
        run.error = Some(reason);
        Stage::Done(CycleOutcome::BackupFailed)
    }

    async fn notify(&self, run: &CycleRun) {
        if let Some(notification) = notification_for(run) {
            self.collaborators.notifier.send(&notification).await;
        }
    }
}

/// The one notification a finished cycle emits, if any
pub fn notification_for(run: &CycleRun) -> Option<Notification> {
    let files = run.staged_files.len();
    let reason = run.error.as_deref().unwrap_or("unknown error");

    match run.outcome {
        CycleOutcome::NoOp => None,
        CycleOutcome::Success if run.backup_skipped => {
            let detail = if run.commit_id.is_some() {
                format!("{files} files were committed locally only.")
            } else {
                "Previously committed changes remain local only.".to_string()
            };
            Some(Notification::new(
                "Vault committed, backup skipped",
                format!("Backup repository is not initialized. {detail}"),
                NotifyStatus::Warning,
            ))
        }
        CycleOutcome::Success => {
            let mut message = if run.commit_id.is_some() {
                format!("{}\n{}", run.subject(), run.stats)
            } else {
                "Previously committed changes are now backed up".to_string()
            };
            if let Some(id) = &run.backup_id {
                message.push_str(&format!("\nSnapshot: {id}"));
            }
            Some(Notification::new(
                "Vault backup complete",
                message.trim().to_string(),
                NotifyStatus::Success,
            ))
        }
        CycleOutcome::CommitFailed => Some(Notification::new(
            "Vault commit failed",
            format!("{reason}\nChanges stay pending and will be retried."),
            NotifyStatus::Error,
        )),
        CycleOutcome::BackupFailed => Some(Notification::new(
            "Vault backup failed",
            format!("{reason}\nChanges are committed locally; the backup will be retried."),
            NotifyStatus::Error,
        )),
    }
}
