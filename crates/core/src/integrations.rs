//! Interfaces to the external systems a backup cycle drives
//!
//! The cycle controller only talks to these traits. Subprocess and HTTP
//! implementations live in the `adapters` crate; tests use in-memory fakes.

use crate::config::RetentionPolicy;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a commit created by the version-control collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(pub String);

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a snapshot created by the backup engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What `stage_all` left in the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedChanges {
    /// Staged paths, relative to the vault root, in the order git reports them
    pub files: Vec<String>,
    /// One-line diff stat, e.g. "3 files changed, 12 insertions(+)"
    pub stats: String,
}

impl StagedChanges {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Any uncommitted or untracked change in the working tree
    async fn has_uncommitted_changes(&self) -> anyhow::Result<bool>;

    /// Stage everything and report what was staged
    async fn stage_all(&self) -> anyhow::Result<StagedChanges>;

    /// Create a commit. Fails with `BackupError::CommitFailed`.
    async fn commit(&self, message: &str) -> Result<CommitId>;

    /// Number of commits made after `since`
    async fn commits_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait BackupEngine: Send + Sync {
    async fn is_initialized(&self) -> anyhow::Result<bool>;

    /// Snapshot the working tree. Fails with `BackupError::BackupFailed`.
    async fn snapshot(&self, tags: &[String]) -> Result<SnapshotId>;

    /// Forget snapshots outside the retention counts
    async fn prune(&self, retention: &RetentionPolicy) -> anyhow::Result<()>;
}

/// Turns a list of changed filenames into a one-line commit summary.
///
/// Only filenames and the diff stat are ever sent, never file content.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Fails with `BackupError::MessageGenerationFailed`
    async fn summarize(&self, files: &[String], stats: &str, timeout: Duration) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyStatus {
    Success,
    /// Degraded outcome that still kept the user's data (e.g. commit without backup)
    Warning,
    Error,
}

impl NotifyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub status: NotifyStatus,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, status: NotifyStatus) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            status,
        }
    }
}

/// Outbound notification delivery. Failures are logged by the implementation
/// and never reported back to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification);
}

/// A notifier that drops everything
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _notification: &Notification) {}
}

/// Target of debounce dispatches. Implementations must coalesce requests that
/// arrive while a cycle is running into a single follow-up cycle.
pub trait CycleDispatch: Send + Sync {
    fn request_cycle(&self);
}
