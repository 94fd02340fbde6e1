//! In-memory collaborators for exercising the cycle without git, restic or HTTP

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;
use vault_core::{
    BackupEngine, BackupError, CommitId, Notification, Notifier, RetentionPolicy, SnapshotId,
    StagedChanges, Summarizer, VersionControl,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCommit {
    pub id: CommitId,
    pub message: String,
    pub files: Vec<String>,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct VcsState {
    dirty: Vec<String>,
    staged: Vec<String>,
    commits: Vec<FakeCommit>,
    fail_commit: Option<String>,
    commit_delay: Duration,
}

/// Working tree and history held in memory
#[derive(Default)]
pub struct FakeVcs {
    state: Mutex<VcsState>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a path as modified in the working tree
    pub fn touch(&self, path: &str) {
        let mut state = self.state.lock();
        if !state.dirty.iter().any(|p| p == path) {
            state.dirty.push(path.to_string());
        }
    }

    pub fn fail_commits(&self, reason: Option<&str>) {
        self.state.lock().fail_commit = reason.map(str::to_string);
    }

    /// Make every commit take `delay` (tokio time)
    pub fn set_commit_delay(&self, delay: Duration) {
        self.state.lock().commit_delay = delay;
    }

    pub fn commits(&self) -> Vec<FakeCommit> {
        self.state.lock().commits.clone()
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn has_uncommitted_changes(&self) -> anyhow::Result<bool> {
        let state = self.state.lock();
        Ok(!state.dirty.is_empty() || !state.staged.is_empty())
    }

    async fn stage_all(&self) -> anyhow::Result<StagedChanges> {
        let mut state = self.state.lock();
        let dirty = std::mem::take(&mut state.dirty);
        for path in dirty {
            if !state.staged.contains(&path) {
                state.staged.push(path);
            }
        }
        let files = state.staged.clone();
        let stats = if files.is_empty() {
            String::new()
        } else {
            format!("{} files changed", files.len())
        };
        Ok(StagedChanges { files, stats })
    }

    async fn commit(&self, message: &str) -> vault_core::Result<CommitId> {
        let delay = self.state.lock().commit_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(reason) = &state.fail_commit {
            return Err(BackupError::CommitFailed(reason.clone()));
        }
        if state.staged.is_empty() {
            return Err(BackupError::CommitFailed("nothing to commit".to_string()));
        }

        let id = CommitId(format!("{:07x}", state.commits.len() + 1));
        let files = std::mem::take(&mut state.staged);
        state.commits.push(FakeCommit {
            id: id.clone(),
            message: message.to_string(),
            files,
            at: Utc::now(),
        });
        Ok(id)
    }

    async fn commits_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64> {
        let state = self.state.lock();
        Ok(state.commits.iter().filter(|c| c.at > since).count() as u64)
    }
}

struct EngineState {
    initialized: bool,
    fail_snapshot: Option<String>,
    fail_prune: bool,
    snapshots: Vec<Vec<String>>,
    prunes: Vec<RetentionPolicy>,
}

/// Snapshot repository held in memory
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn initialized() -> Self {
        Self::with_init(true)
    }

    pub fn uninitialized() -> Self {
        Self::with_init(false)
    }

    fn with_init(initialized: bool) -> Self {
        Self {
            state: Mutex::new(EngineState {
                initialized,
                fail_snapshot: None,
                fail_prune: false,
                snapshots: Vec::new(),
                prunes: Vec::new(),
            }),
        }
    }

    pub fn fail_snapshots(&self, reason: Option<&str>) {
        self.state.lock().fail_snapshot = reason.map(str::to_string);
    }

    pub fn fail_prunes(&self, fail: bool) {
        self.state.lock().fail_prune = fail;
    }

    /// Tags of every snapshot taken so far
    pub fn snapshots(&self) -> Vec<Vec<String>> {
        self.state.lock().snapshots.clone()
    }

    pub fn prunes(&self) -> Vec<RetentionPolicy> {
        self.state.lock().prunes.clone()
    }
}

#[async_trait]
impl BackupEngine for FakeEngine {
    async fn is_initialized(&self) -> anyhow::Result<bool> {
        Ok(self.state.lock().initialized)
    }

    async fn snapshot(&self, tags: &[String]) -> vault_core::Result<SnapshotId> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.fail_snapshot {
            return Err(BackupError::BackupFailed(reason.clone()));
        }
        state.snapshots.push(tags.to_vec());
        Ok(SnapshotId(format!("{:08x}", state.snapshots.len())))
    }

    async fn prune(&self, retention: &RetentionPolicy) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.prunes.push(*retention);
        if state.fail_prune {
            anyhow::bail!("repository is locked");
        }
        Ok(())
    }
}

/// Summarizer with a canned reply and an optional delay it never cuts short
pub struct FakeSummarizer {
    reply: Result<String, String>,
    delay: Duration,
    calls: Mutex<Vec<(Vec<String>, String)>>,
}

impl FakeSummarizer {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Filenames and stat line of every request
    pub fn calls(&self) -> Vec<(Vec<String>, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(
        &self,
        files: &[String],
        stats: &str,
        _timeout: Duration,
    ) -> vault_core::Result<String> {
        self.calls.lock().push((files.to_vec(), stats.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply
            .clone()
            .map_err(BackupError::MessageGenerationFailed)
    }
}

/// Notifier that keeps everything it is asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) {
        self.sent.lock().push(notification.clone());
    }
}
