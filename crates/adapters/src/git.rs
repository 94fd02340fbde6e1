//! Git working tree of the vault
//!
//! Commits are made with the configured identity through the
//! `GIT_AUTHOR_*`/`GIT_COMMITTER_*` environment, so the vault's own git
//! config is never modified.

use crate::command::{CommandOutput, CommandRunner};
use crate::history::{self, CommitEntry, FileChange};
use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use vault_core::{BackupError, CommitId, GitConfig, StagedChanges, VersionControl};

pub struct GitRepo {
    root: PathBuf,
    runner: CommandRunner,
    dry_run: bool,
}

impl GitRepo {
    pub fn new(root: &Path, identity: &GitConfig, timeout: Duration, dry_run: bool) -> Self {
        let runner = CommandRunner::new(timeout)
            .current_dir(root)
            .env("GIT_AUTHOR_NAME", &identity.user_name)
            .env("GIT_AUTHOR_EMAIL", &identity.user_email)
            .env("GIT_COMMITTER_NAME", &identity.user_name)
            .env("GIT_COMMITTER_EMAIL", &identity.user_email)
            // Never block on an editor or credential prompt
            .env("GIT_TERMINAL_PROMPT", "0");

        Self {
            root: root.to_path_buf(),
            runner,
            dry_run,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Initialize a repository in the vault unless one exists.
    /// Returns true when a new repository was created.
    pub async fn ensure_repository(&self) -> anyhow::Result<bool> {
        if self.root.join(".git").exists() {
            return Ok(false);
        }
        self.git(&["init", "--quiet"]).await?;
        info!(vault = %self.root.display(), "Initialized git repository");
        Ok(true)
    }

    /// Most recent commits, newest first. Empty before the first commit.
    pub async fn log(&self, count: usize) -> anyhow::Result<Vec<CommitEntry>> {
        if self.head_id().await.is_none() {
            return Ok(Vec::new());
        }
        let limit = format!("-n{count}");
        let out = self.git(&["log", history::LOG_FORMAT, &limit]).await?;
        Ok(history::parse_log(&out.stdout))
    }

    /// Commits that touched `path`, following renames
    pub async fn file_history(&self, path: &str, count: usize) -> anyhow::Result<Vec<CommitEntry>> {
        let path = history::vault_relative(path)?;
        if self.head_id().await.is_none() {
            return Ok(Vec::new());
        }
        let limit = format!("-n{count}");
        let out = self
            .git(&["log", "--follow", history::LOG_FORMAT, &limit, "--", &path])
            .await?;
        Ok(history::parse_log(&out.stdout))
    }

    /// One commit's header, if `commit` names one
    pub async fn commit_entry(&self, commit: &str) -> anyhow::Result<Option<CommitEntry>> {
        history::check_revision(commit)?;
        let out = self
            .raw(&["log", history::LOG_FORMAT, "-n1", commit, "--"])
            .await?;
        if !out.success() {
            return Ok(None);
        }
        Ok(history::parse_log(&out.stdout).into_iter().next())
    }

    /// Files a commit added, modified, deleted or renamed
    pub async fn changed_files(&self, commit: &str) -> anyhow::Result<Vec<FileChange>> {
        history::check_revision(commit)?;
        let out = self
            .git(&["diff-tree", "--no-commit-id", "-r", "--root", "--name-status", commit])
            .await?;
        Ok(history::parse_name_status(&out.stdout))
    }

    /// Unified diff of `path` in `commit`, against its parent or the empty tree
    pub async fn diff_file(&self, commit: &str, path: &str) -> anyhow::Result<String> {
        history::check_revision(commit)?;
        let path = history::vault_relative(path)?;
        let out = self
            .git(&["show", "--format=", "--patch", commit, "--", &path])
            .await?;
        Ok(out.stdout)
    }

    /// Contents of `path` as of `commit`
    pub async fn show_file(&self, commit: &str, path: &str) -> anyhow::Result<Vec<u8>> {
        history::check_revision(commit)?;
        let path = history::vault_relative(path)?;
        let object = format!("{commit}:{path}");
        let out = self.raw(&["show", &object]).await?;
        if !out.success() {
            bail!("File '{path}' not found at commit {commit}");
        }
        Ok(out.raw_stdout)
    }

    /// Write `path` as of `commit` to `target`
    pub async fn restore_file(&self, commit: &str, path: &str, target: &Path) -> anyhow::Result<()> {
        let contents = self.show_file(commit, path).await?;
        history::write_atomically(target, &contents)?;
        info!(commit = %commit, path = %path, target = %target.display(), "File restored from git");
        Ok(())
    }

    async fn raw(&self, args: &[&str]) -> anyhow::Result<CommandOutput> {
        let mut full = vec!["-c", "core.quotePath=false"];
        full.extend_from_slice(args);
        Ok(self.runner.run("git", &full).await?)
    }

    /// Run git and require a zero exit
    async fn git(&self, args: &[&str]) -> anyhow::Result<CommandOutput> {
        let out = self.raw(args).await?;
        if !out.success() {
            bail!("git {} failed: {}", args.join(" "), out.failure_reason());
        }
        Ok(out)
    }

    async fn head_id(&self) -> Option<String> {
        let out = self.git(&["rev-parse", "--short", "HEAD"]).await.ok()?;
        let id = out.stdout.trim();
        (!id.is_empty()).then(|| id.to_string())
    }
}

/// Last line of `git diff --stat`, e.g. " 3 files changed, 12 insertions(+)"
fn stat_summary(stat_output: &str) -> String {
    stat_output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("files changed")
        .to_string()
}

#[async_trait]
impl VersionControl for GitRepo {
    async fn has_uncommitted_changes(&self) -> anyhow::Result<bool> {
        let out = self.git(&["status", "--porcelain"]).await?;
        Ok(!out.stdout.trim().is_empty())
    }

    async fn stage_all(&self) -> anyhow::Result<StagedChanges> {
        info!("Staging changes");
        self.git(&["add", "-A"]).await?;

        let names = self.git(&["diff", "--cached", "--name-only"]).await?;
        let files: Vec<String> = names
            .stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if files.is_empty() {
            return Ok(StagedChanges::default());
        }

        let stat = self
            .git(&["diff", "--cached", "--stat"])
            .await
            .context("Failed to summarize staged changes")?;
        Ok(StagedChanges {
            files,
            stats: stat_summary(&stat.stdout),
        })
    }

    async fn commit(&self, message: &str) -> vault_core::Result<CommitId> {
        if self.dry_run {
            info!(message = %message, "[DRY RUN] Would commit");
            if let Err(e) = self.raw(&["reset", "--quiet"]).await {
                warn!(error = %e, "Failed to unstage after dry run");
            }
            return Ok(CommitId("dry-run".to_string()));
        }

        let out = self
            .raw(&["commit", "--quiet", "-m", message])
            .await
            .map_err(|e| BackupError::CommitFailed(format!("{e:#}")))?;
        if !out.success() {
            return Err(BackupError::CommitFailed(out.failure_reason()));
        }

        let id = self.head_id().await.unwrap_or_else(|| "HEAD".to_string());
        Ok(CommitId(id))
    }

    async fn commits_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64> {
        let since_arg = format!("--since=@{}", since.timestamp());
        let out = self.git(&["rev-list", "--count", &since_arg, "HEAD"]).await?;
        out.stdout
            .trim()
            .parse()
            .with_context(|| format!("Unexpected rev-list output '{}'", out.stdout.trim()))
    }
}
