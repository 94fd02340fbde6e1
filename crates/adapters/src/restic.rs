//! Restic snapshot repository
//!
//! Repository location and password come from restic's own environment
//! (`RESTIC_REPOSITORY`, `RESTIC_PASSWORD`, ...), inherited by every call.

use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::history::{self, Snapshot, SnapshotEntry};
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use vault_core::{BackupEngine, BackupError, RetentionPolicy, SnapshotId};

const DEFAULT_TAG: &str = "obsidian";

pub struct ResticRepo {
    vault: PathBuf,
    binary: String,
    /// Tag that scopes `forget` and listings, so only snapshots we made are touched
    scope_tag: String,
    runner: CommandRunner,
    dry_run: bool,
}

impl ResticRepo {
    pub fn new(vault: &Path, tags: &[String], timeout: Duration, dry_run: bool) -> Self {
        Self {
            vault: vault.to_path_buf(),
            binary: "restic".to_string(),
            scope_tag: tags.first().cloned().unwrap_or_else(|| DEFAULT_TAG.to_string()),
            runner: CommandRunner::new(timeout),
            dry_run,
        }
    }

    /// Use another restic executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Absolute path of a vault file inside our snapshots
    pub fn snapshot_path(&self, path: &str) -> anyhow::Result<String> {
        let relative = history::vault_relative(path)?;
        Ok(self.vault.join(relative).to_string_lossy().into_owned())
    }

    /// Vault folder inside our snapshots, for listings
    pub fn snapshot_dir(&self, dir: Option<&str>) -> anyhow::Result<String> {
        match dir {
            Some(dir) => self.snapshot_path(dir),
            None => Ok(self.vault.to_string_lossy().into_owned()),
        }
    }

    async fn restic(&self, args: &[&str]) -> anyhow::Result<CommandOutput> {
        let out = self.runner.run(&self.binary, args).await?;
        if !out.success() {
            bail!("restic {} failed: {}", args[0], out.failure_reason());
        }
        Ok(out)
    }

    /// Snapshots carrying our tag, newest first
    pub async fn snapshots(&self) -> anyhow::Result<Vec<Snapshot>> {
        let out = self
            .restic(&["snapshots", "--json", "--tag", &self.scope_tag])
            .await?;
        history::parse_snapshots(&out.stdout)
    }

    /// Every file and folder in `snapshot`
    pub async fn ls(&self, snapshot: &str) -> anyhow::Result<Vec<SnapshotEntry>> {
        history::check_revision(snapshot)?;
        let out = self
            .restic(&["ls", "--json", snapshot])
            .await
            .with_context(|| format!("Snapshot '{snapshot}' not readable"))?;
        Ok(history::parse_ls(&out.stdout))
    }

    /// Contents of a vault file as stored in `snapshot`
    pub async fn dump(&self, snapshot: &str, path: &str) -> anyhow::Result<Vec<u8>> {
        history::check_revision(snapshot)?;
        let source = self.snapshot_path(path)?;
        let out = self.runner.run(&self.binary, &["dump", snapshot, &source]).await?;
        if !out.success() {
            bail!("File '{path}' not found in snapshot {snapshot}");
        }
        Ok(out.raw_stdout)
    }

    /// Restore one vault file from `snapshot` to `target`
    ///
    /// restic restores into a scratch folder beside `target`, then the file
    /// is renamed into place.
    pub async fn restore_file(&self, snapshot: &str, path: &str, target: &Path) -> anyhow::Result<()> {
        history::check_revision(snapshot)?;
        let source = self.snapshot_path(path)?;
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
        let scratch = tempfile::Builder::new()
            .prefix(".vault-restore-")
            .tempdir_in(parent)?;
        let scratch_dir = scratch.path().to_string_lossy().into_owned();

        self.restic(&["restore", snapshot, "--target", &scratch_dir, "--include", &source])
            .await?;

        let restored = scratch.path().join(source.trim_start_matches('/'));
        if !restored.is_file() {
            bail!("File '{path}' not found in snapshot {snapshot}");
        }
        std::fs::rename(&restored, target)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        info!(snapshot = %snapshot, path = %path, target = %target.display(), "File restored from restic");
        Ok(())
    }
}

/// Snapshot id from `restic backup` output ("snapshot 1a2b3c4d saved")
pub fn parse_snapshot_id(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.contains("snapshot") && line.contains("saved"))
        .flat_map(str::split_whitespace)
        .find(|word| word.len() == 8 && word.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_string)
}

#[async_trait]
impl BackupEngine for ResticRepo {
    async fn is_initialized(&self) -> anyhow::Result<bool> {
        match self.runner.run(&self.binary, &["snapshots", "--quiet"]).await {
            Ok(out) => {
                if !out.success() {
                    warn!(stderr = %out.failure_reason(), "Restic repository check failed");
                }
                Ok(out.success())
            }
            Err(CommandError::NotFound { program }) => {
                warn!(program = %program, "Restic is not installed");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn snapshot(&self, tags: &[String]) -> vault_core::Result<SnapshotId> {
        if self.dry_run {
            info!("[DRY RUN] Would run restic backup");
            return Ok(SnapshotId("dry-run".to_string()));
        }

        info!(vault_path = %self.vault.display(), "Starting restic backup");
        let vault = self.vault.to_string_lossy();
        let mut args = vec!["backup"];
        for tag in tags {
            args.push("--tag");
            args.push(tag);
        }
        args.extend(["--exclude", ".git", "--verbose", &*vault]);

        let out = self
            .runner
            .run(&self.binary, &args)
            .await
            .map_err(|e| BackupError::BackupFailed(e.to_string()))?;
        if !out.success() {
            return Err(BackupError::BackupFailed(out.failure_reason()));
        }

        let id = parse_snapshot_id(&out.stdout).unwrap_or_else(|| {
            warn!("Restic output did not name the snapshot");
            "unknown".to_string()
        });
        Ok(SnapshotId(id))
    }

    async fn prune(&self, retention: &RetentionPolicy) -> anyhow::Result<()> {
        if self.dry_run {
            info!(?retention, "[DRY RUN] Would prune backups");
            return Ok(());
        }

        info!(
            keep_daily = retention.daily,
            keep_weekly = retention.weekly,
            keep_monthly = retention.monthly,
            "Pruning old backups"
        );
        let daily = format!("--keep-daily={}", retention.daily);
        let weekly = format!("--keep-weekly={}", retention.weekly);
        let monthly = format!("--keep-monthly={}", retention.monthly);
        let out = self
            .runner
            .run(
                &self.binary,
                &[
                    "forget",
                    "--tag",
                    &self.scope_tag,
                    &daily,
                    &weekly,
                    &monthly,
                    "--prune",
                    "--quiet",
                ],
            )
            .await?;
        if !out.success() {
            bail!("restic forget failed: {}", out.failure_reason());
        }

        info!("Prune completed");
        Ok(())
    }
}
