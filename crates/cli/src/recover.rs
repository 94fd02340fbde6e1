//! Restoring vault files from a git commit or a restic snapshot
//!
//! An id of exactly 8 hex digits is tried as a commit first, then as a
//! snapshot.

use adapters::history::detect_source;
use adapters::{GitRepo, ResticRepo, Source};
use anyhow::{anyhow, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use vault_core::Config;

/// Where restored contents came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Commit,
    Snapshot,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit => write!(f, "commit"),
            Self::Snapshot => write!(f, "snapshot"),
        }
    }
}

pub struct Recovery {
    git: GitRepo,
    restic: ResticRepo,
}

impl Recovery {
    pub fn new(git: GitRepo, restic: ResticRepo) -> Self {
        Self { git, restic }
    }

    /// Read-only collaborators for `config`'s vault
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            GitRepo::new(&config.vault_path, &config.git, config.command_timeout(), false),
            ResticRepo::new(
                &config.vault_path,
                &config.backup.tags,
                config.command_timeout(),
                false,
            ),
        )
    }

    pub fn git(&self) -> &GitRepo {
        &self.git
    }

    pub fn restic(&self) -> &ResticRepo {
        &self.restic
    }

    /// Default restore target: the file's own place in the vault
    pub fn vault_target(&self, path: &str) -> Result<PathBuf> {
        let relative = adapters::history::vault_relative(path)?;
        Ok(self.git.root().join(relative))
    }

    /// Contents of `path` as of `source`
    pub async fn contents(&self, source: &str, path: &str) -> Result<(Origin, Vec<u8>)> {
        match detect_source(source) {
            Source::Commit => Ok((Origin::Commit, self.git.show_file(source, path).await?)),
            Source::Snapshot => Ok((Origin::Snapshot, self.restic.dump(source, path).await?)),
            Source::Either => match self.git.show_file(source, path).await {
                Ok(contents) => Ok((Origin::Commit, contents)),
                Err(git_err) => {
                    debug!(source = %source, error = %git_err, "Not a commit, trying snapshots");
                    let contents = self
                        .restic
                        .dump(source, path)
                        .await
                        .map_err(|e| either_failed(source, &git_err, &e))?;
                    Ok((Origin::Snapshot, contents))
                }
            },
        }
    }

    /// Write `path` as of `source` to `target`
    pub async fn restore(&self, source: &str, path: &str, target: &Path) -> Result<Origin> {
        match detect_source(source) {
            Source::Commit => {
                self.git.restore_file(source, path, target).await?;
                Ok(Origin::Commit)
            }
            Source::Snapshot => {
                self.restic.restore_file(source, path, target).await?;
                Ok(Origin::Snapshot)
            }
            Source::Either => match self.git.restore_file(source, path, target).await {
                Ok(()) => Ok(Origin::Commit),
                Err(git_err) => {
                    debug!(source = %source, error = %git_err, "Not a commit, trying snapshots");
                    self.restic
                        .restore_file(source, path, target)
                        .await
                        .map_err(|e| either_failed(source, &git_err, &e))?;
                    Ok(Origin::Snapshot)
                }
            },
        }
    }
}

fn either_failed(source: &str, git_err: &anyhow::Error, restic_err: &anyhow::Error) -> anyhow::Error {
    anyhow!("'{source}' did not resolve as a commit ({git_err}) or a snapshot ({restic_err})")
}
