//! Write-through cache of the health record in the state directory
//!
//! Layout:
//! ```text
//! <state_dir>/
//!   last_change       unix seconds
//!   last_commit       unix seconds
//!   last_backup       unix seconds
//!   pending_changes   "true" | "false"
//!   daemon.lock
//! ```
//!
//! The in-memory tracker is the source of truth while the daemon runs. These
//! files only let a restart (or `vault-backup status`) recover best-effort values.

use crate::health::HealthState;
use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const LAST_CHANGE: &str = "last_change";
const LAST_COMMIT: &str = "last_commit";
const LAST_BACKUP: &str = "last_backup";
const PENDING_CHANGES: &str = "pending_changes";

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read whatever state files exist. Missing or unparsable files read as unset.
    pub fn load(&self) -> HealthState {
        HealthState {
            last_change_at: read_timestamp(&self.dir.join(LAST_CHANGE)),
            last_commit_at: read_timestamp(&self.dir.join(LAST_COMMIT)),
            last_backup_at: read_timestamp(&self.dir.join(LAST_BACKUP)),
            pending_changes: read_bool(&self.dir.join(PENDING_CHANGES)),
        }
    }

    /// Write every field of `state`. Unset timestamps remove their file.
    pub fn persist(&self, state: &HealthState) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        write_timestamp(&self.dir.join(LAST_CHANGE), state.last_change_at)?;
        write_timestamp(&self.dir.join(LAST_COMMIT), state.last_commit_at)?;
        write_timestamp(&self.dir.join(LAST_BACKUP), state.last_backup_at)?;
        write_atomic(
            &self.dir.join(PENDING_CHANGES),
            if state.pending_changes { "true" } else { "false" },
        )
    }
}

fn read_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let raw = fs::read_to_string(path).ok()?;
    let secs: f64 = raw.trim().parse().ok()?;
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Utc.timestamp_opt(secs as i64, 0).single()
}

fn read_bool(path: &Path) -> bool {
    fs::read_to_string(path)
        .map(|raw| matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn write_timestamp(path: &Path, value: Option<DateTime<Utc>>) -> io::Result<()> {
    match value {
        Some(ts) => write_atomic(path, &ts.timestamp().to_string()),
        None => match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
    }
}

/// Write via a sibling temp file and rename so readers never see a torn value
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
