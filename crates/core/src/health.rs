//! Health state tracking
//!
//! One process-wide record of when the vault last changed, was committed and
//! was backed up. The change detector and the cycle controller write it; the
//! health endpoint and CLI read immutable snapshots of it.

use crate::state_files::StateStore;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Timestamps and pending flag shared by the detector and the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    pub last_change_at: Option<DateTime<Utc>>,
    pub last_commit_at: Option<DateTime<Utc>>,
    pub last_backup_at: Option<DateTime<Utc>>,
    pub pending_changes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Unhealthy only when a backup exists, it is older than `threshold`, and the
/// vault changed after it. A vault with no changes since its last backup is
/// healthy no matter how old that backup is.
pub fn derive_status(state: &HealthState, now: DateTime<Utc>, threshold: Duration) -> HealthStatus {
    let Some(last_backup) = state.last_backup_at else {
        return HealthStatus::Healthy;
    };
    let Ok(threshold) = chrono::Duration::from_std(threshold) else {
        return HealthStatus::Healthy;
    };

    let stale = now - last_backup > threshold;
    let changed_since = state
        .last_change_at
        .map(|change| change > last_backup)
        .unwrap_or(false);

    if stale && changed_since {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Healthy
    }
}

/// Response body of the health query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub last_commit: Option<DateTime<Utc>>,
    pub last_backup: Option<DateTime<Utc>>,
    pub last_change: Option<DateTime<Utc>>,
    pub pending_changes: bool,
    pub commits_since_backup: u64,
    pub sync_state: Option<serde_json::Value>,
    pub uptime_seconds: u64,
}

impl HealthReport {
    pub fn new(
        state: &HealthState,
        now: DateTime<Utc>,
        threshold: Duration,
        commits_since_backup: u64,
        uptime: Duration,
    ) -> Self {
        Self {
            status: derive_status(state, now, threshold),
            last_commit: state.last_commit_at,
            last_backup: state.last_backup_at,
            last_change: state.last_change_at,
            pending_changes: state.pending_changes,
            commits_since_backup,
            sync_state: None,
            uptime_seconds: uptime.as_secs(),
        }
    }

    pub fn with_sync_state(mut self, sync_state: Option<serde_json::Value>) -> Self {
        self.sync_state = sync_state;
        self
    }
}

/// Opaque token taken when a cycle starts. Lets the controller tell whether a
/// change arrived while it was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleMark {
    change_seq: u64,
}

struct TrackerInner {
    state: HealthState,
    /// Bumped on every recorded change
    change_seq: u64,
    /// Detector-path writes not yet persisted
    dirty: bool,
}

/// Process-wide health record
pub struct HealthTracker {
    inner: RwLock<TrackerInner>,
    store: Option<StateStore>,
    /// Serializes writers of the state directory
    persist_lock: Mutex<()>,
    started_at: DateTime<Utc>,
}

impl HealthTracker {
    /// In-memory tracker with no state directory
    pub fn new() -> Self {
        Self::from_parts(HealthState::default(), None)
    }

    /// Tracker mirrored to `store`, seeded with whatever the store holds
    pub fn with_store(store: StateStore) -> Self {
        let initial = store.load();
        Self::from_parts(initial, Some(store))
    }

    fn from_parts(state: HealthState, store: Option<StateStore>) -> Self {
        Self {
            inner: RwLock::new(TrackerInner {
                state,
                change_seq: 0,
                dirty: false,
            }),
            store,
            persist_lock: Mutex::new(()),
            started_at: Utc::now(),
        }
    }

    /// Record a relevant filesystem change. Never touches the disk.
    pub fn record_change(&self, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner.state.last_change_at = Some(match inner.state.last_change_at {
            Some(prev) if prev > at => prev,
            _ => at,
        });
        inner.state.pending_changes = true;
        inner.change_seq += 1;
        inner.dirty = true;
    }

    pub fn begin_cycle(&self) -> CycleMark {
        CycleMark {
            change_seq: self.inner.read().change_seq,
        }
    }

    /// True if a change was recorded after `mark` was taken
    pub fn changed_since(&self, mark: CycleMark) -> bool {
        self.inner.read().change_seq != mark.change_seq
    }

    pub fn record_commit(&self, at: DateTime<Utc>) {
        self.inner.write().state.last_commit_at = Some(at);
        self.persist();
    }

    pub fn record_backup(&self, at: DateTime<Utc>) {
        self.inner.write().state.last_backup_at = Some(at);
        self.persist();
    }

    /// End of a cycle. Clears `pending_changes` when the cycle settled the vault
    /// (`settled`) and no change arrived while it ran.
    pub fn finish_cycle(&self, mark: CycleMark, settled: bool) {
        {
            let mut inner = self.inner.write();
            if settled && inner.change_seq == mark.change_seq {
                inner.state.pending_changes = false;
            }
        }
        self.persist();
    }

    /// Immutable copy of the current record
    pub fn snapshot(&self) -> HealthState {
        self.inner.read().state.clone()
    }

    pub fn status(&self, now: DateTime<Utc>, threshold: Duration) -> HealthStatus {
        derive_status(&self.inner.read().state, now, threshold)
    }

    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or_default()
    }

    /// Persist detector-path writes, if any
    pub fn flush(&self) {
        if self.inner.read().dirty {
            self.persist();
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            self.inner.write().dirty = false;
            return;
        };

        let _guard = self.persist_lock.lock();
        let state = {
            let mut inner = self.inner.write();
            inner.dirty = false;
            inner.state.clone()
        };

        if let Err(e) = store.persist(&state) {
            warn!(dir = %store.dir().display(), error = %e, "Failed to persist health state");
            self.inner.write().dirty = true;
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
