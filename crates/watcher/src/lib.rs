//! Filesystem change detection for the vault
//!
//! This crate turns raw filesystem notifications into backup triggers:
//! - Ignore rules (path segments, workspace files, gitignore patterns)
//! - A detector thread draining the notify channel
//! - A quiet-period debounce scheduler that dispatches one cycle per burst

pub mod debounce;
pub mod detector;
pub mod ignore;

pub use debounce::{DebounceScheduler, PendingTrigger};
pub use detector::{canonical_root, ChangeDetector, DetectorHandle};
pub use ignore::IgnoreRules;

use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use notify::EventKind;
use std::path::PathBuf;

/// A relevant filesystem mutation. Consumed immediately, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Path that changed
    pub path: PathBuf,
    /// Type of change
    pub kind: ChangeKind,
    pub observed_at: DateTime<Utc>,
}

/// Type of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl ChangeKind {
    /// Map a notify event kind. Access events (open, close) are not changes.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Moved),
            EventKind::Modify(_) | EventKind::Any => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Access(_) | EventKind::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};

    #[test]
    fn test_change_kind_mapping() {
        assert_eq!(
            ChangeKind::from_notify(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            ChangeKind::from_notify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            ChangeKind::from_notify(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(ChangeKind::Moved)
        );
        assert_eq!(
            ChangeKind::from_notify(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Deleted)
        );
        assert_eq!(ChangeKind::from_notify(&EventKind::Access(AccessKind::Any)), None);
    }
}
