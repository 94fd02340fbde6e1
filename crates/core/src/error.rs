//! Error taxonomy for change detection and the backup cycle

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Error, Debug)]
pub enum BackupError {
    /// The filesystem watch died. Change detection is gone, so the process must stop.
    #[error("Watch on {} lost: {reason}", root.display())]
    WatchLost { root: PathBuf, reason: String },

    /// Commit did not land. Retried on the next debounce trigger.
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// Snapshot did not land. The commit that preceded it is kept.
    #[error("Backup failed: {0}")]
    BackupFailed(String),

    #[error("Backup repository is not initialized")]
    RepositoryUninitialized,

    /// Recovered locally by the fallback commit message.
    #[error("Commit message generation failed: {0}")]
    MessageGenerationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// True for conditions that must terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::WatchLost { .. } | Self::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let lost = BackupError::WatchLost {
            root: PathBuf::from("/vault"),
            reason: "inotify limit".to_string(),
        };
        assert!(lost.is_fatal());
        assert_eq!(lost.to_string(), "Watch on /vault lost: inotify limit");

        assert!(!BackupError::CommitFailed("hook rejected".into()).is_fatal());
        assert!(!BackupError::BackupFailed("lock held".into()).is_fatal());
        assert!(!BackupError::RepositoryUninitialized.is_fatal());
        assert!(!BackupError::MessageGenerationFailed("timeout".into()).is_fatal());
    }
}
