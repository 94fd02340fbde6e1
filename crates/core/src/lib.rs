//! Core types for the vault backup sidecar
//!
//! This crate provides the pieces every other crate shares:
//! - Configuration (TOML file + environment overrides)
//! - Error taxonomy for the backup cycle
//! - Health state tracking and status derivation
//! - State-directory persistence of health timestamps
//! - Interfaces to the external systems a backup cycle drives

pub mod config;
pub mod error;
pub mod health;
pub mod integrations;
pub mod state_files;

// Re-export main types for convenience
pub use config::{
    BackupConfig, Config, GitConfig, HealthConfig, LlmConfig, NotifyConfig, NotifyLevel,
    RetentionPolicy, WatchConfig,
};
pub use error::{BackupError, Result};
pub use health::{derive_status, CycleMark, HealthReport, HealthState, HealthStatus, HealthTracker};
pub use integrations::{
    BackupEngine, CommitId, CycleDispatch, Notification, NotifyStatus, Notifier, NullNotifier,
    SnapshotId, StagedChanges, Summarizer, VersionControl,
};
pub use state_files::StateStore;
