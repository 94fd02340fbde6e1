//! Implementations of the collaborator interfaces a backup cycle drives
//!
//! - `git`: the vault's version-control working tree
//! - `restic`: snapshot archive with retention pruning
//! - `llm`: optional commit summaries
//! - `webhook`: Discord, Slack and generic notifications
//! - `history`: commits and snapshots as read back for restores

pub mod command;
pub mod git;
pub mod history;
pub mod llm;
pub mod restic;
pub mod webhook;

pub use command::{CommandError, CommandOutput, CommandRunner};
pub use git::GitRepo;
pub use history::{CommitEntry, FileChange, Snapshot, SnapshotEntry, Source};
pub use llm::{LlmSummarizer, Provider};
pub use restic::ResticRepo;
pub use webhook::{Target, WebhookNotifier};
