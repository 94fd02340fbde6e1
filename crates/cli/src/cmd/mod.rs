//! CLI command implementations

pub mod backup;
pub mod config;
pub mod history;
pub mod restore;
pub mod run;
pub mod snapshots;
pub mod status;
