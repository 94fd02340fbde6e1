//! Backup cycle orchestration
//!
//! - `controller`: the commit → archive → prune pipeline as a stage enum
//! - `message`: commit message composition with summarizer fallback
//! - `queue`: one-at-a-time execution with request coalescing

pub mod controller;
pub mod message;
pub mod queue;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use controller::{
    notification_for, Collaborators, CycleController, CycleOutcome, CycleRun, CycleSettings, Stage,
};
pub use queue::{run_cycles, CycleQueue};
