//! Vault backup sidecar: daemon wiring and CLI support
//!
//! The binary's subcommands live in `main.rs`/`cmd`; everything they share
//! (and everything the integration tests drive) lives here.

pub mod daemon;
pub mod locks;
pub mod logging;
pub mod recover;
pub mod server;
pub mod util;

pub use daemon::{Daemon, Exit};
pub use locks::{DaemonLock, LockHolder};
pub use recover::{Origin, Recovery};
pub use server::HealthContext;
