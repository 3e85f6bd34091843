//! Runs a provisioned `mongod` under supervision.
//!
//! Startup is a race between a readiness outcome from the log classifier and
//! the startup deadline. An orphan watchdog guards every started server, and
//! teardown is best-effort.

mod cleanup;
mod launch;
mod readiness;
mod watchdog;

pub(crate) use cleanup::teardown;
pub(crate) use launch::{LaunchRequest, RunningServer, launch};
pub use readiness::{LogFormat, ReadinessOutcome, StartupFailureReason, classify_line};
pub use watchdog::{OrphanWatchdog, ShellWatchdog, WatchdogProcess};

pub(crate) const LOG_TARGET: &str = "mongo_embed::supervisor";

/// Lifecycle of a supervised server.
///
/// Transitions only move forward:
/// `Created -> Starting -> Running -> Stopped`, or `Starting -> Failed`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LifecycleState {
    /// The scratch directory exists but nothing has been spawned.
    Created,
    /// The process is running and its output is being classified.
    Starting,
    /// The server reported readiness.
    Running,
    /// The server was stopped and its scratch directory removed.
    Stopped,
    /// Startup failed; resources were released.
    Failed,
}
