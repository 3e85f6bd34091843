//! Best-effort teardown of a started or partially started server.
//!
//! Each step is attempted regardless of earlier failures; failures are
//! logged at WARN and never returned.

use std::io;
use std::process::Child;
use std::time::Duration;

use camino::Utf8Path;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt as _;

use super::LOG_TARGET;
use super::watchdog::WatchdogProcess;
use crate::fs::{RemovalOutcome, remove_dir_if_exists};

/// How long the server gets to exit after SIGTERM before it is killed.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// How long a killed process gets to be reaped.
const REAP_GRACE: Duration = Duration::from_secs(5);

/// Stops the server process, then the watchdog, then removes the data
/// directory.
pub(crate) fn teardown(
    child: &mut Child,
    watchdog: Option<&mut WatchdogProcess>,
    data_dir: &Utf8Path,
    context: &str,
) {
    if let Err(err) = stop_child(child) {
        warn_failure(context, "stop mongod", &err);
    }
    if let Some(guard) = watchdog {
        if let Err(err) = guard.stop(REAP_GRACE) {
            warn_failure(context, "stop watchdog", &err);
        }
    }
    remove_data_dir(data_dir, context);
}

/// Removes the scratch data directory, logging the outcome.
pub(crate) fn remove_data_dir(data_dir: &Utf8Path, context: &str) {
    match remove_dir_if_exists(data_dir) {
        Ok(RemovalOutcome::Removed) => {
            debug!(target: LOG_TARGET, context, path = %data_dir, "removed data directory");
        }
        Ok(RemovalOutcome::Missing) => {
            debug!(target: LOG_TARGET, context, path = %data_dir, "data directory already removed");
        }
        Err(err) => warn!(
            target: LOG_TARGET,
            context,
            path = %data_dir,
            error = %err,
            "failed to remove data directory"
        ),
    }
}

fn stop_child(child: &mut Child) -> io::Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }
    if let Some(pid) = pid_of(child) {
        match kill(pid, Signal::SIGTERM) {
            Ok(()) => {
                if let Some(status) = child.wait_timeout(TERM_GRACE)? {
                    info!(target: LOG_TARGET, pid = child.id(), %status, "mongod stopped");
                    return Ok(());
                }
            }
            Err(err) => debug!(target: LOG_TARGET, pid = child.id(), error = %err, "SIGTERM failed"),
        }
    }
    match child.kill() {
        Err(err) if err.kind() != io::ErrorKind::InvalidInput => return Err(err),
        _ => {}
    }
    match child.wait_timeout(REAP_GRACE)? {
        Some(status) => {
            info!(target: LOG_TARGET, pid = child.id(), %status, "mongod killed");
            Ok(())
        }
        None => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("mongod {} did not exit after kill", child.id()),
        )),
    }
}

fn pid_of(child: &Child) -> Option<Pid> {
    i32::try_from(child.id()).ok().map(Pid::from_raw)
}

fn warn_failure(context: &str, step: &str, err: &io::Error) {
    warn!(
        target: LOG_TARGET,
        context,
        step,
        error = %err,
        "teardown step failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    #[serial_test::serial]
    fn teardown_stops_processes_and_removes_the_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = Utf8Path::from_path(dir.path()).expect("utf8").join("data");
        std::fs::create_dir(&data_dir).expect("mkdir");
        let mut child = Command::new("sleep").arg("30").spawn().expect("spawn child");
        let mut watchdog =
            WatchdogProcess::new(Command::new("sleep").arg("30").spawn().expect("spawn watchdog"));

        teardown(&mut child, Some(&mut watchdog), &data_dir, "test");

        assert!(child.try_wait().expect("try_wait").is_some());
        assert!(!data_dir.exists());
    }

    #[test]
    #[serial_test::serial]
    fn teardown_tolerates_an_already_exited_child() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = Utf8Path::from_path(dir.path()).expect("utf8").join("absent");
        let mut child = Command::new("true").spawn().expect("spawn");
        child.wait().expect("wait");

        teardown(&mut child, None, &data_dir, "test");
    }
}
