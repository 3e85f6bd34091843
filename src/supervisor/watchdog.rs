//! Kills the server when the supervising process disappears.
//!
//! The watchdog runs as its own process so it survives an abrupt exit of the
//! supervisor. Only two integers are interpolated into its script.

use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use std::os::unix::process::CommandExt as _;
use tracing::debug;
use wait_timeout::ChildExt as _;

use super::LOG_TARGET;

/// Starts a watchdog guarding `child_pid` on behalf of `supervisor_pid`.
pub trait OrphanWatchdog: Send + Sync {
    /// Spawns the watchdog and returns a handle used to stop it.
    ///
    /// # Errors
    ///
    /// Returns the OS error when the watchdog process cannot be spawned.
    fn spawn(&self, supervisor_pid: u32, child_pid: u32) -> io::Result<WatchdogProcess>;
}

/// Portable watchdog implemented as a POSIX shell polling loop.
#[derive(Debug, Clone)]
pub struct ShellWatchdog {
    shell: PathBuf,
    poll_interval: Duration,
}

impl ShellWatchdog {
    /// Uses `/bin/sh` and a one-second polling interval.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Overrides the polling interval, rounded up to whole seconds.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn script(&self, supervisor_pid: u32, child_pid: u32) -> String {
        let interval = self
            .poll_interval
            .as_secs()
            .saturating_add(u64::from(self.poll_interval.subsec_nanos() > 0))
            .max(1);
        format!(
            "while kill -0 {supervisor_pid} 2>/dev/null && kill -0 {child_pid} 2>/dev/null; \
             do sleep {interval}; done; \
             kill -0 {supervisor_pid} 2>/dev/null || kill -9 {child_pid} 2>/dev/null"
        )
    }
}

impl Default for ShellWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl OrphanWatchdog for ShellWatchdog {
    fn spawn(&self, supervisor_pid: u32, child_pid: u32) -> io::Result<WatchdogProcess> {
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(self.script(supervisor_pid, child_pid))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // A separate group keeps signals aimed at the supervisor's group
            // from taking the watchdog down with it.
            .process_group(0)
            .spawn()?;
        debug!(
            target: LOG_TARGET,
            watchdog_pid = child.id(),
            supervisor_pid,
            child_pid,
            "started orphan watchdog"
        );
        Ok(WatchdogProcess { child })
    }
}

/// Handle to a running watchdog process.
#[derive(Debug)]
pub struct WatchdogProcess {
    child: Child,
}

impl WatchdogProcess {
    /// Wraps an already spawned watchdog process.
    #[must_use]
    pub const fn new(child: Child) -> Self {
        Self { child }
    }

    /// Returns the watchdog's process id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Kills and reaps the watchdog. An already exited watchdog is not an
    /// error.
    pub(crate) fn stop(&mut self, grace: Duration) -> io::Result<()> {
        match self.child.kill() {
            Err(err) if err.kind() != io::ErrorKind::InvalidInput => return Err(err),
            _ => {}
        }
        match self.child.wait_timeout(grace)? {
            Some(_) => Ok(()),
            None => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("watchdog {} did not exit after kill", self.child.id()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_interpolates_only_the_process_ids() {
        let script = ShellWatchdog::new().script(100, 200);
        assert_eq!(
            script,
            "while kill -0 100 2>/dev/null && kill -0 200 2>/dev/null; \
             do sleep 1; done; \
             kill -0 100 2>/dev/null || kill -9 200 2>/dev/null"
        );
    }

    #[test]
    #[serial_test::serial]
    fn departed_child_is_not_signalled_while_the_supervisor_lives() {
        let mut gone = Command::new("true").spawn().expect("spawn true");
        let gone_pid = gone.id();
        gone.wait().expect("reap true");

        // A kill -9 of the departed pid would fail and make the script exit 1.
        let status = Command::new("/bin/sh")
            .arg("-c")
            .arg(ShellWatchdog::new().script(std::process::id(), gone_pid))
            .status()
            .expect("run watchdog script");
        assert!(status.success(), "watchdog signalled a departed child: {status}");
    }

    #[test]
    fn sub_second_intervals_round_up() {
        let script = ShellWatchdog::new()
            .with_poll_interval(Duration::from_millis(1500))
            .script(1, 2);
        assert!(script.contains("sleep 2;"), "{script}");
    }

    #[test]
    #[serial_test::serial]
    fn stop_reaps_a_running_watchdog() {
        let sleeper = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
        let mut watchdog = WatchdogProcess::new(sleeper);
        watchdog.stop(Duration::from_secs(5)).expect("stop");
        watchdog.stop(Duration::from_secs(5)).expect("second stop is harmless");
    }
}
