//! Spawns `mongod` and waits for it to report readiness.

use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::Report;
use tracing::{debug, info, info_span};

use super::cleanup::{remove_data_dir, teardown};
use super::readiness::{Handshake, LogFormat, ReadinessOutcome, StartupFailureReason, spawn_reader};
use super::watchdog::{OrphanWatchdog, WatchdogProcess};
use super::{LOG_TARGET, LifecycleState};
use crate::error::{MongoEmbedError, Result};
use crate::fs::{create_fresh_dir, ensure_dir};

/// Storage engine that keeps all data in memory.
const STORAGE_ENGINE: &str = "ephemeralForTest";

/// Everything needed to start one server.
pub(crate) struct LaunchRequest {
    pub(crate) binary: Utf8PathBuf,
    pub(crate) port: u16,
    pub(crate) startup_timeout: Duration,
    pub(crate) log_format: LogFormat,
    pub(crate) scratch_root: Utf8PathBuf,
    pub(crate) watchdog: Arc<dyn OrphanWatchdog>,
}

/// A server that reported readiness.
#[derive(Debug)]
pub(crate) struct RunningServer {
    pub(crate) child: Child,
    pub(crate) watchdog: WatchdogProcess,
    pub(crate) data_dir: Utf8PathBuf,
    pub(crate) port: u16,
}

/// Starts the server and blocks until it is ready, fails, or times out.
///
/// On any failure the child, the watchdog, and the data directory are torn
/// down before the error is returned.
pub(crate) fn launch(request: &LaunchRequest) -> Result<RunningServer> {
    let span = info_span!(
        target: LOG_TARGET,
        "mongod_launch",
        binary = %request.binary,
        requested_port = request.port
    );
    let _entered = span.enter();

    let data_dir = create_data_dir(&request.scratch_root)?;
    log_state(LifecycleState::Created, &data_dir);

    let mut child = match spawn_child(request, &data_dir) {
        Ok(child) => child,
        Err(source) => {
            remove_data_dir(&data_dir, "spawn failure");
            return Err(MongoEmbedError::Spawn {
                binary: request.binary.clone(),
                source,
            });
        }
    };
    log_state(LifecycleState::Starting, &data_dir);

    let (handshake, outcome) = Handshake::new(2, request.log_format);
    if let Err(err) = attach_readers(&mut child, &handshake) {
        teardown(&mut child, None, &data_dir, "reader failure");
        return Err(MongoEmbedError::from(
            Report::new(err).wrap_err("failed to relay mongod output"),
        ));
    }

    let child_pid = child.id();
    let mut watchdog = match request.watchdog.spawn(std::process::id(), child_pid) {
        Ok(watchdog) => watchdog,
        Err(source) => {
            teardown(&mut child, None, &data_dir, "watchdog failure");
            log_state(LifecycleState::Failed, &data_dir);
            return Err(MongoEmbedError::Watchdog { child_pid, source });
        }
    };

    let failure = match outcome.recv_timeout(request.startup_timeout) {
        Ok(ReadinessOutcome::Ready(port)) => {
            info!(target: LOG_TARGET, pid = child_pid, port, data_dir = %data_dir, "mongod ready");
            log_state(LifecycleState::Running, &data_dir);
            return Ok(RunningServer {
                child,
                watchdog,
                data_dir,
                port,
            });
        }
        Ok(ReadinessOutcome::Failed(reason)) => MongoEmbedError::Startup { reason },
        Err(RecvTimeoutError::Timeout) => MongoEmbedError::StartupTimeout {
            timeout: request.startup_timeout,
            data_dir: data_dir.clone(),
        },
        Err(RecvTimeoutError::Disconnected) => MongoEmbedError::Startup {
            reason: StartupFailureReason::ExitedBeforeStartup,
        },
    };

    teardown(&mut child, Some(&mut watchdog), &data_dir, "startup failure");
    log_state(LifecycleState::Failed, &data_dir);
    Err(failure)
}

fn create_data_dir(scratch_root: &Utf8Path) -> Result<Utf8PathBuf> {
    ensure_dir(scratch_root)?;
    let data_dir = scratch_root.join(format!("mongod-{}", uuid::Uuid::new_v4().simple()));
    create_fresh_dir(&data_dir)?;
    Ok(data_dir)
}

fn spawn_child(request: &LaunchRequest, data_dir: &Utf8Path) -> io::Result<Child> {
    Command::new(request.binary.as_std_path())
        .arg("--storageEngine")
        .arg(STORAGE_ENGINE)
        .arg("--dbpath")
        .arg(data_dir.as_std_path())
        .arg("--port")
        .arg(request.port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}

fn attach_readers(child: &mut Child, handshake: &Arc<Handshake>) -> io::Result<()> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("mongod stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("mongod stderr was not captured"))?;
    // Reader threads are detached; they end when the child's pipes close.
    spawn_reader("stdout", stdout, Arc::clone(handshake))?;
    spawn_reader("stderr", stderr, Arc::clone(handshake))?;
    Ok(())
}

fn log_state(state: LifecycleState, data_dir: &Utf8Path) {
    debug!(target: LOG_TARGET, ?state, data_dir = %data_dir, "lifecycle transition");
}
