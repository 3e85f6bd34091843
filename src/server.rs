//! RAII handle for an ephemeral `mongod`.
//!
//! The server starts during [`MongoServer::start`] and is stopped, with its
//! scratch directory removed, when the handle drops.
//!
//! # Examples
//! ```no_run
//! use mongo_embed_ephemeral::{MongoServer, ServerOptions};
//!
//! # fn main() -> mongo_embed_ephemeral::Result<()> {
//! let server = MongoServer::start(&ServerOptions::for_version("4.4.29"))?;
//! let uri = server.uri_with_random_db();
//! // Connect a driver to `uri` here.
//! drop(server); // mongod stops automatically.
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::Report;
use tracing::info;

use crate::config::{MongoEnvCfg, ResolvedOptions, ServerOptions};
use crate::error::{MongoEmbedError, Result};
use crate::observability::LOG_TARGET;
use crate::platform::PlatformProbe;
use crate::provision::{Provisioner, provision_blocking};
use crate::supervisor::{
    LaunchRequest, LifecycleState, OrphanWatchdog, RunningServer, ShellWatchdog, launch, teardown,
};

/// A running, supervised `mongod`.
#[derive(Debug)]
pub struct MongoServer {
    running: Option<RunningServer>,
    port: u16,
    binary: Utf8PathBuf,
    data_dir: Utf8PathBuf,
    state: LifecycleState,
}

impl MongoServer {
    /// Resolves `options` against the environment, provisions the binary,
    /// and starts the server, blocking until it is ready.
    ///
    /// Downloads run on a private current-thread runtime, moved to a helper
    /// thread when called from inside another Tokio runtime. Async callers
    /// should still prefer [`MongoServer::start_async`], which does not block
    /// a worker.
    ///
    /// # Errors
    ///
    /// Returns configuration, provisioning, and startup failures. No process
    /// or scratch directory outlives a failed start.
    pub fn start(options: &ServerOptions) -> Result<Self> {
        let resolved = options.resolve(&MongoEnvCfg::load()?, &PlatformProbe::host())?;
        let binary = provision_blocking(&resolved.binary)?;
        Self::start_resolved(binary, &resolved)
    }

    /// Async counterpart of [`MongoServer::start`].
    ///
    /// # Errors
    ///
    /// Returns configuration, provisioning, and startup failures.
    pub async fn start_async(options: &ServerOptions) -> Result<Self> {
        let resolved = options.resolve(&MongoEnvCfg::load()?, &PlatformProbe::host())?;
        Self::start_async_with(&resolved, &Provisioner::http()?).await
    }

    /// Starts from already resolved options using `provisioner` for any
    /// download. Supervision runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns provisioning and startup failures.
    pub async fn start_async_with(
        resolved: &ResolvedOptions,
        provisioner: &Provisioner,
    ) -> Result<Self> {
        let binary = provisioner.provision(&resolved.binary).await?;
        let request = launch_request(binary.clone(), resolved);
        let running = tokio::task::spawn_blocking(move || launch(&request))
            .await
            .map_err(|err| MongoEmbedError::from(Report::new(err).wrap_err("launch task failed")))??;
        Ok(Self::from_running(running, binary))
    }

    /// Starts `binary` with already resolved options, blocking until ready.
    ///
    /// # Errors
    ///
    /// Returns startup failures.
    pub fn start_resolved(binary: Utf8PathBuf, resolved: &ResolvedOptions) -> Result<Self> {
        let running = launch(&launch_request(binary.clone(), resolved))?;
        Ok(Self::from_running(running, binary))
    }

    fn from_running(running: RunningServer, binary: Utf8PathBuf) -> Self {
        Self {
            port: running.port,
            data_dir: running.data_dir.clone(),
            binary,
            running: Some(running),
            state: LifecycleState::Running,
        }
    }

    /// Port the server reported it is listening on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Connection URI without a database.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("mongodb://localhost:{}", self.port)
    }

    /// Connection URI naming a fresh random database.
    #[must_use]
    pub fn uri_with_random_db(&self) -> String {
        format!("{}/{}", self.uri(), uuid::Uuid::new_v4().simple())
    }

    /// Scratch data directory; removed once the server stops.
    #[must_use]
    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    /// Binary the server was started from.
    #[must_use]
    pub fn binary(&self) -> &Utf8Path {
        &self.binary
    }

    /// Server process id while running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|running| running.child.id())
    }

    /// Watchdog process id while running.
    #[must_use]
    pub fn watchdog_pid(&self) -> Option<u32> {
        self.running.as_ref().map(|running| running.watchdog.id())
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Stops the server and watchdog and removes the scratch directory.
    ///
    /// Stopping is best-effort and idempotent: failures are logged and later
    /// calls do nothing.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        info!(target: LOG_TARGET, pid = running.child.id(), port = self.port, "stopping mongod");
        teardown(
            &mut running.child,
            Some(&mut running.watchdog),
            &running.data_dir,
            "stop",
        );
        self.state = LifecycleState::Stopped;
    }
}

impl Drop for MongoServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn launch_request(binary: Utf8PathBuf, resolved: &ResolvedOptions) -> LaunchRequest {
    let watchdog: Arc<dyn OrphanWatchdog> = Arc::new(ShellWatchdog::new());
    LaunchRequest {
        binary,
        port: resolved.port,
        startup_timeout: resolved.startup_timeout,
        log_format: resolved.log_format,
        scratch_root: resolved.scratch_root.clone(),
        watchdog,
    }
}
