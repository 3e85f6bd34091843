//! Provisions and supervises throwaway `mongod` servers for tests.
//!
//! The library resolves a server release to a platform-specific download,
//! keeps extracted binaries in a shared content-addressed cache, verifies
//! every archive before use, and runs the server on an in-memory storage
//! engine with a private scratch directory. A watchdog process kills the
//! server if the owning process dies without stopping it.
//!
//! Start with [`MongoServer::start`] and [`ServerOptions`].

pub mod cache;
mod config;
mod download;
mod download_spec;
mod error;
mod fs;
mod observability;
mod platform;
mod provision;
mod server;
mod supervisor;
mod version;

use camino::Utf8PathBuf;

pub use config::{
    BinarySource, DEFAULT_STARTUP_TIMEOUT, DownloadRequest, MAX_STARTUP_TIMEOUT_SECS, MongoEnvCfg,
    ResolvedOptions, ServerOptions, free_port,
};
pub use download::{BINARY_SUFFIX, HttpTransport, Transport, VerifyPolicy};
pub use download_spec::{DownloadSpec, checksum_url_for, public_key_url_for, signature_url_for};
pub use error::{ErrorKind, MongoEmbedError, Result};
pub use observability::LogLevel;
pub use platform::{Arch, ETC_OS_RELEASE, ETC_REDHAT_RELEASE, OsFamily, PlatformInfo, PlatformProbe};
pub use provision::{Provisioner, provision_blocking};
pub use server::MongoServer;
pub use supervisor::{
    LifecycleState, LogFormat, OrphanWatchdog, ReadinessOutcome, ShellWatchdog,
    StartupFailureReason, WatchdogProcess, classify_line,
};
pub use version::{MINIMUM_SUPPORTED, Version};

/// Resolves `cfg` and ensures the configured binary is available locally,
/// returning its path.
///
/// This is the entry point of the bundled binary, which prints the path so
/// shell scripts can pre-warm the cache.
///
/// # Errors
///
/// Returns configuration, platform, and provisioning failures.
pub fn run(cfg: &MongoEnvCfg) -> Result<Utf8PathBuf> {
    let resolved = ServerOptions::default().resolve(cfg, &PlatformProbe::host())?;
    provision_blocking(&resolved.binary)
}
