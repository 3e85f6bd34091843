//! Turns a [`BinarySource`] into a path to an executable `mongod`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use color_eyre::eyre::{Context, eyre};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::cache::ArtifactCache;
use crate::config::{BinarySource, DownloadRequest};
use crate::download::{self, HttpTransport, Transport};
use crate::error::{MongoEmbedError, Result};

const LOG_TARGET: &str = "mongo_embed::cache";

/// Resolves binaries, downloading into the cache on a miss.
#[derive(Clone)]
pub struct Provisioner {
    transport: Arc<dyn Transport>,
}

impl Provisioner {
    /// Uses `transport` for every fetch.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Uses the default HTTPS transport.
    ///
    /// # Errors
    ///
    /// Propagates HTTP client construction failures.
    pub fn http() -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new()?)))
    }

    /// Returns the binary for `source`, fetching it first if needed.
    ///
    /// # Errors
    ///
    /// Propagates download, integrity, archive, and filesystem failures.
    pub async fn provision(&self, source: &BinarySource) -> Result<Utf8PathBuf> {
        match source {
            BinarySource::Local(path) => {
                debug!(target: LOG_TARGET, path = %path, "using local mongod binary");
                Ok(path.clone())
            }
            BinarySource::Download(request) => self.get_or_download(request).await,
        }
    }

    /// Returns the cached binary for `request.url`, downloading, verifying,
    /// and installing it on a miss.
    ///
    /// A hit performs no network access.
    ///
    /// # Errors
    ///
    /// Propagates download, integrity, archive, and filesystem failures. On
    /// error the cache entry remains absent.
    pub async fn get_or_download(&self, request: &DownloadRequest) -> Result<Utf8PathBuf> {
        let path = request.cache.entry_path(&request.url)?;
        if ArtifactCache::exists(&path) {
            debug!(target: LOG_TARGET, url = %request.url, path = %path, "cache hit");
            return Ok(path);
        }
        info!(target: LOG_TARGET, url = %request.url, path = %path, "cache miss");
        download::fetch_into_cache(
            self.transport.as_ref(),
            &request.url,
            request.version.as_ref(),
            request.verify,
            &path,
        )
        .await?;
        Ok(path)
    }

    /// Blocking form of [`Provisioner::get_or_download`].
    ///
    /// The download runs on a private current-thread runtime. When the caller
    /// is already inside a Tokio runtime, that private runtime lives on a
    /// scoped helper thread.
    ///
    /// # Errors
    ///
    /// Propagates runtime construction and provisioning failures, and reports
    /// a panicked helper thread as an I/O error.
    pub fn get_or_download_blocking(&self, request: &DownloadRequest) -> Result<Utf8PathBuf> {
        if tokio::runtime::Handle::try_current().is_err() {
            return self.download_on_private_runtime(request);
        }

        debug!(
            target: LOG_TARGET,
            url = %request.url,
            "inside a Tokio runtime; downloading on a helper thread"
        );
        std::thread::scope(|scope| {
            scope
                .spawn(|| self.download_on_private_runtime(request))
                .join()
                .map_err(|_| MongoEmbedError::from(eyre!("mongod provisioning thread panicked")))?
        })
    }

    fn download_on_private_runtime(&self, request: &DownloadRequest) -> Result<Utf8PathBuf> {
        build_runtime()?.block_on(self.get_or_download(request))
    }
}

/// Provisions `source` from synchronous code.
///
/// A local binary is returned without building a runtime; downloads go
/// through [`Provisioner::get_or_download_blocking`].
///
/// # Errors
///
/// Propagates runtime construction and provisioning failures.
pub fn provision_blocking(source: &BinarySource) -> Result<Utf8PathBuf> {
    match source {
        BinarySource::Local(path) => Ok(path.clone()),
        BinarySource::Download(request) => Provisioner::http()?.get_or_download_blocking(request),
    }
}

/// Constructs the current-thread runtime used for blocking downloads.
fn build_runtime() -> Result<Runtime> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create Tokio runtime for mongod provisioning")?;
    Ok(runtime)
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner").finish_non_exhaustive()
    }
}
