//! Lookup and atomic installation of cached binaries.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{Context, eyre};
use tempfile::NamedTempFile;
use tracing::debug;

use super::path::cache_path_for_url;
use crate::error::Result;
use crate::fs::ensure_dir;

const LOG_TARGET: &str = "mongo_embed::cache";

/// Content-addressed store of downloaded server binaries.
///
/// Entries are only ever created by renaming a fully written file into place,
/// so an entry that exists is always complete. Concurrent installers of the
/// same entry race benignly: the last rename wins and both files are
/// equivalent.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ArtifactCache {
    root: Utf8PathBuf,
}

impl ArtifactCache {
    /// Creates a cache rooted at `root`. Nothing is created on disk until an
    /// entry is staged.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns where the binary for `url` lives once installed.
    ///
    /// # Errors
    ///
    /// Propagates URL parsing failures from [`cache_path_for_url`].
    pub fn entry_path(&self, url: &str) -> Result<Utf8PathBuf> {
        cache_path_for_url(&self.root, url)
    }

    /// Returns `true` when a regular file is installed at `path`.
    #[must_use]
    pub fn exists(path: &Utf8Path) -> bool {
        path.is_file()
    }

    /// Opens a staging file beside `path` so the later install is a rename on
    /// the same filesystem.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the entry directory or the staging file
    /// cannot be created.
    pub fn stage(path: &Utf8Path) -> Result<NamedTempFile> {
        let parent = path
            .parent()
            .ok_or_else(|| eyre!("cache entry {path} has no parent directory"))?;
        ensure_dir(parent)?;
        let staged = tempfile::Builder::new()
            .prefix(".staging-")
            .tempfile_in(parent)
            .with_context(|| format!("create staging file in {parent}"))?;
        Ok(staged)
    }

    /// Atomically moves `staged` to `path`, replacing any existing file.
    ///
    /// On failure the staging file is removed and the entry stays absent.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the rename fails.
    pub fn install(staged: NamedTempFile, path: &Utf8Path) -> Result<()> {
        staged
            .persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("install {path}"))?;
        debug!(target: LOG_TARGET, path = %path, "installed cached binary");
        Ok(())
    }
}
