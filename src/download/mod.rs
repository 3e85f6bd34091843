//! Fetches, verifies, and unpacks server archives into the cache.
//!
//! The archive only ever lives in a temporary file that is deleted on every
//! path out of `fetch_into_cache`; the cache entry is created by a final
//! rename after all checks pass.

mod extract;
mod transport;
mod verify;

use std::path::{Path, PathBuf};

use camino::Utf8Path;
use color_eyre::Report;
use color_eyre::eyre::{Context, eyre};
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, warn};

pub use extract::BINARY_SUFFIX;
pub use transport::{HttpTransport, Transport};

use crate::cache::ArtifactCache;
use crate::download_spec::{checksum_url_for, public_key_url_for, signature_url_for};
use crate::error::{MongoEmbedError, Result};
use crate::fs::mark_executable;
use crate::version::Version;

pub(crate) const LOG_TARGET: &str = "mongo_embed::download";

/// Selects which integrity checks run before extraction.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct VerifyPolicy {
    /// Compare against the published `.sha256` companion file.
    pub checksum: bool,
    /// Verify the `.sig` detached signature against the release key.
    pub signature: bool,
}

impl VerifyPolicy {
    /// Runs every check.
    pub const ALL: Self = Self {
        checksum: true,
        signature: true,
    };

    /// Skips every check.
    pub const NONE: Self = Self {
        checksum: false,
        signature: false,
    };
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self::ALL
    }
}

/// Downloads `url`, verifies it according to `policy`, and installs the
/// extracted binary at `dest`.
pub(crate) async fn fetch_into_cache(
    transport: &dyn Transport,
    url: &str,
    version: Option<&Version>,
    policy: VerifyPolicy,
    dest: &Utf8Path,
) -> Result<()> {
    info!(target: LOG_TARGET, url, "downloading mongod archive");
    let archive = scratch_file()?;
    transport.fetch(url, &archive).await?;

    if policy.checksum {
        verify_checksum(transport, url, &archive).await?;
    }
    if policy.signature {
        match version {
            Some(version) => verify_signature(transport, url, version, &archive).await?,
            None => warn!(
                target: LOG_TARGET,
                url,
                "skipping signature verification: release version unknown for custom URL"
            ),
        }
    }

    let staged = ArtifactCache::stage(dest)?;
    let owned_url = url.to_owned();
    let unpacked = blocking(move || unpack(&owned_url, &archive, staged)).await??;
    mark_executable(
        Utf8Path::from_path(unpacked.path())
            .ok_or_else(|| eyre!("staging path is not valid UTF-8"))?,
    )?;
    ArtifactCache::install(unpacked, dest)
}

fn unpack(url: &str, archive: &Path, mut staged: NamedTempFile) -> Result<NamedTempFile> {
    let bytes = extract::extract_binary(url, archive, staged.as_file_mut())?;
    staged
        .as_file()
        .sync_all()
        .context("flush staged binary")?;
    debug!(target: LOG_TARGET, url, bytes, "extracted mongod");
    Ok(staged)
}

async fn verify_checksum(transport: &dyn Transport, url: &str, archive: &TempPath) -> Result<()> {
    let checksum_url = checksum_url_for(url);
    let companion = scratch_file()?;
    transport.fetch(&checksum_url, &companion).await?;
    let published = read_text(&companion).await?;

    let archive_path: PathBuf = archive.to_path_buf();
    let actual = blocking(move || verify::sha256_file(&archive_path))
        .await?
        .context("hash downloaded archive")?;
    verify::check_checksum(url, &published, &actual)?;
    debug!(target: LOG_TARGET, url, sha256 = %actual, "checksum verified");
    Ok(())
}

async fn verify_signature(
    transport: &dyn Transport,
    url: &str,
    version: &Version,
    archive: &TempPath,
) -> Result<()> {
    let key_file = scratch_file()?;
    transport
        .fetch(&public_key_url_for(version), &key_file)
        .await?;
    let signature_file = scratch_file()?;
    transport
        .fetch(&signature_url_for(url), &signature_file)
        .await?;

    let key = read_bytes(&key_file).await?;
    let signature = read_bytes(&signature_file).await?;
    let content = read_bytes(archive).await?;
    let owned_url = url.to_owned();
    blocking(move || verify::check_signature(&owned_url, &key, &signature, &content)).await??;
    debug!(target: LOG_TARGET, url, "signature verified");
    Ok(())
}

fn scratch_file() -> Result<TempPath> {
    let file = NamedTempFile::new().context("create download scratch file")?;
    Ok(file.into_temp_path())
}

async fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    Ok(bytes)
}

async fn read_text(path: &Path) -> Result<String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    Ok(text)
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| MongoEmbedError::from(Report::new(err).wrap_err("blocking task failed")))
}

#[cfg(test)]
mod tests {
    use super::transport::MockTransport;
    use super::*;
    use crate::error::ErrorKind;
    use mockall::predicate::{always, eq};

    #[tokio::test]
    async fn http_failures_propagate_without_touching_the_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = Utf8Path::from_path(dir.path())
            .expect("utf8")
            .join("entry/mongod");
        let url = "https://fastdl.example/linux/mongodb-linux-x86_64-4.0.5.tgz";

        let mut transport = MockTransport::new();
        transport
            .expect_fetch()
            .with(eq(url), always())
            .times(1)
            .returning(|requested, _| {
                Err(MongoEmbedError::HttpStatus {
                    url: requested.to_owned(),
                    status: 403,
                })
            });

        let err = fetch_into_cache(&transport, url, None, VerifyPolicy::ALL, &dest)
            .await
            .expect_err("403 must fail");
        assert_eq!(err.kind(), ErrorKind::Download);
        assert!(err.to_string().contains("403"));
        assert!(!dest.exists());
        assert!(!dest.parent().expect("parent").exists());
    }

    #[tokio::test]
    async fn checksum_companion_failure_aborts_before_extraction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = Utf8Path::from_path(dir.path())
            .expect("utf8")
            .join("entry/mongod");
        let url = "https://fastdl.example/linux/mongodb-linux-x86_64-4.0.5.tgz";

        let mut transport = MockTransport::new();
        transport
            .expect_fetch()
            .with(eq(url), always())
            .times(1)
            .returning(|_, scratch| {
                std::fs::write(scratch, b"archive").expect("write");
                Ok(7)
            });
        transport
            .expect_fetch()
            .with(eq(checksum_url_for(url)), always())
            .times(1)
            .returning(|requested, _| {
                Err(MongoEmbedError::HttpStatus {
                    url: requested.to_owned(),
                    status: 404,
                })
            });

        let policy = VerifyPolicy {
            checksum: true,
            signature: false,
        };
        let err = fetch_into_cache(&transport, url, None, policy, &dest)
            .await
            .expect_err("missing checksum file must fail");
        assert!(matches!(err, MongoEmbedError::HttpStatus { status: 404, .. }));
        assert!(!dest.exists());
    }
}
