//! Exercises the download, verification, and cache pipeline against an
//! in-memory transport.

use std::os::unix::fs::PermissionsExt as _;
use std::sync::Arc;

use camino::Utf8PathBuf;
use mongo_embed_ephemeral::cache::{ArtifactCache, cache_path_for_url};
use mongo_embed_ephemeral::{
    DownloadRequest, ErrorKind, MongoEmbedError, Provisioner, VerifyPolicy, Version,
    checksum_url_for, public_key_url_for, signature_url_for,
};
use rstest::{fixture, rstest};

#[path = "support/transport.rs"]
mod transport;

use transport::{FakeTransport, checksum_file, tgz};

const URL: &str = "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-ubuntu2004-4.4.29.tgz";
const SERVER_BYTES: &[u8] = b"#!/bin/sh\necho fake mongod\n";

struct CacheDir {
    _guard: tempfile::TempDir,
    root: Utf8PathBuf,
}

#[fixture]
fn cache_dir() -> CacheDir {
    let guard = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(guard.path().join("cache")).expect("utf8 tempdir");
    CacheDir {
        _guard: guard,
        root,
    }
}

fn good_archive() -> Vec<u8> {
    tgz(&[
        ("mongodb-linux-x86_64-ubuntu2004-4.4.29/README", b"docs"),
        ("mongodb-linux-x86_64-ubuntu2004-4.4.29/bin/mongod", SERVER_BYTES),
    ])
}

fn request(cache: &CacheDir, version: Option<Version>, verify: VerifyPolicy) -> DownloadRequest {
    DownloadRequest {
        url: URL.to_owned(),
        version,
        cache: ArtifactCache::new(cache.root.clone()),
        verify,
    }
}

const CHECKSUM_ONLY: VerifyPolicy = VerifyPolicy {
    checksum: true,
    signature: false,
};

#[rstest]
#[tokio::test]
async fn cache_hit_skips_the_network(cache_dir: CacheDir) -> color_eyre::Result<()> {
    let archive = good_archive();
    let fake = Arc::new(
        FakeTransport::default()
            .serve(URL, archive.clone())
            .serve(checksum_url_for(URL), checksum_file(&archive, "mongod.tgz")),
    );
    let provisioner = Provisioner::new(fake.clone());
    let req = request(&cache_dir, Some(Version::new(4, 4, 29)), CHECKSUM_ONLY);

    let first = provisioner.get_or_download(&req).await?;
    assert_eq!(first, cache_path_for_url(&cache_dir.root, URL)?);
    assert_eq!(std::fs::read(&first)?, SERVER_BYTES);
    let mode = std::fs::metadata(&first)?.permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
    assert_eq!(fake.requests(), vec![URL.to_owned(), checksum_url_for(URL)]);
    let installed_at = std::fs::metadata(&first)?.modified()?;

    let second = provisioner.get_or_download(&req).await?;
    assert_eq!(second, first);
    assert_eq!(fake.requests().len(), 2, "second call must not fetch");
    assert_eq!(std::fs::metadata(&second)?.modified()?, installed_at);
    Ok(())
}

fn served_provisioner() -> (Arc<FakeTransport>, Provisioner) {
    let archive = good_archive();
    let fake = Arc::new(
        FakeTransport::default()
            .serve(URL, archive.clone())
            .serve(checksum_url_for(URL), checksum_file(&archive, "mongod.tgz")),
    );
    (fake.clone(), Provisioner::new(fake))
}

#[rstest]
fn blocking_download_outside_a_runtime(cache_dir: CacheDir) -> color_eyre::Result<()> {
    let (fake, provisioner) = served_provisioner();

    let path = provisioner.get_or_download_blocking(&request(&cache_dir, None, CHECKSUM_ONLY))?;

    assert_eq!(std::fs::read(&path)?, SERVER_BYTES);
    assert_eq!(fake.requests().len(), 2);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn blocking_download_inside_a_runtime_does_not_panic(
    cache_dir: CacheDir,
) -> color_eyre::Result<()> {
    let (fake, provisioner) = served_provisioner();
    let req = request(&cache_dir, None, CHECKSUM_ONLY);

    let path = provisioner.get_or_download_blocking(&req)?;
    assert_eq!(path, cache_path_for_url(&cache_dir.root, URL)?);
    assert_eq!(std::fs::read(&path)?, SERVER_BYTES);

    let again = provisioner.get_or_download_blocking(&req)?;
    assert_eq!(again, path);
    assert_eq!(fake.requests().len(), 2, "second call must hit the cache");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn checksum_mismatch_leaves_the_cache_empty(cache_dir: CacheDir) -> color_eyre::Result<()> {
    let fake = FakeTransport::default()
        .serve(URL, good_archive())
        .serve(checksum_url_for(URL), checksum_file(b"other bytes", "mongod.tgz"));
    let provisioner = Provisioner::new(Arc::new(fake));

    let err = provisioner
        .get_or_download(&request(&cache_dir, None, CHECKSUM_ONLY))
        .await
        .expect_err("digest mismatch must fail");
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(matches!(err, MongoEmbedError::ChecksumMismatch { .. }));
    assert!(!cache_path_for_url(&cache_dir.root, URL)?.exists());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn archive_without_binary_is_rejected(cache_dir: CacheDir) -> color_eyre::Result<()> {
    let archive = tgz(&[("mongodb/bin/mongos", b"router")]);
    let fake = FakeTransport::default().serve(URL, archive);
    let provisioner = Provisioner::new(Arc::new(fake));

    let err = provisioner
        .get_or_download(&request(&cache_dir, None, VerifyPolicy::NONE))
        .await
        .expect_err("missing binary must fail");
    assert_eq!(err.kind(), ErrorKind::Archive);
    assert!(err.to_string().contains("bin/mongod"));
    let entry = cache_path_for_url(&cache_dir.root, URL)?;
    assert!(!entry.exists());
    let leftovers: Vec<_> = std::fs::read_dir(entry.parent().expect("entry dir"))?
        .collect::<Result<_, _>>()?;
    assert!(leftovers.is_empty(), "staging file must be cleaned up");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn unverifiable_signature_is_rejected(cache_dir: CacheDir) -> color_eyre::Result<()> {
    let archive = good_archive();
    let version = Version::new(4, 4, 29);
    let fake = FakeTransport::default()
        .serve(URL, archive.clone())
        .serve(checksum_url_for(URL), checksum_file(&archive, "mongod.tgz"))
        .serve(public_key_url_for(&version), "not an armoured key")
        .serve(signature_url_for(URL), "not an armoured signature");
    let provisioner = Provisioner::new(Arc::new(fake));

    let err = provisioner
        .get_or_download(&request(&cache_dir, Some(version), VerifyPolicy::ALL))
        .await
        .expect_err("bad signature must fail");
    assert!(matches!(err, MongoEmbedError::SignatureMismatch { .. }));
    assert!(!cache_path_for_url(&cache_dir.root, URL)?.exists());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn signature_is_skipped_when_the_release_is_unknown(
    cache_dir: CacheDir,
) -> color_eyre::Result<()> {
    let archive = good_archive();
    let fake = Arc::new(
        FakeTransport::default()
            .serve(URL, archive.clone())
            .serve(checksum_url_for(URL), checksum_file(&archive, "mongod.tgz")),
    );
    let provisioner = Provisioner::new(fake.clone());

    let path = provisioner
        .get_or_download(&request(&cache_dir, None, VerifyPolicy::ALL))
        .await?;
    assert!(path.is_file());
    assert!(
        fake.requests().iter().all(|url| !url.ends_with(".sig")),
        "no signature request expected: {:?}",
        fake.requests()
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn http_errors_surface_the_status(cache_dir: CacheDir) {
    let provisioner = Provisioner::new(Arc::new(FakeTransport::default()));
    let err = provisioner
        .get_or_download(&request(&cache_dir, None, VerifyPolicy::ALL))
        .await
        .expect_err("unknown URL yields 404");
    assert_eq!(err.kind(), ErrorKind::Download);
    assert_eq!(
        err.to_string(),
        format!("download of {URL} failed with status 404")
    );
}
