//! Filesystem helpers shared by the cache and the supervisor.
//!
//! Paths are resolved through an ambient `cap-std` directory handle so every
//! mutation goes through a single capability.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{
    ambient_authority,
    fs::{Dir, Permissions, PermissionsExt},
};
use color_eyre::eyre::{Context, Result};
use std::io::ErrorKind;

/// Mode applied to installed binaries.
pub(crate) const EXECUTABLE_MODE: u32 = 0o755;

/// Whether a best-effort removal found something to delete.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum RemovalOutcome {
    Removed,
    Missing,
}

/// Splits a path into an ambient directory handle and the path relative to
/// it.
fn ambient_dir_and_path(path: &Utf8Path) -> Result<(Dir, Utf8PathBuf)> {
    if path.has_root() {
        let relative = path
            .strip_prefix("/")
            .map_or_else(|_| path.to_path_buf(), Utf8Path::to_path_buf);
        let dir = Dir::open_ambient_dir("/", ambient_authority())
            .context("open ambient root directory")?;
        Ok((dir, relative))
    } else {
        let dir = Dir::open_ambient_dir(".", ambient_authority())
            .context("open ambient working directory")?;
        Ok((dir, path.to_path_buf()))
    }
}

/// Creates `path` and any missing parents. Existing directories are accepted.
pub(crate) fn ensure_dir(path: &Utf8Path) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    match dir.create_dir_all(relative.as_std_path()) {
        Err(err) if err.kind() != ErrorKind::AlreadyExists => {
            Err(err).with_context(|| format!("create {path}"))
        }
        _ => Ok(()),
    }
}

/// Creates `path` itself, failing if it already exists. Parents must exist.
pub(crate) fn create_fresh_dir(path: &Utf8Path) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    dir.create_dir(relative.as_std_path())
        .with_context(|| format!("create {path}"))
}

/// Marks a staged binary as executable by everyone and writable by the owner.
pub(crate) fn mark_executable(path: &Utf8Path) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    dir.set_permissions(
        relative.as_std_path(),
        Permissions::from_mode(EXECUTABLE_MODE),
    )
    .with_context(|| format!("chmod {EXECUTABLE_MODE:o} {path}"))
}

/// Recursively removes `path`, treating a missing directory as success.
pub(crate) fn remove_dir_if_exists(path: &Utf8Path) -> Result<RemovalOutcome> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    match dir.remove_dir_all(relative.as_std_path()) {
        Ok(()) => Ok(RemovalOutcome::Removed),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RemovalOutcome::Missing),
        Err(err) => Err(err).with_context(|| format!("remove {path}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt as _;

    fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
        (dir, path)
    }

    #[test]
    fn ensure_dir_creates_nested_directories_idempotently() {
        let (_guard, root) = utf8_tempdir();
        let nested = root.join("a/b/c");
        ensure_dir(&nested).expect("first create");
        ensure_dir(&nested).expect("second create");
        assert!(nested.is_dir());
    }

    #[test]
    fn mark_executable_sets_mode() {
        let (_guard, root) = utf8_tempdir();
        let file = root.join("mongod");
        std::fs::write(&file, b"#!/bin/sh\n").expect("write");
        mark_executable(&file).expect("chmod");
        let mode = std::fs::metadata(&file).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, EXECUTABLE_MODE);
    }

    #[test]
    fn remove_dir_reports_missing_directories() {
        let (_guard, root) = utf8_tempdir();
        let target = root.join("data");
        std::fs::create_dir(&target).expect("mkdir");
        std::fs::write(target.join("mongod.lock"), b"").expect("write");
        assert_eq!(remove_dir_if_exists(&target).expect("remove"), RemovalOutcome::Removed);
        assert_eq!(remove_dir_if_exists(&target).expect("remove"), RemovalOutcome::Missing);
    }
}
