//! Resolves the default root of the artefact cache.
//!
//! An explicit root (from options or `MEMONGO_CACHE_PATH`) always wins and is
//! handled by the configuration layer; this module supplies the fallback.

use camino::Utf8PathBuf;
use std::path::PathBuf;

use crate::platform::OsFamily;

/// Directory name appended to the per-user cache home.
const CACHE_SUBDIR: &str = "memongo";

/// Last-resort root when no home directory can be determined.
const TMP_FALLBACK: &str = "/tmp/memongo";

/// Resolves the cache root used when no explicit path is configured.
///
/// The resolution order is:
///
/// 1. `$XDG_CACHE_HOME/memongo` if `XDG_CACHE_HOME` is set and non-empty
/// 2. `~/Library/Caches/memongo` on macOS, `~/.cache/memongo` elsewhere
/// 3. `/tmp/memongo`
///
/// # Examples
///
/// ```
/// use mongo_embed_ephemeral::{OsFamily, cache::default_cache_dir};
///
/// let root = default_cache_dir(OsFamily::Linux);
/// assert!(root.as_str().ends_with("memongo"));
/// ```
#[must_use]
pub fn default_cache_dir(os: OsFamily) -> Utf8PathBuf {
    resolve_from_xdg_cache()
        .or_else(|| resolve_from_home(os))
        .unwrap_or_else(|| Utf8PathBuf::from(TMP_FALLBACK))
}

fn resolve_from_xdg_cache() -> Option<Utf8PathBuf> {
    let raw = std::env::var("XDG_CACHE_HOME").ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let path = Utf8PathBuf::from_path_buf(PathBuf::from(trimmed)).ok()?;
    Some(path.join(CACHE_SUBDIR))
}

fn resolve_from_home(os: OsFamily) -> Option<Utf8PathBuf> {
    let home = Utf8PathBuf::from_path_buf(dirs::home_dir()?).ok()?;
    let base = match os {
        OsFamily::Mac => home.join("Library").join("Caches"),
        OsFamily::Linux => home.join(".cache"),
    };
    Some(base.join(CACHE_SUBDIR))
}
