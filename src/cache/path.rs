//! Derives the content-addressed cache location for an artefact URL.

use camino::{Utf8Path, Utf8PathBuf};
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{MongoEmbedError, Result};

/// File name of the cached server binary inside its cache entry.
pub const BINARY_NAME: &str = "mongod";

/// Bytes of the URL digest kept in the entry name; ten hex characters.
const DIGEST_PREFIX_BYTES: usize = 5;

/// Returns `<root>/<sanitised basename>_<digest prefix>/mongod` for `url`.
///
/// The basename is percent-decoded before sanitising and keeps entries
/// human-readable; the digest prefix, taken over the URL as given, keeps two
/// URLs that share a basename from colliding.
///
/// # Errors
///
/// Returns [`MongoEmbedError::Config`] when `url` cannot be parsed.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use mongo_embed_ephemeral::cache::cache_path_for_url;
///
/// let path = cache_path_for_url(
///     Utf8Path::new("/var/cache/memongo"),
///     "https://fastdl.mongodb.org/osx/mongodb-osx-ssl-x86_64-4.0.5.tgz",
/// )?;
/// assert_eq!(
///     path.as_str(),
///     "/var/cache/memongo/mongodb-osx-ssl-x86_64-4_0_5_tgz_d50ef2155b/mongod"
/// );
/// # Ok::<(), mongo_embed_ephemeral::MongoEmbedError>(())
/// ```
pub fn cache_path_for_url(root: &Utf8Path, url: &str) -> Result<Utf8PathBuf> {
    let parsed = Url::parse(url)
        .map_err(|err| MongoEmbedError::config(format!("invalid download URL {url}: {err}")))?;
    let decoded = percent_decode_str(base_name(parsed.path())).decode_utf8_lossy();
    let entry = format!("{}_{}", sanitize(&decoded), digest_prefix(url));
    Ok(root.join(entry).join(BINARY_NAME))
}

/// Last path element, ignoring trailing slashes; `/` for a root-only path.
fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" };
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn digest_prefix(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest.get(..DIGEST_PREFIX_BYTES).unwrap_or_default())
}
