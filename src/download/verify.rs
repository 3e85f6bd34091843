//! Integrity checks applied to a downloaded archive before extraction.

use std::io::{self, Cursor};
use std::path::Path;

use color_eyre::eyre::eyre;
use pgp::{Deserializable, SignedPublicKey, StandaloneSignature};
use sha2::{Digest, Sha256};

use crate::error::{MongoEmbedError, Result};

/// Streams the file at `path` through SHA-256 and returns the lowercase hex
/// digest.
pub(super) fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Compares the first whitespace-delimited token of a checksum file with the
/// computed digest. The comparison is exact.
pub(super) fn check_checksum(url: &str, checksum_file: &str, actual: &str) -> Result<()> {
    let expected = checksum_file.split_whitespace().next().unwrap_or_default();
    if expected == actual {
        return Ok(());
    }
    Err(MongoEmbedError::ChecksumMismatch {
        url: url.to_owned(),
        expected: expected.to_owned(),
        actual: actual.to_owned(),
    })
}

/// Verifies an ASCII-armoured detached signature over `content`.
///
/// The signature is accepted when it verifies against the primary key or any
/// of its subkeys. Unparseable key or signature material is reported as a
/// signature mismatch.
pub(super) fn check_signature(
    url: &str,
    public_key: &[u8],
    signature: &[u8],
    content: &[u8],
) -> Result<()> {
    let mismatch = |source| MongoEmbedError::SignatureMismatch {
        url: url.to_owned(),
        source,
    };

    let (key, _) = SignedPublicKey::from_armor_single(Cursor::new(public_key))
        .map_err(|err| mismatch(eyre!("failed to parse release public key: {err}")))?;
    let (detached, _) = StandaloneSignature::from_armor_single(Cursor::new(signature))
        .map_err(|err| mismatch(eyre!("failed to parse detached signature: {err}")))?;

    let Err(primary) = detached.verify(&key, content) else {
        return Ok(());
    };
    if key
        .public_subkeys
        .iter()
        .any(|subkey| detached.verify(subkey, content).is_ok())
    {
        return Ok(());
    }
    Err(mismatch(eyre!("no release key verifies the signature: {primary}")))
}
