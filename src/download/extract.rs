//! Pulls the server binary out of a gzip-compressed tar archive.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use color_eyre::Report;
use flate2::read::GzDecoder;

use crate::error::{MongoEmbedError, Result};

/// In-archive path suffix identifying the server binary.
pub const BINARY_SUFFIX: &str = "bin/mongod";

/// Streams the first entry whose path ends in [`BINARY_SUFFIX`] into `sink`.
///
/// Entries are walked in archive order and only the first match is used.
pub(super) fn extract_binary(url: &str, archive: &Path, sink: &mut impl Write) -> Result<u64> {
    let file = File::open(archive).map_err(|err| malformed(url, err))?;
    extract_from_reader(url, GzDecoder::new(BufReader::new(file)), sink)
}

fn extract_from_reader(url: &str, reader: impl Read, sink: &mut impl Write) -> Result<u64> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive.entries().map_err(|err| malformed(url, err))?;
    for next in entries {
        let mut entry = next.map_err(|err| malformed(url, err))?;
        let is_binary = entry
            .path()
            .map_err(|err| malformed(url, err))?
            .to_string_lossy()
            .ends_with(BINARY_SUFFIX);
        if is_binary {
            return io::copy(&mut entry, sink).map_err(|err| malformed(url, err));
        }
    }
    Err(MongoEmbedError::BinaryNotInArchive {
        url: url.to_owned(),
        suffix: BINARY_SUFFIX,
    })
}

fn malformed(url: &str, err: io::Error) -> MongoEmbedError {
    MongoEmbedError::MalformedArchive {
        url: url.to_owned(),
        source: Report::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use flate2::{Compression, write::GzEncoder};

    fn tgz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).expect("append");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip")
    }

    fn extract(bytes: &[u8]) -> Result<Vec<u8>> {
        let mut sink = Vec::new();
        extract_from_reader("https://h/a.tgz", GzDecoder::new(bytes), &mut sink)?;
        Ok(sink)
    }

    #[test]
    fn first_matching_entry_wins() {
        let archive = tgz(&[
            ("mongodb-linux/README", b"docs"),
            ("mongodb-linux/bin/mongo", b"shell"),
            ("mongodb-linux/bin/mongod", b"server"),
            ("other/bin/mongod", b"second"),
        ]);
        assert_eq!(extract(&archive).expect("extract"), b"server");
    }

    #[test]
    fn missing_binary_names_the_suffix() {
        let archive = tgz(&[("mongodb-linux/bin/mongos", b"router")]);
        let err = extract(&archive).expect_err("no mongod");
        assert_eq!(err.kind(), ErrorKind::Archive);
        assert_eq!(
            err.to_string(),
            "artifact not found in archive: https://h/a.tgz has no entry ending in bin/mongod"
        );
    }

    #[test]
    fn non_gzip_input_is_malformed() {
        let err = extract(b"plain text, not gzip").expect_err("garbage");
        assert!(matches!(err, MongoEmbedError::MalformedArchive { .. }));
    }
}
