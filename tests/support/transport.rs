//! In-memory transport and archive builders for provisioning tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use flate2::{Compression, write::GzEncoder};
use mongo_embed_ephemeral::{MongoEmbedError, Result, Transport};
use sha2::{Digest, Sha256};

/// Serves canned bodies keyed by URL and records every request.
#[derive(Default)]
pub struct FakeTransport {
    bodies: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl FakeTransport {
    /// Registers `body` for `url`.
    pub fn serve(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }

    /// Returns every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests mutex").clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        self.requests
            .lock()
            .expect("requests mutex")
            .push(url.to_owned());
        let Some(body) = self.bodies.get(url) else {
            return Err(MongoEmbedError::HttpStatus {
                url: url.to_owned(),
                status: 404,
            });
        };
        std::fs::write(dest, body).expect("write fake download");
        Ok(body.len() as u64)
    }
}

/// Builds a gzip-compressed tar archive from `(path, content)` pairs.
pub fn tgz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *content)
            .expect("append tar entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// Renders a checksum companion file in the upstream `<hex>  <name>` layout.
pub fn checksum_file(body: &[u8], name: &str) -> String {
    format!("{}  {name}\n", hex::encode(Sha256::digest(body)))
}
