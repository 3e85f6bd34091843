//! Byte transport used to fetch artefacts and their companion files.

use std::path::Path;

use async_trait::async_trait;
use color_eyre::Report;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::LOG_TARGET;
use crate::error::{MongoEmbedError, Result};

/// Fetches the body at a URL into a local file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Writes the full response body for `url` to `dest`, returning the number
    /// of bytes written.
    ///
    /// # Errors
    ///
    /// Implementations return [`MongoEmbedError::HttpStatus`] for a non-200
    /// response and [`MongoEmbedError::Download`] when the transfer fails.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// HTTPS transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a transport with a crate-specific user agent.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("mongo-embed-ephemeral/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| Report::new(err).wrap_err("failed to build HTTP client"))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let failed = |source: Report| MongoEmbedError::Download {
            url: url.to_owned(),
            source,
        };

        debug!(target: LOG_TARGET, url, "requesting");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| failed(Report::new(err)))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(MongoEmbedError::HttpStatus {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let mut file = File::create(dest)
            .await
            .map_err(|err| failed(Report::new(err).wrap_err("failed to create download file")))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(next) = stream.next().await {
            let chunk = next.map_err(|err| failed(Report::new(err)))?;
            file.write_all(&chunk)
                .await
                .map_err(|err| failed(Report::new(err)))?;
            written = written.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        }
        file.flush().await.map_err(|err| failed(Report::new(err)))?;

        debug!(target: LOG_TARGET, url, bytes = written, "download complete");
        Ok(written)
    }
}
