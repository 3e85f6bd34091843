//! Domain error types for provisioning and supervising an ephemeral `mongod`.

use std::time::Duration;

use camino::Utf8PathBuf;
use color_eyre::Report;
use thiserror::Error;

use crate::supervisor::StartupFailureReason;

/// Result alias for operations that may return a [`MongoEmbedError`].
pub type Result<T> = std::result::Result<T, MongoEmbedError>;

/// Categorises failures so callers can branch without inspecting payloads.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    /// The version string is malformed or below the supported floor.
    UnsupportedVersion,
    /// The OS, architecture, or distribution has no published build.
    UnsupportedSystem,
    /// Fetching the artefact or one of its companion files failed.
    Download,
    /// The checksum or signature did not match the artefact.
    Integrity,
    /// The archive could not be read or lacks the binary.
    Archive,
    /// The server reported a fatal condition or could not be spawned.
    Startup,
    /// The server did not report readiness before the deadline.
    StartupTimeout,
    /// Options or environment values were invalid.
    Config,
    /// Incidental filesystem or runtime failure.
    Io,
}

/// Top-level error exposed by the crate.
#[derive(Debug, Error)]
pub enum MongoEmbedError {
    /// The version string could not be parsed or is not supported.
    #[error("unsupported MongoDB version \"{version}\": {reason}")]
    UnsupportedVersion {
        /// Version string as supplied by the caller.
        version: String,
        /// Why the version was rejected.
        reason: String,
    },
    /// No build is published for the detected platform.
    #[error("unsupported system ({detected}): {reason}")]
    UnsupportedSystem {
        /// Platform value that triggered the rejection.
        detected: String,
        /// Why the platform was rejected.
        reason: String,
    },
    /// The remote server answered with a non-200 status.
    #[error("download of {url} failed with status {status}")]
    HttpStatus {
        /// URL that was requested.
        url: String,
        /// HTTP status code returned by the server.
        status: u16,
    },
    /// The transport failed before a response body was fully received.
    #[error("download of {url} failed")]
    Download {
        /// URL that was requested.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: Report,
    },
    /// The computed SHA-256 did not match the published checksum.
    #[error("checksum verification failed for {url}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Artefact URL whose checksum was checked.
        url: String,
        /// Digest published in the checksum file.
        expected: String,
        /// Digest computed over the downloaded bytes.
        actual: String,
    },
    /// The detached signature did not verify against the release key.
    #[error("signature verification failed for {url}")]
    SignatureMismatch {
        /// Artefact URL whose signature was checked.
        url: String,
        /// Failure reported by the OpenPGP layer.
        #[source]
        source: Report,
    },
    /// The archive could not be decompressed or walked.
    #[error("archive from {url} is malformed")]
    MalformedArchive {
        /// Artefact URL the archive came from.
        url: String,
        /// Underlying decoding failure.
        #[source]
        source: Report,
    },
    /// The archive ended without an entry for the binary.
    #[error("artifact not found in archive: {url} has no entry ending in {suffix}")]
    BinaryNotInArchive {
        /// Artefact URL the archive came from.
        url: String,
        /// In-archive path suffix that was searched for.
        suffix: &'static str,
    },
    /// The server logged a recognised fatal condition or exited early.
    #[error("mongod startup failed, {reason}")]
    Startup {
        /// Classified failure reason.
        reason: StartupFailureReason,
    },
    /// The server binary could not be executed.
    #[error("failed to spawn {binary}")]
    Spawn {
        /// Binary that was launched.
        binary: Utf8PathBuf,
        /// Error returned by the OS.
        #[source]
        source: std::io::Error,
    },
    /// The orphan watchdog could not be started.
    #[error("failed to start watchdog for mongod pid {child_pid}")]
    Watchdog {
        /// Process id of the server the watchdog would have guarded.
        child_pid: u32,
        /// Error returned by the OS.
        #[source]
        source: std::io::Error,
    },
    /// No terminal readiness classification arrived before the deadline.
    #[error("timed out waiting for mongod to start after {}s", .timeout.as_secs())]
    StartupTimeout {
        /// Deadline that elapsed.
        timeout: Duration,
        /// Scratch directory created for the attempt (already removed).
        data_dir: Utf8PathBuf,
    },
    /// Options or environment values were invalid.
    #[error("invalid configuration: {0}")]
    Config(Report),
    /// Incidental filesystem or runtime failure.
    #[error(transparent)]
    Io(#[from] Report),
}

impl MongoEmbedError {
    /// Returns the semantic category for this failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            Self::UnsupportedSystem { .. } => ErrorKind::UnsupportedSystem,
            Self::HttpStatus { .. } | Self::Download { .. } => ErrorKind::Download,
            Self::ChecksumMismatch { .. } | Self::SignatureMismatch { .. } => ErrorKind::Integrity,
            Self::MalformedArchive { .. } | Self::BinaryNotInArchive { .. } => ErrorKind::Archive,
            Self::Startup { .. } | Self::Spawn { .. } | Self::Watchdog { .. } => ErrorKind::Startup,
            Self::StartupTimeout { .. } => ErrorKind::StartupTimeout,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn unsupported_system(detected: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedSystem {
            detected: detected.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(message: impl std::fmt::Display) -> Self {
        Self::Config(color_eyre::eyre::eyre!("{message}"))
    }
}
