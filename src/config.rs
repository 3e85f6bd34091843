//! Caller options, environment overrides, and their resolution.
//!
//! [`MongoEnvCfg`] captures `MEMONGO_*` environment variables (and CLI flags
//! for the binary). [`ServerOptions`] holds what a caller set in code.
//! [`ServerOptions::resolve`] merges both, explicit values first, into a
//! [`ResolvedOptions`] that the provisioner and supervisor consume.

use std::ffi::OsString;
use std::net::{Ipv4Addr, TcpListener};
use std::time::Duration;

use camino::Utf8PathBuf;
use color_eyre::eyre::{Context, eyre};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::{ArtifactCache, default_cache_dir};
use crate::download::VerifyPolicy;
use crate::download_spec::DownloadSpec;
use crate::error::{MongoEmbedError, Result};
use crate::observability::LogLevel;
use crate::platform::PlatformProbe;
use crate::supervisor::LogFormat;
use crate::version::Version;

/// Startup deadline used when none is configured.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest accepted startup deadline.
pub const MAX_STARTUP_TIMEOUT_SECS: u64 = 600;

/// Settings supplied through `MEMONGO_*` environment variables.
///
/// # Examples
/// ```
/// use mongo_embed_ephemeral::MongoEnvCfg;
///
/// let cfg = MongoEnvCfg::default();
/// assert!(cfg.mongo_version.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, OrthoConfig, Default)]
#[ortho_config(prefix = "MEMONGO")]
pub struct MongoEnvCfg {
    /// Server release to download, for example `4.4.29`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub mongo_version: Option<String>,
    /// Local `mongod` binary that bypasses downloading.
    pub mongod_bin: Option<Utf8PathBuf>,
    /// Custom artefact URL that bypasses platform detection.
    #[serde(default, deserialize_with = "lenient_string")]
    pub download_url: Option<String>,
    /// Root directory of the binary cache.
    pub cache_path: Option<Utf8PathBuf>,
    /// Port requested from the server.
    pub mongod_port: Option<u16>,
    /// Startup deadline in whole seconds.
    pub startup_timeout_secs: Option<u64>,
    /// Verbosity for the bundled binary's subscriber: `debug`, `info`,
    /// `warn`, or `silent`. Library callers configure their own subscriber.
    #[serde(default, deserialize_with = "lenient_string")]
    pub log_level: Option<String>,
    /// Server log format: `auto`, `text`, or `json`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub log_format: Option<String>,
}

impl MongoEnvCfg {
    /// Loads configuration from environment variables without parsing CLI
    /// arguments.
    ///
    /// # Errors
    ///
    /// Returns [`MongoEmbedError::Config`] when a variable cannot be parsed
    /// into its field type.
    pub fn load() -> Result<Self> {
        Self::load_from_args([OsString::from("mongo-embed-ephemeral")])
    }

    /// Loads configuration from `args` layered over the environment.
    ///
    /// # Errors
    ///
    /// Returns [`MongoEmbedError::Config`] when an argument or variable cannot
    /// be parsed.
    pub fn load_from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = OsString>,
    {
        Self::load_from_iter(args).map_err(|err| MongoEmbedError::Config(eyre!(err)))
    }

    /// Parses the configured verbosity, defaulting to `info`.
    ///
    /// # Errors
    ///
    /// Returns [`MongoEmbedError::Config`] for an unknown level name.
    pub fn log_level(&self) -> Result<LogLevel> {
        non_blank(self.log_level.as_deref()).map_or(Ok(LogLevel::default()), |raw| {
            raw.parse().map_err(|err| {
                MongoEmbedError::config(format!("MEMONGO_LOG_LEVEL: {err}"))
            })
        })
    }
}

/// Options a caller sets in code. Unset fields fall back to the
/// environment, then to built-in defaults.
///
/// There is no verbosity option: the library only emits `tracing` events and
/// the embedding application's subscriber decides what is shown.
/// `MEMONGO_LOG_LEVEL` configures the bundled binary alone and is never read
/// by [`ServerOptions::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Server release to download.
    pub mongo_version: Option<String>,
    /// Local `mongod` binary; skips downloading entirely.
    pub mongod_bin: Option<Utf8PathBuf>,
    /// Custom artefact URL; skips platform detection.
    pub download_url: Option<String>,
    /// Root directory of the binary cache.
    pub cache_path: Option<Utf8PathBuf>,
    /// Port requested from the server.
    pub port: Option<u16>,
    /// Startup deadline.
    pub startup_timeout: Option<Duration>,
    /// How server log lines are interpreted.
    pub log_format: Option<LogFormat>,
    /// Integrity checks for downloaded archives.
    pub verify: VerifyPolicy,
    /// Parent directory for per-server data directories; defaults to the
    /// system temporary directory.
    pub scratch_root: Option<Utf8PathBuf>,
}

/// Where the server binary comes from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BinarySource {
    /// An existing binary used as-is.
    Local(Utf8PathBuf),
    /// An artefact fetched into the cache.
    Download(DownloadRequest),
}

/// A cacheable artefact download.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DownloadRequest {
    /// Artefact URL.
    pub url: String,
    /// Release the artefact belongs to, when known; selects the signing key.
    pub version: Option<Version>,
    /// Cache that receives the extracted binary.
    pub cache: ArtifactCache,
    /// Integrity checks to run.
    pub verify: VerifyPolicy,
}

/// Fully resolved settings for one server start.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResolvedOptions {
    /// Binary provenance.
    pub binary: BinarySource,
    /// Port passed to the server; `0` lets the server choose.
    pub port: u16,
    /// Startup deadline.
    pub startup_timeout: Duration,
    /// Log interpretation mode.
    pub log_format: LogFormat,
    /// Parent directory for the scratch data directory.
    pub scratch_root: Utf8PathBuf,
}

impl ServerOptions {
    /// Options that download `version` with every other setting defaulted.
    #[must_use]
    pub fn for_version(version: impl Into<String>) -> Self {
        Self {
            mongo_version: Some(version.into()),
            ..Self::default()
        }
    }

    /// Options that run an existing binary.
    #[must_use]
    pub fn for_binary(binary: impl Into<Utf8PathBuf>) -> Self {
        Self {
            mongod_bin: Some(binary.into()),
            ..Self::default()
        }
    }

    /// Merges these options with `env` and platform facts from `probe`.
    ///
    /// Explicit options take precedence over environment values. When
    /// neither names a port, servers older than 4.0 (or of unknown version)
    /// get a free port picked here; newer servers are passed `0`.
    ///
    /// # Errors
    ///
    /// Returns [`MongoEmbedError::Config`] when no binary source is given or a
    /// value is out of range, and propagates version and platform errors.
    pub fn resolve(&self, env: &MongoEnvCfg, probe: &PlatformProbe) -> Result<ResolvedOptions> {
        let version = non_blank(self.mongo_version.as_deref())
            .or_else(|| non_blank(env.mongo_version.as_deref()))
            .map(Version::resolve)
            .transpose()?;

        let binary = self.binary_source(env, probe, version)?;
        let port = match self.port.or(env.mongod_port) {
            Some(port) => port,
            None => default_port(version.as_ref())?,
        };

        Ok(ResolvedOptions {
            binary,
            port,
            startup_timeout: self.startup_timeout(env)?,
            log_format: self.log_format(env)?,
            scratch_root: self.scratch_root()?,
        })
    }

    fn binary_source(
        &self,
        env: &MongoEnvCfg,
        probe: &PlatformProbe,
        version: Option<Version>,
    ) -> Result<BinarySource> {
        if let Some(binary) = self.mongod_bin.as_ref().or(env.mongod_bin.as_ref()) {
            return Ok(BinarySource::Local(binary.clone()));
        }

        let url = match non_blank(self.download_url.as_deref())
            .or_else(|| non_blank(env.download_url.as_deref()))
        {
            Some(url) => url.to_owned(),
            None => {
                let Some(target) = version else {
                    return Err(MongoEmbedError::config(
                        "one of mongo_version, download_url, or mongod_bin must be given",
                    ));
                };
                DownloadSpec::new(target, &probe.detect(&target)?)?.url()
            }
        };

        let cache_root = match self.cache_path.as_ref().or(env.cache_path.as_ref()) {
            Some(root) => root.clone(),
            None => default_cache_dir(probe.os_family()?),
        };

        Ok(BinarySource::Download(DownloadRequest {
            url,
            version,
            cache: ArtifactCache::new(cache_root),
            verify: self.verify,
        }))
    }

    fn startup_timeout(&self, env: &MongoEnvCfg) -> Result<Duration> {
        if let Some(timeout) = self.startup_timeout {
            if timeout.is_zero() {
                return Err(MongoEmbedError::config("startup timeout must be positive"));
            }
            return Ok(timeout);
        }
        let Some(seconds) = env.startup_timeout_secs else {
            return Ok(DEFAULT_STARTUP_TIMEOUT);
        };
        if seconds == 0 {
            return Err(MongoEmbedError::config(format!(
                "MEMONGO_STARTUP_TIMEOUT_SECS must be at least 1 second (received {seconds})"
            )));
        }
        if seconds > MAX_STARTUP_TIMEOUT_SECS {
            return Err(MongoEmbedError::config(format!(
                "MEMONGO_STARTUP_TIMEOUT_SECS must be {MAX_STARTUP_TIMEOUT_SECS} seconds or less (received {seconds})"
            )));
        }
        Ok(Duration::from_secs(seconds))
    }

    fn log_format(&self, env: &MongoEnvCfg) -> Result<LogFormat> {
        if let Some(format) = self.log_format {
            return Ok(format);
        }
        non_blank(env.log_format.as_deref()).map_or(Ok(LogFormat::default()), |raw| {
            raw.parse()
                .map_err(|err| MongoEmbedError::config(format!("MEMONGO_LOG_FORMAT: {err}")))
        })
    }

    fn scratch_root(&self) -> Result<Utf8PathBuf> {
        if let Some(root) = &self.scratch_root {
            return Ok(root.clone());
        }
        Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|path| {
            MongoEmbedError::config(format!(
                "system temporary directory {} is not valid UTF-8",
                path.display()
            ))
        })
    }
}

/// Servers before 4.0 cannot pick their own port, so one is chosen here.
fn default_port(version: Option<&Version>) -> Result<u16> {
    match version {
        Some(known) if known.major >= 4 => Ok(0),
        _ => free_port(),
    }
}

/// Asks the OS for an unused loopback port.
///
/// The port is released before returning, so another process may claim it
/// first.
///
/// # Errors
///
/// Returns an I/O error when no socket can be bound.
pub fn free_port() -> Result<u16> {
    let listener =
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).context("bind ephemeral loopback port")?;
    let port = listener
        .local_addr()
        .context("read ephemeral port")?
        .port();
    Ok(port)
}

/// Accepts text that the environment layer coerced into a number or boolean,
/// so `MEMONGO_LOG_LEVEL=3` reaches level parsing and `MEMONGO_MONGO_VERSION=4.4`
/// reaches version parsing.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Flag(bool),
    }

    let scalar = Option::<Scalar>::deserialize(deserializer)?;
    Ok(scalar.map(|value| match value {
        Scalar::Text(text) => text,
        Scalar::Unsigned(number) => number.to_string(),
        Scalar::Signed(number) => number.to_string(),
        Scalar::Float(number) => number.to_string(),
        Scalar::Flag(flag) => flag.to_string(),
    }))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|trimmed| !trimmed.is_empty())
}
