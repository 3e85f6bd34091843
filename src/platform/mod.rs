//! Detects the host operating system, CPU architecture, and Linux
//! distribution without touching the network.
//!
//! Platform facts are read through an explicit [`PlatformProbe`] so tests can
//! describe an arbitrary host instead of patching process-wide state.

mod os_release;

use std::fmt;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::{MongoEmbedError, Result};
use crate::version::Version;

const LOG_TARGET: &str = "mongo_embed::platform";

/// Default location of the os-release(5) descriptor.
pub const ETC_OS_RELEASE: &str = "/etc/os-release";

/// Default location of the legacy Red Hat release string.
pub const ETC_REDHAT_RELEASE: &str = "/etc/redhat-release";

/// Operating system families with published server builds.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum OsFamily {
    /// macOS, published under the `osx` download directory.
    Mac,
    /// Linux, published under the `linux` download directory.
    Linux,
}

impl OsFamily {
    /// Returns the download directory segment used by the file server.
    #[must_use]
    pub const fn platform_segment(self) -> &'static str {
        match self {
            Self::Mac => "osx",
            Self::Linux => "linux",
        }
    }
}

/// CPU architectures with published server builds.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Arch {
    /// 64-bit x86.
    X86_64,
}

impl Arch {
    /// Returns the architecture segment used in artefact names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
        }
    }
}

/// Platform facts resolved for a particular target version.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlatformInfo {
    /// Detected operating system family.
    pub os: OsFamily,
    /// Detected CPU architecture.
    pub arch: Arch,
    /// Distribution tag (for example `ubuntu2004`); `None` means generic.
    pub distribution: Option<&'static str>,
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.os.platform_segment(),
            self.arch.as_str(),
            self.distribution.unwrap_or("generic")
        )
    }
}

/// Source of platform facts.
///
/// [`PlatformProbe::host`] describes the running process; tests construct
/// probes pointing at fixture descriptor files.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlatformProbe {
    /// Operating system name as reported by [`std::env::consts::OS`].
    pub os: String,
    /// Architecture name as reported by [`std::env::consts::ARCH`].
    pub arch: String,
    /// Path of the os-release descriptor.
    pub os_release: Utf8PathBuf,
    /// Path of the fallback Red Hat release string.
    pub redhat_release: Utf8PathBuf,
}

impl PlatformProbe {
    /// Describes the host running this process.
    #[must_use]
    pub fn host() -> Self {
        Self {
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            os_release: Utf8PathBuf::from(ETC_OS_RELEASE),
            redhat_release: Utf8PathBuf::from(ETC_REDHAT_RELEASE),
        }
    }

    /// Detects the platform and maps it to a distribution tag for `version`.
    ///
    /// A missing descriptor file is not fatal: the host is treated as a
    /// generic Linux. Descriptor files that exist but cannot be read, or whose
    /// release number cannot be parsed, are errors.
    ///
    /// # Errors
    ///
    /// Returns [`MongoEmbedError::UnsupportedSystem`] for an unrecognised OS,
    /// architecture, or release number, and [`MongoEmbedError::Io`] when a
    /// descriptor file exists but cannot be read.
    pub fn detect(&self, version: &Version) -> Result<PlatformInfo> {
        let os = self.os_family()?;
        let arch = self.arch()?;
        let distribution = match os {
            OsFamily::Mac => None,
            OsFamily::Linux => self.linux_distribution(version)?,
        };
        let info = PlatformInfo {
            os,
            arch,
            distribution,
        };
        debug!(target: LOG_TARGET, platform = %info, version = %version, "detected platform");
        Ok(info)
    }

    /// Maps the probe's OS name onto a supported family.
    ///
    /// # Errors
    ///
    /// Returns [`MongoEmbedError::UnsupportedSystem`] for any OS other than
    /// macOS or Linux.
    pub fn os_family(&self) -> Result<OsFamily> {
        match self.os.as_str() {
            "macos" => Ok(OsFamily::Mac),
            "linux" => Ok(OsFamily::Linux),
            other => Err(MongoEmbedError::unsupported_system(
                other,
                format!("your platform, {other}, is not supported"),
            )),
        }
    }

    fn arch(&self) -> Result<Arch> {
        match self.arch.as_str() {
            "x86_64" => Ok(Arch::X86_64),
            other => Err(MongoEmbedError::unsupported_system(
                other,
                format!("your architecture, {other}, is not supported"),
            )),
        }
    }

    fn linux_distribution(&self, version: &Version) -> Result<Option<&'static str>> {
        if let Some(content) = read_optional(&self.os_release)? {
            let fields = os_release::parse(&content);
            let id = fields.get("ID").map_or("", String::as_str);
            let major = release_major(fields.get("VERSION_ID").map(String::as_str))?;
            return Ok(tag_for_release(id, major, version));
        }

        if let Some(content) = read_optional(&self.redhat_release)? {
            return Ok(tag_for_redhat_release(&content));
        }

        debug!(
            target: LOG_TARGET,
            os_release = %self.os_release,
            redhat_release = %self.redhat_release,
            "no OS descriptor found, assuming generic linux"
        );
        Ok(None)
    }
}

impl Default for PlatformProbe {
    fn default() -> Self {
        Self::host()
    }
}

fn read_optional(path: &Utf8Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(MongoEmbedError::from(
            color_eyre::Report::new(err).wrap_err(format!("failed to read {path}")),
        )),
    }
}

fn release_major(version_id: Option<&str>) -> Result<Option<u32>> {
    let Some(raw) = version_id else {
        return Ok(None);
    };
    let major = raw.split('.').next().unwrap_or_default();
    major
        .parse::<u32>()
        .map(Some)
        .map_err(|_| {
            MongoEmbedError::unsupported_system(raw, format!("invalid version number {major}"))
        })
}

/// Lower bound on the distribution's own major release.
#[derive(Debug, Clone, Copy)]
enum OsMajor {
    AtLeast(u32),
    Exactly(u32),
    Any,
}

impl OsMajor {
    fn matches(self, major: Option<u32>) -> bool {
        match (self, major) {
            (Self::Any, _) => true,
            (Self::AtLeast(min), Some(found)) => found >= min,
            (Self::Exactly(want), Some(found)) => found == want,
            (Self::AtLeast(_) | Self::Exactly(_), None) => false,
        }
    }
}

struct TagRule {
    id: &'static str,
    os_major: OsMajor,
    since: Version,
    tag: &'static str,
}

const fn rule(id: &'static str, os_major: OsMajor, since: Version, tag: &'static str) -> TagRule {
    TagRule {
        id,
        os_major,
        since,
        tag,
    }
}

/// Ordered table; the first rule matching id, OS release, and target version
/// wins.
const TAG_RULES: &[TagRule] = &[
    rule("ubuntu", OsMajor::AtLeast(22), Version::new(6, 0, 4), "ubuntu2204"),
    rule("ubuntu", OsMajor::AtLeast(20), Version::new(4, 4, 0), "ubuntu2004"),
    rule("ubuntu", OsMajor::AtLeast(18), Version::new(4, 0, 1), "ubuntu1804"),
    rule("ubuntu", OsMajor::AtLeast(16), Version::new(3, 2, 7), "ubuntu1604"),
    rule("ubuntu", OsMajor::AtLeast(14), Version::new(0, 0, 0), "ubuntu1404"),
    rule("sles", OsMajor::AtLeast(12), Version::new(0, 0, 0), "suse12"),
    rule("rhel", OsMajor::AtLeast(7), Version::new(0, 0, 0), "rhel70"),
    rule("debian", OsMajor::AtLeast(10), Version::new(4, 4, 0), "debian10"),
    rule("debian", OsMajor::AtLeast(9), Version::new(3, 6, 5), "debian92"),
    rule("debian", OsMajor::AtLeast(8), Version::new(3, 2, 8), "debian81"),
    rule("amzn", OsMajor::Exactly(2), Version::new(4, 0, 0), "amazon2"),
    // Releases before Amazon Linux 2 use a date as VERSION_ID.
    rule("amzn", OsMajor::Any, Version::new(0, 0, 0), "amazon"),
];

fn tag_for_release(id: &str, major: Option<u32>, version: &Version) -> Option<&'static str> {
    TAG_RULES
        .iter()
        .find(|rule| rule.id == id && rule.os_major.matches(major) && *version >= rule.since)
        .map(|rule| rule.tag)
}

fn tag_for_redhat_release(content: &str) -> Option<&'static str> {
    // RHEL 7 and later ship os-release, so only RHEL 6 lands here.
    content.contains("release 6").then_some("rhel62")
}
