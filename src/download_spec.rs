//! Builds the fully-qualified artefact descriptor for a version and platform.
//!
//! URL construction must stay byte-for-byte compatible with the upstream file
//! server layout, so every segment comes from a fixed table.

use crate::error::{MongoEmbedError, Result};
use crate::platform::{Arch, OsFamily, PlatformInfo};
use crate::version::Version;

const DOWNLOAD_HOST: &str = "https://fastdl.mongodb.org";
const PUBLIC_KEY_HOST: &str = "https://www.mongodb.org/static/pgp";

/// Releases from this version onwards no longer publish generic Linux
/// tarballs.
const GENERIC_LINUX_CUTOFF: Version = Version::new(4, 2, 0);

/// macOS releases before this version use the `osx-ssl` artefact name.
const MACOS_SSL_CUTOFF: Version = Version::new(4, 2, 0);

/// Describes one downloadable server artefact.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DownloadSpec {
    /// Target release.
    pub version: Version,
    /// Operating system family.
    pub platform: OsFamily,
    /// CPU architecture.
    pub arch: Arch,
    /// Linux distribution tag; `None` for macOS and generic Linux.
    pub distribution: Option<&'static str>,
    /// Whether the legacy macOS `osx-ssl` build is required.
    pub ssl_build: bool,
}

impl DownloadSpec {
    /// Combines a resolved version with detected platform facts.
    ///
    /// # Errors
    ///
    /// Returns [`MongoEmbedError::UnsupportedSystem`] when the version is too
    /// new for a generic (untagged) Linux build.
    ///
    /// # Examples
    ///
    /// ```
    /// use mongo_embed_ephemeral::{Arch, DownloadSpec, OsFamily, PlatformInfo, Version};
    ///
    /// let platform = PlatformInfo {
    ///     os: OsFamily::Linux,
    ///     arch: Arch::X86_64,
    ///     distribution: Some("ubuntu2004"),
    /// };
    /// let spec = DownloadSpec::new(Version::new(4, 4, 29), &platform)?;
    /// assert_eq!(
    ///     spec.url(),
    ///     "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-ubuntu2004-4.4.29.tgz"
    /// );
    /// # Ok::<(), mongo_embed_ephemeral::MongoEmbedError>(())
    /// ```
    pub fn new(version: Version, platform: &PlatformInfo) -> Result<Self> {
        if platform.os == OsFamily::Linux
            && platform.distribution.is_none()
            && version >= GENERIC_LINUX_CUTOFF
        {
            return Err(MongoEmbedError::unsupported_system(
                platform.to_string(),
                format!(
                    "MongoDB {GENERIC_LINUX_CUTOFF} removed support for generic linux tarballs; \
                     specify the download URL manually or use a supported distribution"
                ),
            ));
        }

        Ok(Self {
            version,
            platform: platform.os,
            arch: platform.arch,
            distribution: platform.distribution,
            ssl_build: platform.os == OsFamily::Mac && version < MACOS_SSL_CUTOFF,
        })
    }

    /// Returns the archive file name, for example
    /// `mongodb-macos-x86_64-4.4.29.tgz`.
    #[must_use]
    pub fn archive_name(&self) -> String {
        let arch = self.arch.as_str();
        let version = self.version;
        match self.platform {
            OsFamily::Linux => match self.distribution {
                Some(tag) => format!("mongodb-linux-{arch}-{tag}-{version}.tgz"),
                None => format!("mongodb-linux-{arch}-{version}.tgz"),
            },
            OsFamily::Mac if self.ssl_build => format!("mongodb-osx-ssl-{arch}-{version}.tgz"),
            OsFamily::Mac => format!("mongodb-macos-{arch}-{version}.tgz"),
        }
    }

    /// Returns the artefact URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{DOWNLOAD_HOST}/{}/{}",
            self.platform.platform_segment(),
            self.archive_name()
        )
    }

    /// Returns the URL of the companion SHA-256 file.
    #[must_use]
    pub fn checksum_url(&self) -> String {
        checksum_url_for(&self.url())
    }

    /// Returns the URL of the companion detached signature.
    #[must_use]
    pub fn signature_url(&self) -> String {
        signature_url_for(&self.url())
    }

    /// Returns the URL of the release signing key for this version.
    #[must_use]
    pub fn public_key_url(&self) -> String {
        public_key_url_for(&self.version)
    }
}

/// Appends the checksum suffix to an artefact URL.
#[must_use]
pub fn checksum_url_for(artifact_url: &str) -> String {
    format!("{artifact_url}.sha256")
}

/// Appends the detached-signature suffix to an artefact URL.
#[must_use]
pub fn signature_url_for(artifact_url: &str) -> String {
    format!("{artifact_url}.sig")
}

/// Returns the release signing key URL, keyed by `major.minor`.
#[must_use]
pub fn public_key_url_for(version: &Version) -> String {
    format!(
        "{PUBLIC_KEY_HOST}/server-{}.{}.asc",
        version.major, version.minor
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rstest::rstest;

    fn platform(os: OsFamily, distribution: Option<&'static str>) -> PlatformInfo {
        PlatformInfo {
            os,
            arch: Arch::X86_64,
            distribution,
        }
    }

    #[rstest]
    #[case(
        OsFamily::Mac,
        None,
        "4.0.5",
        "https://fastdl.mongodb.org/osx/mongodb-osx-ssl-x86_64-4.0.5.tgz"
    )]
    #[case(
        OsFamily::Mac,
        None,
        "4.2.1",
        "https://fastdl.mongodb.org/osx/mongodb-macos-x86_64-4.2.1.tgz"
    )]
    #[case(
        OsFamily::Linux,
        Some("ubuntu1804"),
        "4.0.13",
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-ubuntu1804-4.0.13.tgz"
    )]
    #[case(
        OsFamily::Linux,
        Some("rhel62"),
        "3.6.13",
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-rhel62-3.6.13.tgz"
    )]
    #[case(
        OsFamily::Linux,
        None,
        "4.0.5",
        "https://fastdl.mongodb.org/linux/mongodb-linux-x86_64-4.0.5.tgz"
    )]
    fn builds_upstream_urls(
        #[case] os: OsFamily,
        #[case] distribution: Option<&'static str>,
        #[case] version: &str,
        #[case] expected: &str,
    ) {
        let version = Version::resolve(version).expect("valid version");
        let spec = DownloadSpec::new(version, &platform(os, distribution)).expect("spec");
        assert_eq!(spec.url(), expected);
        assert_eq!(spec.checksum_url(), format!("{expected}.sha256"));
        assert_eq!(spec.signature_url(), format!("{expected}.sig"));
    }

    #[test]
    fn generic_linux_is_rejected_from_the_cutoff() {
        let err = DownloadSpec::new(Version::new(4, 2, 0), &platform(OsFamily::Linux, None))
            .expect_err("generic linux 4.2 must fail");
        assert_eq!(err.kind(), ErrorKind::UnsupportedSystem);
        assert!(err.to_string().contains("generic linux tarballs"));
    }

    #[test]
    fn identical_specs_yield_identical_urls() {
        let info = platform(OsFamily::Linux, Some("debian10"));
        let first = DownloadSpec::new(Version::new(4, 4, 6), &info).expect("spec");
        let second = DownloadSpec::new(Version::new(4, 4, 6), &info).expect("spec");
        assert_eq!(first, second);
        assert_eq!(first.url(), second.url());
    }

    #[test]
    fn public_key_is_keyed_by_major_and_minor() {
        let spec = DownloadSpec::new(Version::new(4, 4, 29), &platform(OsFamily::Mac, None))
            .expect("spec");
        assert_eq!(
            spec.public_key_url(),
            "https://www.mongodb.org/static/pgp/server-4.4.asc"
        );
    }
}
