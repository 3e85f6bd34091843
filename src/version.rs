//! Parses and validates `major.minor.patch` server versions.

use std::fmt;
use std::str::FromStr;

use crate::error::{MongoEmbedError, Result};

/// Oldest release with a published build this crate knows how to fetch.
pub const MINIMUM_SUPPORTED: Version = Version::new(3, 2, 0);

/// An immutable `major.minor.patch` triple ordered lexicographically.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl Version {
    /// Constructs a version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses a version string and rejects releases older than
    /// [`MINIMUM_SUPPORTED`].
    ///
    /// # Errors
    ///
    /// Returns [`MongoEmbedError::UnsupportedVersion`] when the string does not
    /// split into exactly three non-negative integers, or names a release below
    /// the supported floor.
    ///
    /// # Examples
    ///
    /// ```
    /// use mongo_embed_ephemeral::Version;
    ///
    /// let version = Version::resolve("4.4.29")?;
    /// assert_eq!(version.to_string(), "4.4.29");
    /// assert!(Version::resolve("3.0.15").is_err());
    /// # Ok::<(), mongo_embed_ephemeral::MongoEmbedError>(())
    /// ```
    pub fn resolve(raw: &str) -> Result<Self> {
        let version: Self = raw.parse()?;
        if version < MINIMUM_SUPPORTED {
            return Err(MongoEmbedError::UnsupportedVersion {
                version: raw.to_owned(),
                reason: format!("only MongoDB {MINIMUM_SUPPORTED} and above are supported"),
            });
        }
        Ok(version)
    }

    /// Returns `true` when this version is at least `major.minor.patch`.
    #[must_use]
    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        *self >= Self::new(major, minor, patch)
    }
}

impl FromStr for Version {
    type Err = MongoEmbedError;

    fn from_str(raw: &str) -> Result<Self> {
        let malformed = |reason: &str| MongoEmbedError::UnsupportedVersion {
            version: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let parts: Vec<&str> = raw.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(malformed("version number must be in the form x.y.z"));
        };

        let component = |part: &str, name: &str| {
            part.parse::<u32>()
                .map_err(|_| malformed(&format!("could not parse {name} version")))
        };

        Ok(Self::new(
            component(major, "major")?,
            component(minor, "minor")?,
            component(patch, "patch")?,
        ))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
