//! Shared tracing configuration.
//!
//! The library only emits events; installing a subscriber is left to the
//! application. [`LogLevel`] maps the user-facing verbosity names onto
//! tracing filters for the bundled binary.

use std::fmt;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;

/// Target used by top-level lifecycle events.
pub(crate) const LOG_TARGET: &str = "mongo_embed::observability";

/// User-facing verbosity names.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum LogLevel {
    /// Everything, including relayed server output.
    Debug,
    /// Lifecycle milestones.
    #[default]
    Info,
    /// Only problems.
    Warn,
    /// Nothing.
    Silent,
}

impl LogLevel {
    /// Returns the matching tracing filter.
    #[must_use]
    pub const fn filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Silent => LevelFilter::OFF,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "silent" => Ok(Self::Silent),
            other => Err(format!(
                "unknown log level {other:?}; expected debug, info, warn, or silent"
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Silent => "silent",
        })
    }
}
