//! Platform resources the migrator reads and patches.
//!
//! These are the domain shapes, independent of the platform's JSON wire
//! format (see [`crate::platform::wire`]).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Desired running state of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    /// Instances are running.
    Started,
    /// No instances are running.
    Stopped,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl FromStr for AppState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "STARTED" => Ok(Self::Started),
            "STOPPED" => Ok(Self::Stopped),
            other => Err(Error::InvalidInput(format!("unknown app state: {other}"))),
        }
    }
}

/// An application deployed on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Platform identifier.
    pub guid: String,
    /// Human name, unique within a space.
    pub name: String,
    /// Desired running state.
    pub state: AppState,
    /// Stack named by the application's lifecycle.
    pub stack: String,
    /// Owning space.
    pub space_guid: String,
}

/// A named root filesystem applications are built and run against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// Platform identifier.
    pub guid: String,
    /// Unique stack name.
    pub name: String,
}

/// Build state values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    /// The build is still running.
    Staging,
    /// The build produced a droplet.
    Staged,
    /// The build failed.
    Failed,
}

impl BuildState {
    /// Returns true if the build will not change state again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Staging)
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Staging => write!(f, "STAGING"),
            Self::Staged => write!(f, "STAGED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// An asynchronous job compiling a package against a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Platform identifier.
    pub guid: String,
    /// Current state.
    pub state: BuildState,
    /// The produced droplet, once `STAGED`.
    pub droplet_guid: Option<String>,
    /// Failure reason, once `FAILED`.
    pub error: Option<String>,
    /// Creation timestamp, when the platform reports one.
    pub created_at: Option<DateTime<Utc>>,
}

/// A runnable artifact bound to the stack that built it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Droplet {
    /// Platform identifier.
    pub guid: String,
    /// Stack the droplet was built for.
    pub stack: Option<String>,
    /// Package the droplet was built from.
    pub package_guid: String,
}

/// How the application is brought up on a new droplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartStrategy {
    /// Rolling replacement of instances; the app stays reachable.
    ZeroDowntime,
    /// Stop then start; the app is briefly unavailable.
    Standard,
}

impl fmt::Display for RestartStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDowntime => write!(f, "zero-downtime"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

/// A `major.minor.patch` platform API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlatformVersion {
    /// Major version.
    pub major: u64,
    /// Minor version.
    pub minor: u64,
    /// Patch version.
    pub patch: u64,
}

impl PlatformVersion {
    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for PlatformVersion {
    type Err = Error;

    /// Parses `3.102.0`, `v3.102`, or `3.102.0-rc.1` (pre-release suffix ignored).
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches('v');
        let core = trimmed
            .split(['-', '+'])
            .next()
            .unwrap_or_default();

        let mut parts = core.split('.');
        let mut next = |required: bool| -> Result<u64> {
            match parts.next() {
                Some(p) => p
                    .parse::<u64>()
                    .map_err(|_| Error::InvalidVersion(s.to_string())),
                None if required => Err(Error::InvalidVersion(s.to_string())),
                None => Ok(0),
            }
        };

        let major = next(true)?;
        let minor = next(true)?;
        let patch = next(false)?;
        if parts.next().is_some() {
            return Err(Error::InvalidVersion(s.to_string()));
        }
        Ok(Self::new(major, minor, patch))
    }
}

impl Serialize for PlatformVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PlatformVersion {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing() {
        assert_eq!(
            "3.102.0".parse::<PlatformVersion>().unwrap(),
            PlatformVersion::new(3, 102, 0)
        );
        assert_eq!(
            "v3.55".parse::<PlatformVersion>().unwrap(),
            PlatformVersion::new(3, 55, 0)
        );
        assert_eq!(
            "3.76.1-rc.2".parse::<PlatformVersion>().unwrap(),
            PlatformVersion::new(3, 76, 1)
        );
        assert!("3".parse::<PlatformVersion>().is_err());
        assert!("3.x.0".parse::<PlatformVersion>().is_err());
        assert!("1.2.3.4".parse::<PlatformVersion>().is_err());
    }

    #[test]
    fn version_ordering_is_numeric() {
        let min = PlatformVersion::new(3, 55, 0);
        assert!(PlatformVersion::new(3, 102, 0) > min);
        assert!(PlatformVersion::new(3, 9, 0) < min);
        assert!(PlatformVersion::new(3, 55, 0) >= min);
        assert!(PlatformVersion::new(2, 150, 0) < min);
    }

    #[test]
    fn version_serde_as_string() {
        let v: PlatformVersion = serde_json::from_str("\"3.60.2\"").unwrap();
        assert_eq!(v, PlatformVersion::new(3, 60, 2));
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"3.60.2\"");
    }

    #[test]
    fn build_state_terminality() {
        assert!(!BuildState::Staging.is_terminal());
        assert!(BuildState::Staged.is_terminal());
        assert!(BuildState::Failed.is_terminal());
    }

    #[test]
    fn app_state_round_trips_wire_names() {
        assert_eq!("STOPPED".parse::<AppState>().unwrap(), AppState::Stopped);
        assert_eq!(AppState::Started.to_string(), "STARTED");
        assert!("RUNNING".parse::<AppState>().is_err());
    }
}
