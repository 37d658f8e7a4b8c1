//! Migration settings.
//!
//! Settings are passed explicitly to each [`crate::StackMigrator`]; nothing
//! is cached process-wide, so one process can target several platforms.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::PlatformVersion;

const ENV_POLL_INTERVAL_SECS: &str = "STACKSHIFT_POLL_INTERVAL_SECS";
const ENV_BUILD_TIMEOUT_SECS: &str = "STACKSHIFT_BUILD_TIMEOUT_SECS";
const ENV_ZERO_DOWNTIME_MIN_VERSION: &str = "STACKSHIFT_ZERO_DOWNTIME_MIN_VERSION";
const ENV_ROLLBACK_POLICY: &str = "STACKSHIFT_ROLLBACK_POLICY";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 15 * 60;

/// Oldest platform API version that supports rolling deployments.
pub const ZERO_DOWNTIME_MIN_VERSION: PlatformVersion = PlatformVersion::new(3, 55, 0);

/// How rollback puts the original droplet back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackPolicy {
    /// Point the app back at the droplet it ran before the migration.
    ///
    /// Restores the exact original bits without a rebuild.
    #[default]
    RestorePreviousDroplet,
    /// Re-stage the original package against the source stack.
    Rebuild,
}

impl fmt::Display for RollbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RestorePreviousDroplet => write!(f, "restore-previous-droplet"),
            Self::Rebuild => write!(f, "rebuild"),
        }
    }
}

impl FromStr for RollbackPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "restore-previous-droplet" => Ok(Self::RestorePreviousDroplet),
            "rebuild" => Ok(Self::Rebuild),
            other => Err(Error::configuration(format!(
                "unknown rollback policy '{other}' (expected restore-previous-droplet or rebuild)"
            ))),
        }
    }
}

/// Settings for one [`crate::StackMigrator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Delay between build status checks.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    /// Deadline for a build to leave `STAGING`. `None` waits forever.
    #[serde(with = "optional_duration_secs")]
    pub build_timeout: Option<Duration>,
    /// Minimum API version for zero-downtime restarts.
    pub zero_downtime_min_version: PlatformVersion,
    /// How rollback restores the original droplet.
    pub rollback_policy: RollbackPolicy,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            build_timeout: Some(Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS)),
            zero_downtime_min_version: ZERO_DOWNTIME_MIN_VERSION,
            rollback_policy: RollbackPolicy::default(),
        }
    }
}

impl MigrationConfig {
    /// Sets the build poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the build deadline. `None` disables it.
    #[must_use]
    pub fn with_build_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Sets the minimum version for zero-downtime restarts.
    #[must_use]
    pub fn with_zero_downtime_min_version(mut self, version: PlatformVersion) -> Self {
        self.zero_downtime_min_version = version;
        self
    }

    /// Sets the rollback policy.
    #[must_use]
    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }

    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads settings with a custom environment source.
    ///
    /// `STACKSHIFT_BUILD_TIMEOUT_SECS=0` disables the build deadline.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value cannot be parsed, or when
    /// the poll interval is zero.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let poll_secs = parse_u64_env(&get_env, ENV_POLL_INTERVAL_SECS, DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_secs == 0 {
            return Err(Error::configuration(format!(
                "{ENV_POLL_INTERVAL_SECS} must be greater than zero"
            )));
        }
        let timeout_secs =
            parse_u64_env(&get_env, ENV_BUILD_TIMEOUT_SECS, DEFAULT_BUILD_TIMEOUT_SECS)?;

        let zero_downtime_min_version = match get_env(ENV_ZERO_DOWNTIME_MIN_VERSION) {
            Some(raw) => raw.parse().map_err(|_| {
                Error::configuration(format!(
                    "{ENV_ZERO_DOWNTIME_MIN_VERSION} must be a version, got '{raw}'"
                ))
            })?,
            None => defaults.zero_downtime_min_version,
        };
        let rollback_policy = match get_env(ENV_ROLLBACK_POLICY) {
            Some(raw) => raw.parse()?,
            None => defaults.rollback_policy,
        };

        Ok(Self {
            poll_interval: Duration::from_secs(poll_secs),
            build_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            zero_downtime_min_version,
            rollback_policy,
        })
    }
}

fn parse_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };
    raw.parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a non-negative integer, got '{raw}'"))
    })
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod optional_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = MigrationConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.build_timeout, Some(Duration::from_secs(900)));
        assert_eq!(config.zero_downtime_min_version, PlatformVersion::new(3, 55, 0));
        assert_eq!(config.rollback_policy, RollbackPolicy::RestorePreviousDroplet);
    }

    #[test]
    fn from_env_overrides() {
        let config = MigrationConfig::from_env_with(env(&[
            (ENV_POLL_INTERVAL_SECS, "2"),
            (ENV_BUILD_TIMEOUT_SECS, "0"),
            (ENV_ZERO_DOWNTIME_MIN_VERSION, "3.60.0"),
            (ENV_ROLLBACK_POLICY, "rebuild"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.build_timeout, None);
        assert_eq!(config.zero_downtime_min_version, PlatformVersion::new(3, 60, 0));
        assert_eq!(config.rollback_policy, RollbackPolicy::Rebuild);
    }

    #[test]
    fn from_env_rejects_bad_values() {
        assert!(MigrationConfig::from_env_with(env(&[(ENV_POLL_INTERVAL_SECS, "0")])).is_err());
        assert!(MigrationConfig::from_env_with(env(&[(ENV_BUILD_TIMEOUT_SECS, "soon")])).is_err());
        assert!(MigrationConfig::from_env_with(env(&[(ENV_ROLLBACK_POLICY, "pray")])).is_err());
    }

    #[test]
    fn serde_uses_seconds_and_defaults_missing_fields() {
        let config: MigrationConfig =
            serde_json::from_str(r#"{"poll_interval": 1, "build_timeout": null}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.build_timeout, None);
        assert_eq!(config.rollback_policy, RollbackPolicy::RestorePreviousDroplet);

        let json = serde_json::to_value(MigrationConfig::default()).unwrap();
        assert_eq!(json["build_timeout"], 900);
        assert_eq!(json["zero_downtime_min_version"], "3.55.0");
        assert_eq!(json["rollback_policy"], "restore-previous-droplet");
    }
}
