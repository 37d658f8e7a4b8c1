//! Restart-strategy selection.
//!
//! ```text
//! CHECK_CAPABILITY ──► ZERO_DOWNTIME ────┐
//!        │                               ├──► DONE
//!        └──────────► STANDARD_RESTART ──┘
//! ```
//!
//! Selection runs with the precondition checks, before any mutation, so a
//! migration never stops halfway because the requested restart is
//! unavailable. The platform version is queried only when zero-downtime is
//! requested and is never cached between calls.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{PlatformVersion, RestartStrategy};
use crate::platform::Platform;

/// Restart-strategy state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyState {
    /// Deciding which restart the platform and caller allow.
    CheckCapability,
    /// Rolling restart selected.
    ZeroDowntime,
    /// Ordinary restart selected.
    StandardRestart,
    /// The restart was issued.
    Done,
}

impl StrategyState {
    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::CheckCapability => matches!(target, Self::ZeroDowntime | Self::StandardRestart),
            Self::ZeroDowntime | Self::StandardRestart => matches!(target, Self::Done),
            Self::Done => false,
        }
    }

    /// Returns the restart strategy a selected state stands for.
    #[must_use]
    pub const fn strategy(&self) -> Option<RestartStrategy> {
        match self {
            Self::ZeroDowntime => Some(RestartStrategy::ZeroDowntime),
            Self::StandardRestart => Some(RestartStrategy::Standard),
            Self::CheckCapability | Self::Done => None,
        }
    }
}

impl fmt::Display for StrategyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckCapability => write!(f, "CHECK_CAPABILITY"),
            Self::ZeroDowntime => write!(f, "ZERO_DOWNTIME"),
            Self::StandardRestart => write!(f, "STANDARD_RESTART"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// Decides the `CHECK_CAPABILITY` transition.
///
/// `actual` is the platform version, if it was queried. Zero-downtime is
/// chosen only when requested and `actual >= minimum`.
///
/// # Errors
///
/// Returns `CapabilityUnsupported` when zero-downtime was requested but the
/// platform is older than `minimum`.
pub fn check_capability(
    requested_zero_downtime: bool,
    actual: Option<PlatformVersion>,
    minimum: PlatformVersion,
) -> Result<StrategyState> {
    if !requested_zero_downtime {
        return Ok(StrategyState::StandardRestart);
    }
    match actual {
        Some(actual) if actual >= minimum => Ok(StrategyState::ZeroDowntime),
        Some(actual) => Err(Error::CapabilityUnsupported {
            feature: "zero-downtime restart",
            minimum,
            actual,
        }),
        None => Err(Error::InvalidInput(
            "zero-downtime requested without a platform version".to_string(),
        )),
    }
}

/// Runs `CHECK_CAPABILITY` against a platform and returns the chosen restart.
///
/// # Errors
///
/// Returns `CapabilityUnsupported`, or any error from
/// [`Platform::api_version`].
pub async fn select_strategy(
    platform: &dyn Platform,
    requested_zero_downtime: bool,
    minimum: PlatformVersion,
) -> Result<RestartStrategy> {
    let actual = if requested_zero_downtime {
        Some(platform.api_version().await?)
    } else {
        None
    };

    let selected = check_capability(requested_zero_downtime, actual, minimum)?;
    debug_assert!(StrategyState::CheckCapability.can_transition_to(selected));
    tracing::debug!(from = %StrategyState::CheckCapability, to = %selected, "restart strategy selected");

    selected
        .strategy()
        .ok_or_else(|| Error::InvalidInput(format!("{selected} does not select a restart")))
}
