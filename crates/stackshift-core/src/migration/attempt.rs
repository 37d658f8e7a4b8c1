//! Per-invocation migration state.
//!
//! A [`MigrationAttempt`] is created by the orchestrator, updated as each
//! forward step completes, and handed to the rollback coordinator on
//! failure. It is never stored between calls.
//!
//! [`StepProgress`] is the part the shared step sequence writes to; rollback
//! runs the sequence with a fresh one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{AppState, Application, RestartStrategy};

/// Steps of the forward sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
    /// Set the lifecycle stack on the application record.
    AssignStack,
    /// Build the package against the assigned stack.
    Stage,
    /// Point the current-droplet relationship at the new droplet.
    SwapDroplet,
    /// Bring instances up on the new droplet.
    Restart,
    /// Return the application to its initial running state.
    RestoreState,
}

impl MigrationStep {
    /// Returns the step that follows this one.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::AssignStack => Some(Self::Stage),
            Self::Stage => Some(Self::SwapDroplet),
            Self::SwapDroplet => Some(Self::Restart),
            Self::Restart => Some(Self::RestoreState),
            Self::RestoreState => None,
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssignStack => write!(f, "stack assignment"),
            Self::Stage => write!(f, "staging"),
            Self::SwapDroplet => write!(f, "droplet swap"),
            Self::Restart => write!(f, "restart"),
            Self::RestoreState => write!(f, "state restore"),
        }
    }
}

/// What a run of the step sequence has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepProgress {
    /// Package the staged droplet was built from.
    pub package_guid: Option<String>,
    /// Droplet the application pointed at before staging.
    pub previous_droplet: Option<String>,
    /// Droplet produced or chosen by the staging step.
    pub staged_droplet: Option<String>,
    /// True once a restart was accepted by the platform.
    pub restarted: bool,
    /// Last step that completed.
    pub last_completed: Option<MigrationStep>,
}

impl StepProgress {
    /// Returns the step that would run next.
    #[must_use]
    pub const fn next_step(&self) -> Option<MigrationStep> {
        match self.last_completed {
            None => Some(MigrationStep::AssignStack),
            Some(step) => step.next(),
        }
    }
}

/// Everything rollback needs to know about a migration in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationAttempt {
    /// Application GUID.
    pub app_guid: String,
    /// Application name.
    pub app_name: String,
    /// Stack the application was on at the start.
    pub source_stack: String,
    /// Stack the caller asked for.
    pub target_stack: String,
    /// Running state at the start.
    pub initial_state: AppState,
    /// Restart used for started applications. `None` for stopped ones.
    pub restart: Option<RestartStrategy>,
    /// Progress of the forward sequence.
    pub progress: StepProgress,
}

impl MigrationAttempt {
    /// Starts an attempt for `app` moving to `target_stack`.
    ///
    /// Stopped applications are not restarted, so `strategy` is dropped for
    /// them.
    #[must_use]
    pub fn new(app: &Application, target_stack: &str, strategy: RestartStrategy) -> Self {
        Self {
            app_guid: app.guid.clone(),
            app_name: app.name.clone(),
            source_stack: app.stack.clone(),
            target_stack: target_stack.to_string(),
            initial_state: app.state,
            restart: (app.state == AppState::Started).then_some(strategy),
            progress: StepProgress::default(),
        }
    }
}
