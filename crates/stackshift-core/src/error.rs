//! Error types and result aliases for stackshift.
//!
//! Validation errors (`NotFound`, `AlreadyOnStack`, `CapabilityUnsupported`)
//! are raised before any mutation. Failures after the first mutating step
//! carry the step that failed and a [`RollbackOutcome`] describing whether
//! the application was put back on its original stack.

use std::fmt;
use std::time::Duration;

use crate::migration::attempt::MigrationStep;
use crate::model::PlatformVersion;

/// The result type used throughout stackshift.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while migrating an application between stacks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested resource does not exist on the platform.
    #[error("{resource_type} not found: {name}")]
    NotFound {
        /// The kind of resource (`application`, `stack`, `droplet`, ...).
        resource_type: &'static str,
        /// The name or identifier that was looked up.
        name: String,
    },

    /// The application already runs on the requested stack.
    #[error("application is already associated with stack {stack}")]
    AlreadyOnStack {
        /// Application name.
        app: String,
        /// The stack the application is already on.
        stack: String,
    },

    /// A requested capability is not available on this platform.
    #[error(
        "{feature} is not compatible with your foundation (requires API {minimum}, found {actual}); remove the flag and rerun"
    )]
    CapabilityUnsupported {
        /// The capability that was requested.
        feature: &'static str,
        /// Minimum platform API version supporting it.
        minimum: PlatformVersion,
        /// Version reported by the platform.
        actual: PlatformVersion,
    },

    /// Assigning the target stack to the application record failed.
    ///
    /// Nothing was mutated, so no rollback is attempted.
    #[error("stack assignment failed for {app} on stack {stack}: {source}")]
    StackAssignmentFailed {
        /// Application name.
        app: String,
        /// Stack that was being assigned.
        stack: String,
        /// The underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// Staging a droplet against the target stack failed.
    #[error("staging failed for {app} on stack {stack}: {source}; {rollback}")]
    StagingFailed {
        /// Application name.
        app: String,
        /// Target stack.
        stack: String,
        /// The underlying cause.
        #[source]
        source: Box<Error>,
        /// What happened when the application was rolled back.
        rollback: RollbackOutcome,
    },

    /// Pointing the application at the new droplet failed.
    #[error("droplet-swap failed for {app} on stack {stack}: {source}; {rollback}")]
    DropletSwapFailed {
        /// Application name.
        app: String,
        /// Target stack.
        stack: String,
        /// The underlying cause.
        #[source]
        source: Box<Error>,
        /// What happened when the application was rolled back.
        rollback: RollbackOutcome,
    },

    /// Restarting the application on the new droplet failed.
    #[error("restart failed for {app} on stack {stack}: {source}; {rollback}")]
    RestartFailed {
        /// Application name.
        app: String,
        /// Target stack.
        stack: String,
        /// The underlying cause.
        #[source]
        source: Box<Error>,
        /// What happened when the application was rolled back.
        rollback: RollbackOutcome,
    },

    /// Returning the application to its initial running state failed.
    #[error("state-restore failed for {app} on stack {stack}: {source}; {rollback}")]
    StateRestoreFailed {
        /// Application name.
        app: String,
        /// Target stack.
        stack: String,
        /// The underlying cause.
        #[source]
        source: Box<Error>,
        /// What happened when the application was rolled back.
        rollback: RollbackOutcome,
    },

    /// A build reached the `FAILED` state.
    #[error("build {build_id} failed: {reason}")]
    BuildFailed {
        /// The build identifier.
        build_id: String,
        /// Reason reported by the platform.
        reason: String,
    },

    /// A build did not leave `STAGING` before the deadline.
    #[error("build {build_id} did not finish staging within {timeout:?}")]
    BuildTimedOut {
        /// The build identifier.
        build_id: String,
        /// The configured deadline.
        timeout: Duration,
    },

    /// The caller cancelled the migration.
    #[error("migration cancelled during {step}")]
    Cancelled {
        /// The step that was running or about to run.
        step: MigrationStep,
    },

    /// The platform API rejected a request.
    #[error("platform API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message decoded from the error body.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A response body could not be decoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the decoding failure.
        message: String,
    },

    /// A version string could not be parsed.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A configuration value is invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl Error {
    /// Creates a new not found error.
    #[must_use]
    pub fn not_found(resource_type: &'static str, name: impl fmt::Display) -> Self {
        Self::NotFound {
            resource_type,
            name: name.to_string(),
        }
    }

    /// Creates a new API error.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new transport error with a source cause.
    #[must_use]
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true for errors raised before any mutation.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AlreadyOnStack { .. }
                | Self::CapabilityUnsupported { .. }
                | Self::InvalidInput(_)
        )
    }

    /// Returns true if this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns the migration step this error is attributed to, if any.
    #[must_use]
    pub const fn failed_step(&self) -> Option<MigrationStep> {
        match self {
            Self::StackAssignmentFailed { .. } => Some(MigrationStep::AssignStack),
            Self::StagingFailed { .. } => Some(MigrationStep::Stage),
            Self::DropletSwapFailed { .. } => Some(MigrationStep::SwapDroplet),
            Self::RestartFailed { .. } => Some(MigrationStep::Restart),
            Self::StateRestoreFailed { .. } => Some(MigrationStep::RestoreState),
            Self::Cancelled { step } => Some(*step),
            _ => None,
        }
    }

    /// Returns the rollback outcome for post-mutation failures.
    #[must_use]
    pub const fn rollback(&self) -> Option<&RollbackOutcome> {
        match self {
            Self::StagingFailed { rollback, .. }
            | Self::DropletSwapFailed { rollback, .. }
            | Self::RestartFailed { rollback, .. }
            | Self::StateRestoreFailed { rollback, .. } => Some(rollback),
            _ => None,
        }
    }

    /// Returns true if the migration failed and rollback failed as well.
    #[must_use]
    pub fn is_rollback_failed(&self) -> bool {
        self.rollback().is_some_and(RollbackOutcome::is_failed)
    }

    /// Builds the step-attributed error for a failure after the first mutation.
    pub(crate) fn step_failed(
        step: MigrationStep,
        app: impl Into<String>,
        stack: impl Into<String>,
        source: Self,
        rollback: RollbackOutcome,
    ) -> Self {
        let app = app.into();
        let stack = stack.into();
        let source = Box::new(source);
        match step {
            MigrationStep::AssignStack => Self::StackAssignmentFailed { app, stack, source },
            MigrationStep::Stage => Self::StagingFailed {
                app,
                stack,
                source,
                rollback,
            },
            MigrationStep::SwapDroplet => Self::DropletSwapFailed {
                app,
                stack,
                source,
                rollback,
            },
            MigrationStep::Restart => Self::RestartFailed {
                app,
                stack,
                source,
                rollback,
            },
            MigrationStep::RestoreState => Self::StateRestoreFailed {
                app,
                stack,
                source,
                rollback,
            },
        }
    }
}

/// Outcome of the automatic rollback that follows a failed migration step.
#[derive(Debug)]
pub enum RollbackOutcome {
    /// The application is back on its original stack and running state.
    RolledBack {
        /// The stack the application was returned to.
        stack: String,
    },
    /// Rollback itself failed; the application may be inconsistent.
    RollbackFailed {
        /// The stack rollback was trying to return to.
        stack: String,
        /// The rollback step that failed.
        step: MigrationStep,
        /// Why rollback failed.
        error: Box<Error>,
    },
}

impl RollbackOutcome {
    /// Returns true if rollback did not complete.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::RollbackFailed { .. })
    }

    /// Returns the rollback error, if rollback failed.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::RolledBack { .. } => None,
            Self::RollbackFailed { error, .. } => Some(error),
        }
    }
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RolledBack { stack } => write!(f, "rolled back to {stack}"),
            Self::RollbackFailed { stack, step, error } => {
                write!(f, "rollback failed at {step} while returning to {stack}: {error}")
            }
        }
    }
}
