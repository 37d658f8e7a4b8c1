//! Stack migration orchestration.
//!
//! [`StackMigrator::migrate`] moves one application to a new stack:
//!
//! 1. Resolve the application and check it is not already on the target.
//! 2. Check the target stack exists and select the restart strategy.
//! 3. Run the step sequence: assign stack, stage, swap droplet, restart,
//!    restore the initial running state.
//! 4. On a failure after the first mutation, roll back and return an error
//!    naming both the failed step and the rollback outcome.
//!
//! Validation errors are returned before any mutation. Cancellation returns
//! [`Error::Cancelled`] without rolling back.
//!
//! The migrator keeps no state between calls. Migrations of different
//! applications may run concurrently on one instance.

pub mod attempt;
pub mod rollback;
pub mod sequence;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use self::attempt::{MigrationAttempt, MigrationStep};
use self::rollback::RollbackCoordinator;
use self::sequence::{run_sequence, DropletSource, SequencePlan};
use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::model::{AppState, RestartStrategy};
use crate::observability::migration_span;
use crate::platform::Platform;
use crate::poller::BuildPoller;
use crate::strategy::select_strategy;

/// A request to move one application to another stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    /// Application name.
    pub app_name: String,
    /// Target stack name.
    pub target_stack: String,
    /// Require a zero-downtime restart.
    #[serde(default)]
    pub zero_downtime: bool,
}

impl MigrationRequest {
    /// Creates a request with a standard restart.
    #[must_use]
    pub fn new(app_name: impl Into<String>, target_stack: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            target_stack: target_stack.into(),
            zero_downtime: false,
        }
    }

    /// Requires or waives a zero-downtime restart.
    #[must_use]
    pub fn with_zero_downtime(mut self, zero_downtime: bool) -> Self {
        self.zero_downtime = zero_downtime;
        self
    }
}

/// Summary of a successful migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Application name.
    pub app_name: String,
    /// Application GUID.
    pub app_guid: String,
    /// Stack the application left.
    pub source_stack: String,
    /// Stack the application now runs on.
    pub target_stack: String,
    /// Running state before and after.
    pub state: AppState,
    /// Restart used, if the application was started.
    pub restart: Option<RestartStrategy>,
    /// Droplet the application ran before.
    pub previous_droplet: Option<String>,
    /// Droplet built against the target stack.
    pub droplet: Option<String>,
    /// When the migration began.
    pub started_at: DateTime<Utc>,
    /// When the migration finished.
    pub finished_at: DateTime<Utc>,
}

impl MigrationReport {
    /// Returns the confirmation message shown to operators.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Application {} was successfully changed to Stack {}",
            self.app_name, self.target_stack
        )
    }
}

/// Moves applications between stacks.
///
/// ## Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use stackshift_core::platform::http::{HttpPlatform, PlatformConfig};
/// use stackshift_core::{MigrationConfig, MigrationRequest, StackMigrator};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> stackshift_core::Result<()> {
/// let platform = HttpPlatform::new(&PlatformConfig::new("https://api.example.com"))?;
/// let migrator = StackMigrator::new(Arc::new(platform), MigrationConfig::default());
/// let report = migrator
///     .migrate(&MigrationRequest::new("appA", "stackB"), &CancellationToken::new())
///     .await?;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StackMigrator {
    platform: Arc<dyn Platform>,
    config: MigrationConfig,
}

impl fmt::Debug for StackMigrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackMigrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StackMigrator {
    /// Creates a migrator.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, config: MigrationConfig) -> Self {
        Self { platform, config }
    }

    /// Moves `request.app_name` to `request.target_stack`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the application or target stack does not exist
    /// - `AlreadyOnStack` if the application is already on the target
    /// - `CapabilityUnsupported` if zero-downtime was requested on a platform
    ///   that cannot do it
    /// - `StackAssignmentFailed` if the first mutation failed
    /// - `StagingFailed`, `DropletSwapFailed`, `RestartFailed` or
    ///   `StateRestoreFailed` carrying the rollback outcome
    /// - `Cancelled` if `cancel` fired
    #[tracing::instrument(
        skip(self, request, cancel),
        fields(app = %request.app_name, to = %request.target_stack, zero_downtime = request.zero_downtime)
    )]
    pub async fn migrate(
        &self,
        request: &MigrationRequest,
        cancel: &CancellationToken,
    ) -> Result<MigrationReport> {
        let started_at = Utc::now();
        let platform = self.platform.as_ref();

        let app = platform.find_app(&request.app_name).await?;
        if app.stack == request.target_stack {
            return Err(Error::AlreadyOnStack {
                app: app.name,
                stack: app.stack,
            });
        }
        platform.find_stack(&request.target_stack).await?;
        let strategy = select_strategy(
            platform,
            request.zero_downtime,
            self.config.zero_downtime_min_version,
        )
        .await?;

        let mut attempt = MigrationAttempt::new(&app, &request.target_stack, strategy);
        let span = migration_span(&app.name, &app.stack, &request.target_stack);
        self.run_forward(&mut attempt, cancel).instrument(span).await?;

        Ok(MigrationReport {
            app_name: attempt.app_name,
            app_guid: attempt.app_guid,
            source_stack: attempt.source_stack,
            target_stack: attempt.target_stack,
            state: attempt.initial_state,
            restart: attempt.restart,
            previous_droplet: attempt.progress.previous_droplet,
            droplet: attempt.progress.staged_droplet,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn run_forward(
        &self,
        attempt: &mut MigrationAttempt,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let platform = self.platform.as_ref();
        let poller = BuildPoller::from_config(&self.config);
        let plan = SequencePlan {
            app_guid: attempt.app_guid.clone(),
            stack: attempt.target_stack.clone(),
            droplet: DropletSource::Build { package_guid: None },
            restart: attempt.restart,
            final_state: attempt.initial_state,
            through: MigrationStep::RestoreState,
        };

        tracing::info!(
            from = %attempt.source_stack,
            restart = ?attempt.restart,
            "starting migration"
        );
        let Err(failure) = run_sequence(platform, &poller, &plan, &mut attempt.progress, cancel).await
        else {
            tracing::info!("migration complete");
            return Ok(());
        };

        if failure.error.is_cancelled() {
            tracing::warn!(step = %failure.step, "migration cancelled");
            return Err(failure.error);
        }
        tracing::warn!(step = %failure.step, error = %failure.error, "migration step failed");

        let rollback = RollbackCoordinator::new(platform, poller, self.config.rollback_policy)
            .recover(attempt, failure.step, cancel)
            .await;
        Err(Error::step_failed(
            failure.step,
            attempt.app_name.clone(),
            attempt.target_stack.clone(),
            failure.error,
            rollback,
        ))
    }
}
