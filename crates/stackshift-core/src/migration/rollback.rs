//! Recovery after a failed migration step.
//!
//! The coordinator runs the shared step sequence toward the source stack.
//! Only the steps migration reached are replayed:
//!
//! | failed step      | rollback runs through |
//! |------------------|-----------------------|
//! | `Stage`          | `AssignStack`         |
//! | `SwapDroplet`    | `SwapDroplet`         |
//! | `Restart`        | `Restart`             |
//! | `RestoreState`   | `RestoreState`        |
//!
//! Under [`RollbackPolicy::RestorePreviousDroplet`] the swap puts back the
//! droplet recorded before staging, so the original bits run again. Under
//! [`RollbackPolicy::Rebuild`] the recorded package is re-staged against the
//! source stack and the fresh droplet is swapped in.

use tokio_util::sync::CancellationToken;

use super::attempt::{MigrationAttempt, MigrationStep, StepProgress};
use super::sequence::{run_sequence, DropletSource, SequencePlan};
use crate::config::RollbackPolicy;
use crate::error::RollbackOutcome;
use crate::platform::Platform;
use crate::poller::BuildPoller;

/// Returns an application to its source stack after a failure.
#[derive(Clone, Copy)]
pub struct RollbackCoordinator<'a> {
    platform: &'a dyn Platform,
    poller: BuildPoller,
    policy: RollbackPolicy,
}

impl std::fmt::Debug for RollbackCoordinator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackCoordinator")
            .field("poller", &self.poller)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<'a> RollbackCoordinator<'a> {
    /// Creates a coordinator.
    #[must_use]
    pub const fn new(platform: &'a dyn Platform, poller: BuildPoller, policy: RollbackPolicy) -> Self {
        Self {
            platform,
            poller,
            policy,
        }
    }

    /// Builds the rollback plan for a failure at `failed_step`.
    ///
    /// Returns `None` when nothing was mutated.
    #[must_use]
    pub fn plan(&self, attempt: &MigrationAttempt, failed_step: MigrationStep) -> Option<SequencePlan> {
        let mut through = match failed_step {
            MigrationStep::AssignStack => return None,
            MigrationStep::Stage => MigrationStep::AssignStack,
            other => other,
        };

        let progress = &attempt.progress;
        let droplet = match (self.policy, &progress.previous_droplet, &progress.package_guid) {
            (RollbackPolicy::RestorePreviousDroplet, Some(previous), _) => {
                DropletSource::Existing(previous.clone())
            }
            (_, _, Some(package)) => DropletSource::Build {
                package_guid: Some(package.clone()),
            },
            (RollbackPolicy::Rebuild, Some(previous), None) => {
                DropletSource::Existing(previous.clone())
            }
            (_, None, None) => {
                // Nothing was staged, so the current droplet was never replaced.
                through = MigrationStep::AssignStack;
                DropletSource::Build { package_guid: None }
            }
        };

        let restart = if through >= MigrationStep::Restart {
            attempt.restart
        } else {
            None
        };

        Some(SequencePlan {
            app_guid: attempt.app_guid.clone(),
            stack: attempt.source_stack.clone(),
            droplet,
            restart,
            final_state: attempt.initial_state,
            through,
        })
    }

    /// Rolls `attempt` back after a failure at `failed_step`.
    ///
    /// Never returns an error directly: a rollback failure is reported as
    /// [`RollbackOutcome::RollbackFailed`] so the caller can layer it under
    /// the original failure.
    #[tracing::instrument(
        skip(self, attempt, cancel),
        fields(app = %attempt.app_name, from = %attempt.target_stack, to = %attempt.source_stack)
    )]
    pub async fn recover(
        &self,
        attempt: &MigrationAttempt,
        failed_step: MigrationStep,
        cancel: &CancellationToken,
    ) -> RollbackOutcome {
        let stack = attempt.source_stack.clone();
        let Some(plan) = self.plan(attempt, failed_step) else {
            return RollbackOutcome::RolledBack { stack };
        };

        tracing::warn!(%failed_step, through = %plan.through, policy = %self.policy, "rolling back");
        let mut progress = StepProgress::default();
        match run_sequence(self.platform, &self.poller, &plan, &mut progress, cancel).await {
            Ok(()) => {
                tracing::info!("rollback complete");
                RollbackOutcome::RolledBack { stack }
            }
            Err(failure) => {
                tracing::error!(step = %failure.step, error = %failure.error, "rollback failed");
                RollbackOutcome::RollbackFailed {
                    stack,
                    step: failure.step,
                    error: Box::new(failure.error),
                }
            }
        }
    }
}
