//! The step sequence shared by migration and rollback.
//!
//! Migration runs it toward the target stack; rollback runs it again toward
//! the source stack with a plan derived from how far migration got. Keeping
//! one function for both directions keeps them in lockstep.

use tokio_util::sync::CancellationToken;

use super::attempt::{MigrationStep, StepProgress};
use crate::error::{Error, Result};
use crate::model::{AppState, RestartStrategy};
use crate::platform::Platform;
use crate::poller::BuildPoller;

/// Where the staging step gets its droplet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropletSource {
    /// Build a package against the assigned stack.
    ///
    /// With `package_guid: None` the package is taken from the application's
    /// current droplet, which is also recorded as the previous droplet.
    Build {
        /// Package to build, if already known.
        package_guid: Option<String>,
    },
    /// Reuse an existing droplet without building.
    Existing(String),
}

/// Arguments for one run of the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePlan {
    /// Application GUID.
    pub app_guid: String,
    /// Stack to assign.
    pub stack: String,
    /// Source of the droplet to swap in.
    pub droplet: DropletSource,
    /// Restart to issue. `None` skips the restart step.
    pub restart: Option<RestartStrategy>,
    /// Running state to leave the application in.
    pub final_state: AppState,
    /// Last step to run; later steps are skipped.
    pub through: MigrationStep,
}

/// A step that failed and why.
#[derive(Debug)]
pub struct StepFailure {
    /// The step that failed.
    pub step: MigrationStep,
    /// The underlying error.
    pub error: Error,
}

/// Runs the steps of `plan` in order, recording each completion in `progress`.
///
/// Starts after `progress.last_completed`, so a fresh progress runs from
/// stack assignment.
///
/// Cancellation is checked before every step and while waiting for a build.
///
/// # Errors
///
/// Returns the first failing step together with its error. `progress`
/// reflects everything that completed before it.
pub async fn run_sequence(
    platform: &dyn Platform,
    poller: &BuildPoller,
    plan: &SequencePlan,
    progress: &mut StepProgress,
    cancel: &CancellationToken,
) -> std::result::Result<(), StepFailure> {
    while let Some(step) = progress.next_step() {
        if step > plan.through {
            break;
        }
        if cancel.is_cancelled() {
            return Err(StepFailure {
                step,
                error: Error::Cancelled { step },
            });
        }

        tracing::info!(%step, stack = %plan.stack, "running step");
        run_step(platform, poller, plan, step, progress, cancel)
            .await
            .map_err(|error| StepFailure { step, error })?;
        progress.last_completed = Some(step);
    }
    Ok(())
}

async fn run_step(
    platform: &dyn Platform,
    poller: &BuildPoller,
    plan: &SequencePlan,
    step: MigrationStep,
    progress: &mut StepProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    let app = plan.app_guid.as_str();
    match step {
        MigrationStep::AssignStack => platform.set_app_stack(app, &plan.stack).await,
        MigrationStep::Stage => stage(platform, poller, plan, progress, cancel).await,
        MigrationStep::SwapDroplet => {
            let droplet = progress
                .staged_droplet
                .as_deref()
                .ok_or_else(|| Error::InvalidInput("no droplet was staged".to_string()))?;
            platform.set_current_droplet(app, droplet).await
        }
        MigrationStep::Restart => {
            if let Some(strategy) = plan.restart {
                platform.restart_app(app, strategy).await?;
                progress.restarted = true;
            }
            Ok(())
        }
        MigrationStep::RestoreState => match plan.final_state {
            AppState::Stopped => platform.stop_app(app).await,
            AppState::Started if progress.restarted => Ok(()),
            AppState::Started => platform.start_app(app).await,
        },
    }
}

async fn stage(
    platform: &dyn Platform,
    poller: &BuildPoller,
    plan: &SequencePlan,
    progress: &mut StepProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    let package_guid = match &plan.droplet {
        DropletSource::Existing(droplet) => {
            progress.staged_droplet = Some(droplet.clone());
            return Ok(());
        }
        DropletSource::Build {
            package_guid: Some(package),
        } => package.clone(),
        DropletSource::Build { package_guid: None } => {
            let current = platform.current_droplet(&plan.app_guid).await?;
            progress.previous_droplet = Some(current.guid);
            current.package_guid
        }
    };
    progress.package_guid = Some(package_guid.clone());

    let build = platform.create_build(&package_guid).await?;
    tracing::info!(build = %build.guid, package = %package_guid, "build submitted");
    let droplet = poller.await_build(platform, &build.guid, cancel).await?;
    progress.staged_droplet = Some(droplet);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::platform::memory::{InMemoryPlatform, OpKind, PlatformOp};

    fn poller() -> BuildPoller {
        BuildPoller::new(Duration::from_millis(1), Some(Duration::from_secs(5)))
    }

    fn plan(app_guid: &str, through: MigrationStep) -> SequencePlan {
        SequencePlan {
            app_guid: app_guid.to_string(),
            stack: "stackB".to_string(),
            droplet: DropletSource::Build { package_guid: None },
            restart: Some(RestartStrategy::Standard),
            final_state: AppState::Started,
            through,
        }
    }

    #[tokio::test]
    async fn through_limits_steps() {
        let platform = InMemoryPlatform::new();
        platform.add_stack("stackB");
        let guid = platform.add_app("appA", "stackA", AppState::Started);
        let mut progress = StepProgress::default();

        run_sequence(
            &platform,
            &poller(),
            &plan(&guid, MigrationStep::AssignStack),
            &mut progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(progress.last_completed, Some(MigrationStep::AssignStack));
        assert_eq!(platform.mutations().len(), 1);
    }

    #[tokio::test]
    async fn existing_droplet_skips_build() {
        let platform = InMemoryPlatform::new();
        platform.add_stack("stackB");
        let guid = platform.add_app("appA", "stackA", AppState::Started);
        let original = platform.app("appA").unwrap().current_droplet.unwrap().guid;
        let mut progress = StepProgress::default();

        let mut plan = plan(&guid, MigrationStep::RestoreState);
        plan.droplet = DropletSource::Existing(original.clone());
        run_sequence(&platform, &poller(), &plan, &mut progress, &CancellationToken::new())
            .await
            .unwrap();

        assert!(platform
            .operations()
            .iter()
            .all(|op| op.kind() != OpKind::CreateBuild));
        assert_eq!(progress.staged_droplet.as_deref(), Some(original.as_str()));
        assert!(progress.restarted);
    }

    #[tokio::test]
    async fn stopped_final_state_issues_stop() {
        let platform = InMemoryPlatform::new();
        platform.add_stack("stackB");
        let guid = platform.add_app("appB", "stackA", AppState::Stopped);
        let mut progress = StepProgress::default();

        let mut plan = plan(&guid, MigrationStep::RestoreState);
        plan.restart = None;
        plan.final_state = AppState::Stopped;
        run_sequence(&platform, &poller(), &plan, &mut progress, &CancellationToken::new())
            .await
            .unwrap();

        let last = platform.mutations().pop().unwrap();
        assert_eq!(last, PlatformOp::Stop { app_guid: guid });
        assert!(!progress.restarted);
    }

    #[tokio::test]
    async fn failure_reports_step_and_keeps_progress() {
        let platform = InMemoryPlatform::new();
        platform.add_stack("stackB");
        let guid = platform.add_app("appA", "stackA", AppState::Started);
        platform.fail_next(OpKind::SetCurrentDroplet);
        let mut progress = StepProgress::default();

        let failure = run_sequence(
            &platform,
            &poller(),
            &plan(&guid, MigrationStep::RestoreState),
            &mut progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(failure.step, MigrationStep::SwapDroplet);
        assert_eq!(progress.last_completed, Some(MigrationStep::Stage));
        assert!(progress.previous_droplet.is_some());
        assert!(progress.staged_droplet.is_some());
    }

    #[tokio::test]
    async fn rerun_resumes_after_last_completed_step() {
        let platform = InMemoryPlatform::new();
        platform.add_stack("stackB");
        let guid = platform.add_app("appA", "stackA", AppState::Started);
        platform.fail_next(OpKind::SetCurrentDroplet);
        let plan = plan(&guid, MigrationStep::RestoreState);
        let mut progress = StepProgress::default();

        run_sequence(&platform, &poller(), &plan, &mut progress, &CancellationToken::new())
            .await
            .unwrap_err();
        platform.clear_operations();
        run_sequence(&platform, &poller(), &plan, &mut progress, &CancellationToken::new())
            .await
            .unwrap();

        let kinds: Vec<OpKind> = platform.mutations().iter().map(PlatformOp::kind).collect();
        assert_eq!(kinds, vec![OpKind::SetCurrentDroplet, OpKind::Restart]);
        assert_eq!(progress.last_completed, Some(MigrationStep::RestoreState));
    }

    #[tokio::test]
    async fn cancelled_before_start_touches_nothing() {
        let platform = InMemoryPlatform::new();
        let guid = platform.add_app("appA", "stackA", AppState::Started);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut progress = StepProgress::default();

        let failure = run_sequence(
            &platform,
            &poller(),
            &plan(&guid, MigrationStep::RestoreState),
            &mut progress,
            &cancel,
        )
        .await
        .unwrap_err();

        assert_eq!(failure.step, MigrationStep::AssignStack);
        assert!(failure.error.is_cancelled());
        assert!(platform.operations().is_empty());
    }
}
