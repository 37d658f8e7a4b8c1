//! Build completion polling.
//!
//! [`BuildPoller`] checks a build at a fixed interval until it leaves
//! `STAGING`. The wait is bounded by an optional deadline and wakes early
//! when the caller's cancellation token fires.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::migration::attempt::MigrationStep;
use crate::model::BuildState;
use crate::platform::Platform;

/// Waits for builds to reach a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPoller {
    interval: Duration,
    timeout: Option<Duration>,
}

impl BuildPoller {
    /// Creates a poller. A `timeout` of `None` waits indefinitely.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    /// Creates a poller from migration settings.
    #[must_use]
    pub const fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.poll_interval, config.build_timeout)
    }

    /// Polls `build_guid` until it is `STAGED`, returning the droplet GUID.
    ///
    /// # Errors
    ///
    /// - `BuildFailed` if the build ends in `FAILED`, or is `STAGED` without
    ///   a droplet
    /// - `BuildTimedOut` if the build is still `STAGING` at the deadline
    /// - `Cancelled` if `cancel` fires while waiting
    /// - any error from [`Platform::get_build`]
    #[tracing::instrument(skip(self, platform, cancel), fields(interval = ?self.interval))]
    pub async fn await_build(
        &self,
        platform: &dyn Platform,
        build_guid: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        // A timeout too large to represent as an instant is no bound at all.
        let deadline = self.timeout.and_then(|t| Instant::now().checked_add(t));
        let mut polls: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    step: MigrationStep::Stage,
                });
            }

            let build = platform.get_build(build_guid).await?;
            polls = polls.saturating_add(1);

            match build.state {
                BuildState::Staged => {
                    tracing::debug!(polls, "build staged");
                    return build.droplet_guid.ok_or_else(|| Error::BuildFailed {
                        build_id: build_guid.to_string(),
                        reason: "build staged without producing a droplet".to_string(),
                    });
                }
                BuildState::Failed => {
                    return Err(Error::BuildFailed {
                        build_id: build_guid.to_string(),
                        reason: build
                            .error
                            .unwrap_or_else(|| "no reason reported".to_string()),
                    });
                }
                BuildState::Staging => {
                    tracing::debug!(polls, "build still staging");
                }
            }

            let wait = match (deadline, self.timeout) {
                (Some(deadline), Some(timeout)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::BuildTimedOut {
                            build_id: build_guid.to_string(),
                            timeout,
                        });
                    }
                    self.interval.min(deadline - now)
                }
                _ => self.interval,
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(Error::Cancelled { step: MigrationStep::Stage });
                }
                () = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppState;
    use crate::platform::memory::{InMemoryPlatform, OpKind};

    async fn submit(platform: &InMemoryPlatform) -> String {
        let app_guid = platform.add_app("appA", "stackA", AppState::Started);
        let droplet = platform.current_droplet(&app_guid).await.unwrap();
        platform
            .create_build(&droplet.package_guid)
            .await
            .unwrap()
            .guid
    }

    fn fast(timeout: Option<Duration>) -> BuildPoller {
        BuildPoller::new(Duration::from_millis(1), timeout)
    }

    #[tokio::test]
    async fn returns_droplet_once_staged() {
        let platform = InMemoryPlatform::new().with_staging_polls(3);
        let build = submit(&platform).await;

        let droplet = fast(None)
            .await_build(&platform, &build, &CancellationToken::new())
            .await
            .unwrap();

        assert!(droplet.starts_with("droplet-"));
        let polls = platform
            .operations()
            .iter()
            .filter(|op| op.kind() == OpKind::GetBuild)
            .count();
        assert_eq!(polls, 4);
    }

    #[tokio::test]
    async fn failed_build_names_build_and_reason() {
        let platform = InMemoryPlatform::new();
        platform.fail_builds_on_stack("stackA");
        let build = submit(&platform).await;

        let err = fast(None)
            .await_build(&platform, &build, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::BuildFailed { build_id, reason } => {
                assert_eq!(build_id, build);
                assert!(reason.contains("stackA"));
            }
            other => panic!("expected BuildFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stuck_build_times_out() {
        let platform = InMemoryPlatform::new();
        platform.stall_builds();
        let build = submit(&platform).await;

        let err = fast(Some(Duration::from_millis(30)))
            .await_build(&platform, &build, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BuildTimedOut { .. }));
    }

    #[tokio::test]
    async fn unrepresentable_timeout_waits_without_deadline() {
        let platform = InMemoryPlatform::new().with_staging_polls(2);
        let build = submit(&platform).await;

        let droplet = fast(Some(Duration::from_secs(u64::MAX)))
            .await_build(&platform, &build, &CancellationToken::new())
            .await
            .unwrap();

        assert!(droplet.starts_with("droplet-"));
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let platform = InMemoryPlatform::new();
        platform.stall_builds();
        let build = submit(&platform).await;
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = BuildPoller::new(Duration::from_secs(60), None)
            .await_build(&platform, &build, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn poll_errors_propagate() {
        let platform = InMemoryPlatform::new();
        let build = submit(&platform).await;
        platform.fail_next(OpKind::GetBuild);

        let err = fast(None)
            .await_build(&platform, &build, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { status: 500, .. }));
    }
}
