//! In-memory platform implementation for testing.
//!
//! [`InMemoryPlatform`] simulates the resources the migrator touches:
//! stacks, applications, packages, builds and droplets. Every call is
//! recorded as a [`PlatformOp`] for later assertion, and failures can be
//! injected per operation kind.
//!
//! ## Simulation rules
//!
//! - A build uses the owning application's lifecycle stack at the moment it
//!   is created, and produces a droplet bound to that stack.
//! - Builds stay `STAGING` for a configurable number of polls.
//! - Restart and start make the current droplet the running droplet; stop
//!   clears it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ulid::Ulid;

use super::Platform;
use crate::error::{Error, Result};
use crate::model::{
    AppState, Application, Build, BuildState, Droplet, PlatformVersion, RestartStrategy, Stack,
};

/// Space GUID given to applications added without one.
pub const DEFAULT_SPACE_GUID: &str = "space-guid";

/// Operation kinds, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// [`Platform::find_app`].
    FindApp,
    /// [`Platform::find_stack`].
    FindStack,
    /// [`Platform::set_app_stack`].
    SetAppStack,
    /// [`Platform::current_droplet`].
    CurrentDroplet,
    /// [`Platform::create_build`].
    CreateBuild,
    /// [`Platform::get_build`].
    GetBuild,
    /// [`Platform::set_current_droplet`].
    SetCurrentDroplet,
    /// [`Platform::restart_app`].
    Restart,
    /// [`Platform::start_app`].
    Start,
    /// [`Platform::stop_app`].
    Stop,
    /// [`Platform::api_version`].
    ApiVersion,
}

/// Record of a platform call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformOp {
    /// Application lookup.
    FindApp {
        /// Name looked up.
        name: String,
    },
    /// Stack lookup.
    FindStack {
        /// Name looked up.
        name: String,
    },
    /// Lifecycle stack assignment.
    SetAppStack {
        /// Target application.
        app_guid: String,
        /// Stack assigned.
        stack: String,
    },
    /// Current droplet read.
    CurrentDroplet {
        /// Target application.
        app_guid: String,
    },
    /// Build submission.
    CreateBuild {
        /// Package built.
        package_guid: String,
    },
    /// Build status read.
    GetBuild {
        /// Build polled.
        build_guid: String,
    },
    /// Current droplet assignment.
    SetCurrentDroplet {
        /// Target application.
        app_guid: String,
        /// Droplet assigned.
        droplet_guid: String,
    },
    /// Restart.
    Restart {
        /// Target application.
        app_guid: String,
        /// Strategy used.
        strategy: RestartStrategy,
    },
    /// Start.
    Start {
        /// Target application.
        app_guid: String,
    },
    /// Stop.
    Stop {
        /// Target application.
        app_guid: String,
    },
    /// API version read.
    ApiVersion,
}

impl PlatformOp {
    /// Returns the kind of this operation.
    #[must_use]
    pub const fn kind(&self) -> OpKind {
        match self {
            Self::FindApp { .. } => OpKind::FindApp,
            Self::FindStack { .. } => OpKind::FindStack,
            Self::SetAppStack { .. } => OpKind::SetAppStack,
            Self::CurrentDroplet { .. } => OpKind::CurrentDroplet,
            Self::CreateBuild { .. } => OpKind::CreateBuild,
            Self::GetBuild { .. } => OpKind::GetBuild,
            Self::SetCurrentDroplet { .. } => OpKind::SetCurrentDroplet,
            Self::Restart { .. } => OpKind::Restart,
            Self::Start { .. } => OpKind::Start,
            Self::Stop { .. } => OpKind::Stop,
            Self::ApiVersion => OpKind::ApiVersion,
        }
    }

    /// Returns true if the operation changes platform state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::SetAppStack { .. }
                | Self::CreateBuild { .. }
                | Self::SetCurrentDroplet { .. }
                | Self::Restart { .. }
                | Self::Start { .. }
                | Self::Stop { .. }
        )
    }
}

/// Point-in-time view of an application for assertions.
#[derive(Debug, Clone)]
pub struct AppSnapshot {
    /// The application record.
    pub app: Application,
    /// The droplet the current-droplet pointer references.
    pub current_droplet: Option<Droplet>,
    /// The droplet instances are running, if started.
    pub running_droplet: Option<String>,
}

#[derive(Debug)]
struct AppRecord {
    app: Application,
    current_droplet: Option<String>,
    running_droplet: Option<String>,
}

#[derive(Debug)]
struct BuildRecord {
    build: Build,
    stack: String,
    package_guid: String,
    polls_remaining: u32,
}

#[derive(Debug)]
struct InjectedFailure {
    kind: OpKind,
    /// Matching calls to let through before failing.
    skip: u32,
    /// `None` fails every call.
    remaining: Option<u32>,
}

/// Internal state protected by a single lock.
#[derive(Debug)]
struct PlatformState {
    stacks: BTreeMap<String, Stack>,
    apps: HashMap<String, AppRecord>,
    packages: HashMap<String, String>,
    droplets: HashMap<String, Droplet>,
    builds: HashMap<String, BuildRecord>,
    version: PlatformVersion,
    staging_polls: u32,
    failing_stacks: HashSet<String>,
    stalled: bool,
    failures: Vec<InjectedFailure>,
    operations: Vec<PlatformOp>,
}

impl Default for PlatformState {
    fn default() -> Self {
        Self {
            stacks: BTreeMap::new(),
            apps: HashMap::new(),
            packages: HashMap::new(),
            droplets: HashMap::new(),
            builds: HashMap::new(),
            version: PlatformVersion::new(3, 102, 0),
            staging_polls: 1,
            failing_stacks: HashSet::new(),
            stalled: false,
            failures: Vec::new(),
            operations: Vec::new(),
        }
    }
}

impl PlatformState {
    /// Records `op` and returns an injected failure if one matches.
    fn record(&mut self, op: PlatformOp) -> Result<()> {
        let kind = op.kind();
        self.operations.push(op);

        let Some(idx) = self.failures.iter().position(|f| f.kind == kind) else {
            return Ok(());
        };
        if self.failures[idx].skip > 0 {
            self.failures[idx].skip -= 1;
            return Ok(());
        }
        let exhausted = match &mut self.failures[idx].remaining {
            None => false,
            Some(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
        };
        if exhausted {
            self.failures.remove(idx);
        }
        Err(Error::api(500, format!("injected failure: {kind:?}")))
    }

    fn app_mut(&mut self, app_guid: &str) -> Result<&mut AppRecord> {
        self.apps
            .get_mut(app_guid)
            .ok_or_else(|| Error::not_found("application", app_guid))
    }

    fn resolve_build(&mut self, build_guid: &str) -> Result<Build> {
        let stalled = self.stalled;
        let record = self
            .builds
            .get_mut(build_guid)
            .ok_or_else(|| Error::not_found("build", build_guid))?;

        if record.build.state.is_terminal() || stalled {
            return Ok(record.build.clone());
        }
        if record.polls_remaining > 0 {
            record.polls_remaining -= 1;
            return Ok(record.build.clone());
        }

        if self.failing_stacks.contains(&record.stack) {
            record.build.state = BuildState::Failed;
            record.build.error = Some(format!(
                "BuildpackCompileFailed: no buildpack supports stack {}",
                record.stack
            ));
        } else {
            let droplet = Droplet {
                guid: new_guid("droplet"),
                stack: Some(record.stack.clone()),
                package_guid: record.package_guid.clone(),
            };
            record.build.state = BuildState::Staged;
            record.build.droplet_guid = Some(droplet.guid.clone());
            self.droplets.insert(droplet.guid.clone(), droplet);
        }
        Ok(record.build.clone())
    }
}

fn new_guid(prefix: &str) -> String {
    format!("{prefix}-{}", Ulid::new().to_string().to_lowercase())
}

/// Converts a lock poison error to a transport error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Transport {
        message: "in-memory platform lock poisoned".to_string(),
        source: None,
    }
}

/// Simulated platform for tests.
///
/// ## Example
///
/// ```rust
/// use stackshift_core::model::AppState;
/// use stackshift_core::platform::memory::InMemoryPlatform;
///
/// let platform = InMemoryPlatform::new();
/// platform.add_stack("stackB");
/// let guid = platform.add_app("appA", "stackA", AppState::Started);
/// assert!(guid.starts_with("app-"));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    /// Creates an empty platform reporting API version `3.102.0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reported API version.
    #[must_use]
    pub fn with_version(self, version: PlatformVersion) -> Self {
        self.lock().version = version;
        self
    }

    /// Sets how many polls a build stays `STAGING` before resolving.
    #[must_use]
    pub fn with_staging_polls(self, polls: u32) -> Self {
        self.lock().staging_polls = polls;
        self
    }

    fn lock(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a stack, returning its GUID. Adding an existing stack is a no-op.
    pub fn add_stack(&self, name: &str) -> String {
        let mut state = self.lock();
        state
            .stacks
            .entry(name.to_string())
            .or_insert_with(|| Stack {
                guid: new_guid("stack"),
                name: name.to_string(),
            })
            .guid
            .clone()
    }

    /// Adds an application with a package and a droplet staged on `stack`.
    ///
    /// The stack is created if it does not exist. Returns the app GUID.
    pub fn add_app(&self, name: &str, stack: &str, state: AppState) -> String {
        self.add_app_in_space(name, stack, state, DEFAULT_SPACE_GUID)
    }

    /// Adds an application in a specific space.
    pub fn add_app_in_space(
        &self,
        name: &str,
        stack: &str,
        app_state: AppState,
        space_guid: &str,
    ) -> String {
        self.add_stack(stack);

        let app_guid = new_guid("app");
        let package_guid = new_guid("package");
        let droplet = Droplet {
            guid: new_guid("droplet"),
            stack: Some(stack.to_string()),
            package_guid: package_guid.clone(),
        };

        let mut state = self.lock();
        state.packages.insert(package_guid, app_guid.clone());
        let running = (app_state == AppState::Started).then(|| droplet.guid.clone());
        state.apps.insert(
            app_guid.clone(),
            AppRecord {
                app: Application {
                    guid: app_guid.clone(),
                    name: name.to_string(),
                    state: app_state,
                    stack: stack.to_string(),
                    space_guid: space_guid.to_string(),
                },
                current_droplet: Some(droplet.guid.clone()),
                running_droplet: running,
            },
        );
        state.droplets.insert(droplet.guid.clone(), droplet);
        app_guid
    }

    /// Makes every build against `stack` end in `FAILED`.
    pub fn fail_builds_on_stack(&self, stack: &str) {
        self.lock().failing_stacks.insert(stack.to_string());
    }

    /// Keeps every build in `STAGING` forever.
    pub fn stall_builds(&self) {
        self.lock().stalled = true;
    }

    /// Fails the next call of `kind`.
    pub fn fail_next(&self, kind: OpKind) {
        self.fail_times(kind, 1);
    }

    /// Fails the next `times` calls of `kind`.
    pub fn fail_times(&self, kind: OpKind, times: u32) {
        if times == 0 {
            return;
        }
        self.lock().failures.push(InjectedFailure {
            kind,
            skip: 0,
            remaining: Some(times),
        });
    }

    /// Lets `skip` calls of `kind` succeed, then fails the one after.
    pub fn fail_after(&self, kind: OpKind, skip: u32) {
        self.lock().failures.push(InjectedFailure {
            kind,
            skip,
            remaining: Some(1),
        });
    }

    /// Fails every call of `kind`.
    pub fn fail_always(&self, kind: OpKind) {
        self.lock().failures.push(InjectedFailure {
            kind,
            skip: 0,
            remaining: None,
        });
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<PlatformOp> {
        self.lock().operations.clone()
    }

    /// Returns the recorded operations that change platform state.
    #[must_use]
    pub fn mutations(&self) -> Vec<PlatformOp> {
        self.lock()
            .operations
            .iter()
            .filter(|op| op.is_mutation())
            .cloned()
            .collect()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Returns a snapshot of the named application.
    #[must_use]
    pub fn app(&self, name: &str) -> Option<AppSnapshot> {
        let state = self.lock();
        let record = state.apps.values().find(|r| r.app.name == name)?;
        Some(AppSnapshot {
            app: record.app.clone(),
            current_droplet: record
                .current_droplet
                .as_ref()
                .and_then(|guid| state.droplets.get(guid))
                .cloned(),
            running_droplet: record.running_droplet.clone(),
        })
    }
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn find_app(&self, name: &str) -> Result<Application> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::FindApp {
            name: name.to_string(),
        })?;
        state
            .apps
            .values()
            .find(|r| r.app.name == name)
            .map(|r| r.app.clone())
            .ok_or_else(|| Error::not_found("application", name))
    }

    async fn find_stack(&self, name: &str) -> Result<Stack> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::FindStack {
            name: name.to_string(),
        })?;
        state
            .stacks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("stack", name))
    }

    async fn set_app_stack(&self, app_guid: &str, stack: &str) -> Result<()> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::SetAppStack {
            app_guid: app_guid.to_string(),
            stack: stack.to_string(),
        })?;
        if !state.stacks.contains_key(stack) {
            return Err(Error::api(422, format!("Stack '{stack}' does not exist")));
        }
        state.app_mut(app_guid)?.app.stack = stack.to_string();
        Ok(())
    }

    async fn current_droplet(&self, app_guid: &str) -> Result<Droplet> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::CurrentDroplet {
            app_guid: app_guid.to_string(),
        })?;
        let record = state.app_mut(app_guid)?;
        let guid = record
            .current_droplet
            .clone()
            .ok_or_else(|| Error::not_found("droplet", app_guid))?;
        state
            .droplets
            .get(&guid)
            .cloned()
            .ok_or_else(|| Error::not_found("droplet", guid))
    }

    async fn create_build(&self, package_guid: &str) -> Result<Build> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::CreateBuild {
            package_guid: package_guid.to_string(),
        })?;
        let app_guid = state
            .packages
            .get(package_guid)
            .cloned()
            .ok_or_else(|| Error::not_found("package", package_guid))?;
        let stack = state.app_mut(&app_guid)?.app.stack.clone();

        let build = Build {
            guid: new_guid("build"),
            state: BuildState::Staging,
            droplet_guid: None,
            error: None,
            created_at: Some(chrono::Utc::now()),
        };
        let polls_remaining = state.staging_polls;
        state.builds.insert(
            build.guid.clone(),
            BuildRecord {
                build: build.clone(),
                stack,
                package_guid: package_guid.to_string(),
                polls_remaining,
            },
        );
        Ok(build)
    }

    async fn get_build(&self, build_guid: &str) -> Result<Build> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::GetBuild {
            build_guid: build_guid.to_string(),
        })?;
        state.resolve_build(build_guid)
    }

    async fn set_current_droplet(&self, app_guid: &str, droplet_guid: &str) -> Result<()> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::SetCurrentDroplet {
            app_guid: app_guid.to_string(),
            droplet_guid: droplet_guid.to_string(),
        })?;
        if !state.droplets.contains_key(droplet_guid) {
            return Err(Error::not_found("droplet", droplet_guid));
        }
        state.app_mut(app_guid)?.current_droplet = Some(droplet_guid.to_string());
        Ok(())
    }

    async fn restart_app(&self, app_guid: &str, strategy: RestartStrategy) -> Result<()> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::Restart {
            app_guid: app_guid.to_string(),
            strategy,
        })?;
        let record = state.app_mut(app_guid)?;
        record.app.state = AppState::Started;
        record.running_droplet.clone_from(&record.current_droplet);
        Ok(())
    }

    async fn start_app(&self, app_guid: &str) -> Result<()> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::Start {
            app_guid: app_guid.to_string(),
        })?;
        let record = state.app_mut(app_guid)?;
        record.app.state = AppState::Started;
        record.running_droplet.clone_from(&record.current_droplet);
        Ok(())
    }

    async fn stop_app(&self, app_guid: &str) -> Result<()> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::Stop {
            app_guid: app_guid.to_string(),
        })?;
        let record = state.app_mut(app_guid)?;
        record.app.state = AppState::Stopped;
        record.running_droplet = None;
        Ok(())
    }

    async fn api_version(&self) -> Result<PlatformVersion> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.record(PlatformOp::ApiVersion)?;
        Ok(state.version)
    }
}
