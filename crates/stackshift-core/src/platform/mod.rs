//! Platform client abstraction.
//!
//! This module provides:
//!
//! - [`Platform`]: the resource operations the migrator needs
//! - [`http::HttpPlatform`]: client for the platform's v3 REST API
//! - [`memory::InMemoryPlatform`]: simulated platform for tests
//!
//! Implementations are stateless with respect to migrations; every
//! operation is a single request against one resource.

pub mod http;
pub mod memory;
pub mod wire;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Application, Build, Droplet, PlatformVersion, RestartStrategy, Stack};

/// Resource operations against the hosting platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Looks up an application by name.
    ///
    /// Returns `NotFound` if no application has that name in scope.
    async fn find_app(&self, name: &str) -> Result<Application>;

    /// Looks up a stack by name.
    ///
    /// Returns `NotFound` if the stack does not exist.
    async fn find_stack(&self, name: &str) -> Result<Stack>;

    /// Sets the stack in the application's lifecycle metadata.
    ///
    /// This does not affect the droplet that is currently running.
    async fn set_app_stack(&self, app_guid: &str, stack: &str) -> Result<()>;

    /// Returns the droplet the application's current-droplet pointer references.
    async fn current_droplet(&self, app_guid: &str) -> Result<Droplet>;

    /// Submits a new build of a package. The build uses the owning
    /// application's lifecycle stack at the time of submission.
    async fn create_build(&self, package_guid: &str) -> Result<Build>;

    /// Fetches the current state of a build.
    async fn get_build(&self, build_guid: &str) -> Result<Build>;

    /// Points the application's current-droplet relationship at a droplet.
    async fn set_current_droplet(&self, app_guid: &str, droplet_guid: &str) -> Result<()>;

    /// Restarts the application onto its current droplet.
    async fn restart_app(&self, app_guid: &str, strategy: RestartStrategy) -> Result<()>;

    /// Starts the application.
    async fn start_app(&self, app_guid: &str) -> Result<()>;

    /// Stops the application.
    async fn stop_app(&self, app_guid: &str) -> Result<()>;

    /// Returns the platform's API version.
    async fn api_version(&self) -> Result<PlatformVersion>;
}
