//! # stackshift-core
//!
//! Moves applications on a hosting platform from one stack to another
//! without losing their running state.
//!
//! This crate provides:
//!
//! - **Platform Client**: the [`Platform`] trait with HTTP and in-memory
//!   implementations
//! - **Build Poller**: bounded, cancellable waiting for builds
//! - **Migration Orchestrator**: [`StackMigrator`], which sequences stack
//!   assignment, staging, droplet swap, restart and state restore
//! - **Rollback Coordinator**: returns an application to its source stack
//!   when a step fails
//! - **Error Types**: one [`Error`] enum attributing failures to a step
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use stackshift_core::platform::memory::InMemoryPlatform;
//! use stackshift_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let platform = Arc::new(InMemoryPlatform::new().with_staging_polls(0));
//! platform.add_stack("stackB");
//! platform.add_app("appA", "stackA", AppState::Started);
//!
//! let migrator = StackMigrator::new(platform, MigrationConfig::default());
//! let report = migrator
//!     .migrate(&MigrationRequest::new("appA", "stackB"), &CancellationToken::new())
//!     .await
//!     .unwrap();
//! assert_eq!(report.target_stack, "stackB");
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod migration;
pub mod model;
pub mod observability;
pub mod platform;
pub mod poller;
pub mod strategy;

pub use config::{MigrationConfig, RollbackPolicy};
pub use error::{Error, Result, RollbackOutcome};
pub use migration::{MigrationReport, MigrationRequest, StackMigrator};
pub use platform::Platform;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use stackshift_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{MigrationConfig, RollbackPolicy};
    pub use crate::error::{Error, Result, RollbackOutcome};
    pub use crate::migration::attempt::MigrationStep;
    pub use crate::migration::{MigrationReport, MigrationRequest, StackMigrator};
    pub use crate::model::{AppState, PlatformVersion, RestartStrategy};
    pub use crate::platform::Platform;
    pub use tokio_util::sync::CancellationToken;
}
