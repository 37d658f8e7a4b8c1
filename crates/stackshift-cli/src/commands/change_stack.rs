//! Change-stack command - move an application to another stack.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;
use stackshift_core::platform::http::HttpPlatform;
use stackshift_core::{
    MigrationConfig, MigrationReport, MigrationRequest, RollbackPolicy, StackMigrator,
};
use tokio_util::sync::CancellationToken;

use crate::{Config, OutputFormat};

/// Arguments for the change-stack command.
#[derive(Debug, Args)]
pub struct ChangeStackArgs {
    /// Name of the application to move.
    #[arg()]
    pub app_name: String,

    /// Name of the stack to move it to.
    #[arg()]
    pub stack: String,

    /// Restart with a rolling deployment instead of stop-then-start.
    #[arg(long, visible_alias = "v3")]
    pub zero_downtime: bool,

    /// Seconds between build status checks.
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Seconds to wait for staging before giving up (0 waits forever).
    #[arg(long, value_name = "SECS")]
    pub build_timeout: Option<u64>,

    /// How a failed migration restores the original droplet.
    #[arg(long, value_enum)]
    pub rollback_policy: Option<RollbackPolicyArg>,
}

/// Rollback policy flag values.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum RollbackPolicyArg {
    /// Reuse the droplet the application ran before.
    RestorePreviousDroplet,
    /// Re-stage the original package on the source stack.
    Rebuild,
}

impl From<RollbackPolicyArg> for RollbackPolicy {
    fn from(arg: RollbackPolicyArg) -> Self {
        match arg {
            RollbackPolicyArg::RestorePreviousDroplet => Self::RestorePreviousDroplet,
            RollbackPolicyArg::Rebuild => Self::Rebuild,
        }
    }
}

impl ChangeStackArgs {
    /// Applies flag overrides on top of `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `--poll-interval` is zero.
    pub fn migration_config(&self, base: MigrationConfig) -> Result<MigrationConfig> {
        let mut config = base;
        if let Some(secs) = self.poll_interval {
            anyhow::ensure!(secs > 0, "--poll-interval must be greater than zero");
            config = config.with_poll_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.build_timeout {
            config = config.with_build_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        }
        if let Some(policy) = self.rollback_policy {
            config = config.with_rollback_policy(policy.into());
        }
        Ok(config)
    }

    fn request(&self) -> MigrationRequest {
        MigrationRequest::new(&self.app_name, &self.stack).with_zero_downtime(self.zero_downtime)
    }
}

/// Execute the change-stack command.
///
/// # Errors
///
/// Returns an error if settings are invalid, the migration fails, or the
/// operation is interrupted.
pub async fn execute(args: ChangeStackArgs, config: &Config) -> Result<()> {
    let base = MigrationConfig::from_env().context("Invalid migration settings in environment")?;
    let migration_config = args.migration_config(base)?;
    let platform = HttpPlatform::new(&config.platform_config())
        .context("Failed to create platform client")?;
    let migrator = StackMigrator::new(Arc::new(platform), migration_config);

    if matches!(config.format, OutputFormat::Text) {
        println!(
            "Attempting to change stack to {} for {}...",
            args.stack.bold(),
            args.app_name.bold()
        );
    }

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));
    let result = migrator.migrate(&args.request(), &cancel).await;
    interrupt.abort();

    let report = result?;
    print_report(&report, config)
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupt received, cancelling migration");
        cancel.cancel();
    }
}

fn print_report(report: &MigrationReport, config: &Config) -> Result<()> {
    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!("{}", report.message().green());
            println!();
            println!("  App:      {} ({})", report.app_name, report.app_guid);
            println!("  Stack:    {} -> {}", report.source_stack, report.target_stack);
            println!("  State:    {}", report.state);
            if let Some(restart) = report.restart {
                println!("  Restart:  {restart}");
            }
            if let Some(droplet) = &report.droplet {
                println!("  Droplet:  {droplet}");
            }
            let elapsed = report.finished_at - report.started_at;
            println!("  Elapsed:  {}ms", elapsed.num_milliseconds());
        }
    }
    Ok(())
}
