//! Stackshift CLI - moves applications between stacks.
//!
//! The main entry point for the `stackshift` CLI binary.

use anyhow::Result;
use clap::Parser;

use stackshift_cli::{Cli, Commands};
use stackshift_core::observability::init_logging_with_default;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    let config = cli.config();

    init_logging_with_default(cli.log_format.into(), "warn");

    // Create runtime and execute
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::ChangeStack(args) => {
                stackshift_cli::commands::change_stack::execute(args, &config).await
            }
        }
    })
}
