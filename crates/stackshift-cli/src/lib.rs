//! # stackshift-cli
//!
//! Command-line interface for moving applications between stacks.
//!
//! ## Commands
//!
//! - `stackshift change-stack APP STACK` - Rebuild an application on a new
//!   stack, rolling back if any step fails
//!
//! ## Configuration
//!
//! The CLI uses environment variables or command-line flags for settings:
//!
//! - `STACKSHIFT_API_URL` - Platform API endpoint
//! - `STACKSHIFT_API_TOKEN` - Bearer token
//! - `STACKSHIFT_SPACE_GUID` - Space to look applications up in
//! - `STACKSHIFT_POLL_INTERVAL_SECS`, `STACKSHIFT_BUILD_TIMEOUT_SECS`,
//!   `STACKSHIFT_ROLLBACK_POLICY` - Migration defaults, overridden by flags

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use clap::{Parser, Subcommand};
use stackshift_core::observability::LogFormat;
use stackshift_core::platform::http::PlatformConfig;

/// Stackshift - move applications between stacks without losing state.
#[derive(Debug, Parser)]
#[command(name = "stackshift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Platform API URL.
    #[arg(long, env = "STACKSHIFT_API_URL")]
    pub api_url: String,

    /// API authentication token.
    #[arg(long, env = "STACKSHIFT_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Space GUID applications are looked up in.
    #[arg(long, env = "STACKSHIFT_SPACE_GUID")]
    pub space_guid: Option<String>,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Log format (logs are written to stderr).
    #[arg(long, default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            api_url: self.api_url.clone(),
            api_token: self.api_token.clone(),
            space_guid: self.space_guid.clone(),
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Move an application to another stack.
    ChangeStack(commands::change_stack::ChangeStackArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable logs.
    #[default]
    Pretty,
    /// JSON structured logs.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Platform API URL.
    pub api_url: String,
    /// API authentication token.
    pub api_token: Option<String>,
    /// Space GUID for application lookups.
    pub space_guid: Option<String>,
    /// Output format.
    pub format: OutputFormat,
}

impl Config {
    /// Builds the platform client settings.
    #[must_use]
    pub fn platform_config(&self) -> PlatformConfig {
        let mut platform = PlatformConfig::new(&self.api_url);
        if let Some(token) = &self.api_token {
            platform = platform.with_token(token);
        }
        if let Some(space) = &self.space_guid {
            platform = platform.with_space(space);
        }
        platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_from_flags() {
        let cli = Cli::parse_from([
            "stackshift",
            "--api-url",
            "https://api.example.com",
            "--api-token",
            "token-abc",
            "--space-guid",
            "space-123",
            "--format",
            "json",
            "change-stack",
            "appA",
            "stackB",
        ]);

        let config = cli.config();
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.api_token.as_deref(), Some("token-abc"));
        assert_eq!(config.space_guid.as_deref(), Some("space-123"));
        assert!(matches!(config.format, OutputFormat::Json));

        let platform = config.platform_config();
        assert_eq!(platform.token.as_deref(), Some("token-abc"));
        assert_eq!(platform.space_guid.as_deref(), Some("space-123"));
    }

    #[test]
    fn test_log_format_maps_to_core() {
        let cli = Cli::parse_from([
            "stackshift",
            "--api-url",
            "https://api.example.com",
            "--log-format",
            "json",
            "change-stack",
            "appA",
            "stackB",
        ]);
        assert_eq!(LogFormat::from(cli.log_format), LogFormat::Json);
    }
}
