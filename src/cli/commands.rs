//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::PrincipalType;

/// armdeploy - Submit ARM deployments and track them to completion.
#[derive(Parser, Debug)]
#[command(name = "armdeploy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "ARMDEPLOY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration and the template it references.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Provision the resource group, grant roles and run the deployment.
    Deploy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the sub-operations of the configured deployment.
    Status,

    /// Create a single role assignment, retrying while the principal propagates.
    AssignRole {
        /// Scope of the assignment (resource ID).
        #[arg(long)]
        scope: String,

        /// Object ID of the principal.
        #[arg(long)]
        principal_id: String,

        /// Role definition GUID or full role definition ID.
        #[arg(long)]
        role: String,

        /// Principal type.
        #[arg(long, default_value = "service-principal")]
        principal_type: PrincipalKind,
    },

    /// Print the outputs recorded by the last successful deployment.
    Outputs,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Principal type as accepted on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PrincipalKind {
    /// Service principal or managed identity.
    #[default]
    ServicePrincipal,
    /// Directory user.
    User,
    /// Directory group.
    Group,
}

impl From<PrincipalKind> for PrincipalType {
    fn from(kind: PrincipalKind) -> Self {
        match kind {
            PrincipalKind::ServicePrincipal => Self::ServicePrincipal,
            PrincipalKind::User => Self::User,
            PrincipalKind::Group => Self::Group,
        }
    }
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assign_role() {
        let cli = Cli::parse_from([
            "armdeploy",
            "assign-role",
            "--scope",
            "/subscriptions/s",
            "--principal-id",
            "p",
            "--role",
            "r",
            "--principal-type",
            "user",
        ]);

        match cli.command {
            Commands::AssignRole { principal_type, .. } => {
                assert_eq!(PrincipalType::from(principal_type), PrincipalType::User);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["armdeploy", "deploy", "--yes", "--output", "json", "-v"]);

        assert!(cli.verbose);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(matches!(cli.command, Commands::Deploy { yes: true }));
    }
}
