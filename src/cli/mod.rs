//! CLI module for armdeploy.
//!
//! This module provides the command-line interface for submitting
//! ARM deployments and inspecting their progress.

mod commands;
mod output;
mod presenter;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, PrincipalKind};
pub use output::OutputFormatter;
pub use presenter::{render_frame, TerminalPresenter};
