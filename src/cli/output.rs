//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use indexmap::IndexMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::arm::{DeploymentStatus, RoleAssignment};
use crate::config::ValidationResult;
use crate::orchestrator::DeploymentOutcome;
use crate::outputs::PersistedOutputs;
use crate::tracker::{OperationState, OrderedStatusView};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Resource row for table display.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// Output value row for table display.
#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Output")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a configuration validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid\n", "✓".green());
                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                } else if !result.warnings.is_empty() {
                    let _ = writeln!(
                        output,
                        "   {} warning(s), use --warnings to show them",
                        result.warnings.len()
                    );
                }
                output
            }
        }
    }

    /// Formats the outcome of a successful deployment.
    #[must_use]
    pub fn format_outcome(&self, outcome: &DeploymentOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!(
                    "\n{} Deployment {} {} in {:.1}s\n",
                    "✓".green(),
                    outcome.deployment_id.bold(),
                    outcome.provisioning_state.to_lowercase().green(),
                    outcome.elapsed_secs
                );
                let _ = writeln!(output, "   Resource group: {}", outcome.container_id);
                let _ = writeln!(
                    output,
                    "   Resources: {} succeeded",
                    outcome.resources.count(OperationState::Succeeded)
                );

                if !outcome.outputs.is_empty() {
                    output.push('\n');
                    output.push_str(&Self::outputs_table(&outcome.outputs));
                }

                output
            }
        }
    }

    /// Formats a failed run with its per-resource errors.
    #[must_use]
    pub fn format_failure(
        &self,
        deployment: &str,
        reason: &str,
        errors: &IndexMap<String, String>,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "status": "failed",
                    "deployment": deployment,
                    "reason": reason,
                    "errors": errors,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!(
                    "\n{} Deployment {} failed: {reason}\n",
                    "✗".red(),
                    deployment.bold()
                );
                if !errors.is_empty() {
                    let _ = write!(output, "\n{} Failed resources:\n", "⚠".yellow());
                    for (resource, message) in errors {
                        let _ = writeln!(output, "   - {}: {message}", short_resource_name(resource));
                    }
                }
                output
            }
        }
    }

    /// Formats the status of an existing deployment.
    #[must_use]
    pub fn format_status(&self, status: &DeploymentStatus) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&StatusJson::from(status)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_status_text(status),
        }
    }

    /// Formats status as text.
    fn format_status_text(status: &DeploymentStatus) -> String {
        let mut output = String::new();

        let _ = write!(
            output,
            "\nDeployment: {}\n   Resource group: {}\n\n",
            status.deployment_id.bold(),
            status.container_id
        );

        if status.view.is_empty() {
            output.push_str("   No operations reported.\n");
            return output;
        }

        output.push_str(&Self::resources_table(&status.view));
        output.push('\n');

        let summary = if status.has_errors() {
            "failed".red().to_string()
        } else if status.is_complete() {
            "complete".green().to_string()
        } else {
            "in progress".yellow().to_string()
        };

        let _ = write!(
            output,
            "\nStatus: {summary} ({} succeeded, {} running, {} pending, {} failed)\n",
            status.succeeded, status.running, status.pending, status.failed
        );

        output
    }

    /// Formats persisted deployment outputs.
    #[must_use]
    pub fn format_outputs(&self, outputs: &PersistedOutputs) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outputs).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!(
                    "\nOutputs of {} (recorded {})\n\n",
                    outputs.deployment.bold(),
                    outputs.recorded_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                if outputs.outputs.is_empty() {
                    output.push_str("   No outputs.\n");
                } else {
                    output.push_str(&Self::outputs_table(&outputs.outputs));
                }
                output
            }
        }
    }

    /// Formats a created role assignment.
    #[must_use]
    pub fn format_role_assignment(&self, assignment: &RoleAssignment) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(assignment).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("{} Role assignment {}\n", "✓".green(), assignment.name);
                let _ = writeln!(output, "   Principal: {}", assignment.properties.principal_id);
                let _ = writeln!(
                    output,
                    "   Role: {}",
                    short_resource_name(&assignment.properties.role_definition_id)
                );
                if let Some(scope) = &assignment.properties.scope {
                    let _ = writeln!(output, "   Scope: {scope}");
                }
                output
            }
        }
    }

    /// Builds the resource table of a status view.
    fn resources_table(view: &OrderedStatusView) -> String {
        let rows: Vec<ResourceRow> = view
            .iter()
            .map(|r| ResourceRow {
                state: Self::format_state(r.state),
                resource_type: r.resource_type.clone(),
                resource: Self::truncate(short_resource_name(&r.resource_id), 40),
                error: r
                    .error
                    .as_deref()
                    .map(|e| Self::truncate(e, 50))
                    .unwrap_or_default(),
            })
            .collect();

        Table::new(rows).to_string()
    }

    /// Builds the table of deployment outputs.
    fn outputs_table(outputs: &serde_json::Map<String, serde_json::Value>) -> String {
        let rows: Vec<OutputRow> = outputs
            .iter()
            .map(|(name, value)| OutputRow {
                name: name.clone(),
                value: match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            })
            .collect();

        let mut table = Table::new(rows).to_string();
        table.push('\n');
        table
    }

    /// Formats an operation state with color.
    fn format_state(state: OperationState) -> String {
        let label = format!("{} {state}", state.symbol());
        match state {
            OperationState::Succeeded => label.green().to_string(),
            OperationState::Running => label.yellow().to_string(),
            OperationState::Pending => label.dimmed().to_string(),
            OperationState::Failed => label.red().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &"✓".green().to_string(), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &"✗".red().to_string(), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &"⚠".yellow().to_string(), message)
    }

    fn message(&self, status: &str, symbol: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{symbol} {message}"),
        }
    }
}

/// Last segment of an ARM resource ID.
fn short_resource_name(resource_id: &str) -> &str {
    resource_id
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(resource_id)
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct StatusJson<'a> {
    deployment: &'a str,
    resource_group: &'a str,
    succeeded: usize,
    running: usize,
    pending: usize,
    failed: usize,
    complete: bool,
    resources: &'a OrderedStatusView,
    errors: &'a IndexMap<String, String>,
}

impl<'a> From<&'a DeploymentStatus> for StatusJson<'a> {
    fn from(status: &'a DeploymentStatus) -> Self {
        Self {
            deployment: &status.deployment_id,
            resource_group: &status.container_id,
            succeeded: status.succeeded,
            running: status.running,
            pending: status.pending,
            failed: status.failed,
            complete: status.is_complete(),
            resources: &status.view,
            errors: &status.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{OperationStatusTracker, SubOperation};

    fn sample_view() -> (OrderedStatusView, IndexMap<String, String>) {
        let mut tracker = OperationStatusTracker::new();
        tracker.observe(&[
            SubOperation::new("/rg/providers/x/a", "Microsoft.Web/sites", OperationState::Succeeded),
            SubOperation::new("/rg/providers/x/b", "Microsoft.Sql/servers", OperationState::Failed)
                .with_error("quota exceeded"),
        ]);
        (tracker.view(), tracker.collect_errors())
    }

    fn sample_status() -> DeploymentStatus {
        let (view, errors) = sample_view();
        DeploymentStatus {
            container_id: String::from("/subscriptions/s/resourceGroups/rg"),
            deployment_id: String::from("web"),
            succeeded: 1,
            running: 0,
            pending: 0,
            failed: 1,
            view,
            errors,
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("a-very-long-name", 8), "a-ver...");
    }

    #[test]
    fn test_short_resource_name() {
        assert_eq!(short_resource_name("/subscriptions/s/resourceGroups/rg"), "rg");
        assert_eq!(short_resource_name("plain"), "plain");
    }

    #[test]
    fn test_status_text_lists_resources() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_status(&sample_status());

        assert!(text.contains("quota exceeded"));
        assert!(text.contains("Microsoft.Web/sites"));
        assert!(text.contains("1 succeeded"));
    }

    #[test]
    fn test_status_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_status(&sample_status())).unwrap();

        assert_eq!(json["deployment"], "web");
        assert_eq!(json["failed"], 1);
        assert_eq!(json["complete"], false);
        assert_eq!(json["errors"]["/rg/providers/x/b"], "quota exceeded");
    }

    #[test]
    fn test_failure_json_keeps_errors() {
        let (_, errors) = sample_view();
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_failure("web", "rejected", &errors)).unwrap();

        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "rejected");
        assert_eq!(json["errors"]["/rg/providers/x/b"], "quota exceeded");
    }

    #[test]
    fn test_outputs_text() {
        let mut values = serde_json::Map::new();
        values.insert(String::from("endpoint"), serde_json::json!("https://web.example.net"));
        values.insert(String::from("port"), serde_json::json!(443));
        let persisted = PersistedOutputs::new("web", &values);

        let text = OutputFormatter::new(OutputFormat::Text).format_outputs(&persisted);

        assert!(text.contains("https://web.example.net"));
        assert!(text.contains("443"));
    }

    #[test]
    fn test_message_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value = serde_json::from_str(&formatter.warning("careful")).unwrap();

        assert_eq!(json["status"], "warning");
        assert_eq!(json["message"], "careful");
    }
}
