//! Configuration specification types for armdeploy.
//!
//! This module defines the structs that map to the `armdeploy.yaml` file.
//! They describe one deployment: where it goes, what template it applies,
//! which roles must exist first, and how the run is paced.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// The root configuration structure for an armdeploy project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// Deployment target and template.
    pub deployment: DeploymentConfig,
    /// Role assignments that must exist before the deployment is submitted.
    #[serde(default)]
    pub role_assignments: Vec<RoleAssignmentConfig>,
    /// Retry policy for propagation-sensitive operations.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Polling cadence for deployment progress.
    #[serde(default)]
    pub polling: PollingConfig,
    /// Where deployment outputs are persisted.
    #[serde(default)]
    pub outputs: OutputsConfig,
}

/// Deployment target and template configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentConfig {
    /// Deployment name (also the default resource group name).
    pub name: String,
    /// Subscription ID.
    pub subscription: String,
    /// Azure location of the resource group (e.g. "westeurope").
    pub location: String,
    /// Resource group name; defaults to the deployment name.
    #[serde(default)]
    pub resource_group: Option<String>,
    /// Path to the ARM template, relative to the configuration file.
    pub template: String,
    /// Deployment mode.
    #[serde(default)]
    pub mode: DeploymentMode,
    /// Template parameter values.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Tags applied to the resource group.
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// ARM deployment modes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Leave resources not in the template untouched.
    #[default]
    Incremental,
    /// Delete resources not in the template.
    Complete,
}

/// A role that must be granted before the deployment runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleAssignmentConfig {
    /// Object ID of the principal receiving the role.
    pub principal_id: String,
    /// Role definition GUID or full role definition resource ID.
    pub role_definition_id: String,
    /// Principal type hint for ARM.
    #[serde(default)]
    pub principal_type: PrincipalType,
    /// Assignment scope; defaults to the resource group.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Principal kinds accepted by the role assignment API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PrincipalType {
    /// Service principal or managed identity.
    #[default]
    ServicePrincipal,
    /// Directory user.
    User,
    /// Directory group.
    Group,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Seconds between attempts.
    #[serde(default = "default_retry_interval")]
    pub interval_secs: u64,
    /// Maximum number of attempts.
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    /// Seconds to wait after a success before depending on it.
    #[serde(default = "default_settle")]
    pub settle_secs: u64,
}

/// Polling configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    /// Milliseconds between sub-operation listings.
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    /// Optional bound on the polling phase. Unbounded when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Output sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OutputsConfig {
    /// Backend type (local or s3).
    #[serde(default)]
    pub backend: OutputBackend,
    /// Local directory for the local backend.
    #[serde(default)]
    pub path: Option<String>,
    /// S3 bucket name (required for the s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix.
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (uses the AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
}

/// Output backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    /// Local file-based outputs.
    #[default]
    Local,
    /// AWS S3-based outputs.
    S3,
}

// Default value functions

const fn default_retry_interval() -> u64 {
    5
}

const fn default_retry_attempts() -> u32 {
    36
}

const fn default_settle() -> u64 {
    5
}

const fn default_poll_interval() -> u64 {
    200
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_retry_interval(),
            max_attempts: default_retry_attempts(),
            settle_secs: default_settle(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            timeout_secs: None,
        }
    }
}

impl DeploymentConfig {
    /// Returns the resource group name, falling back to the deployment name.
    #[must_use]
    pub fn resource_group_name(&self) -> &str {
        self.resource_group
            .as_deref()
            .filter(|rg| !rg.is_empty())
            .unwrap_or(&self.name)
    }
}

impl RetryConfig {
    /// Converts this configuration into a retry policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(self.interval_secs),
            self.max_attempts,
            Duration::from_secs(self.settle_secs),
        )
    }
}

impl PollingConfig {
    /// Returns the tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns the optional polling bound.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self {
            Self::Incremental => "Incremental",
            Self::Complete => "Complete",
        };
        write!(f, "{mode}")
    }
}

impl std::fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::ServicePrincipal => "ServicePrincipal",
            Self::User => "User",
            Self::Group => "Group",
        };
        write!(f, "{kind}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_group_defaults_to_name() {
        let yaml = r"
name: web-stack
subscription: sub
location: westeurope
template: main.json
";
        let deployment: DeploymentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(deployment.resource_group_name(), "web-stack");
        assert_eq!(deployment.mode, DeploymentMode::Incremental);
    }

    #[test]
    fn test_retry_defaults_match_role_assignment_budget() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy, RetryPolicy::ROLE_ASSIGNMENT);
    }

    #[test]
    fn test_polling_defaults() {
        let polling = PollingConfig::default();
        assert_eq!(polling.interval(), Duration::from_millis(200));
        assert!(polling.timeout().is_none());
    }
}
