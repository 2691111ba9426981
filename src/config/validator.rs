//! Configuration validation for deployment configs.
//!
//! This module checks a parsed configuration before any remote call is made,
//! collecting every error and warning it finds.

use crate::error::{ArmDeployError, ConfigError, Result};
use tracing::debug;
use uuid::Uuid;

use super::spec::{
    DeployConfig, DeploymentConfig, OutputBackend, OutputsConfig, PollingConfig, RetryConfig,
    RoleAssignmentConfig,
};

/// Maximum length of an ARM deployment name.
const MAX_DEPLOYMENT_NAME_LEN: usize = 64;

/// Maximum length of a resource group name.
const MAX_RESOURCE_GROUP_LEN: usize = 90;

/// Path segment identifying a fully qualified role definition ID.
const ROLE_DEFINITION_SEGMENT: &str = "/providers/Microsoft.Authorization/roleDefinitions/";

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found if validation fails.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_deployment(&config.deployment, &mut result);
        Self::validate_role_assignments(&config.role_assignments, &mut result);
        Self::validate_retry(&config.retry, &mut result);
        Self::validate_polling(&config.polling, &mut result);
        Self::validate_outputs(&config.outputs, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(ArmDeployError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates the deployment target.
    fn validate_deployment(deployment: &DeploymentConfig, result: &mut ValidationResult) {
        if deployment.name.trim().is_empty() {
            result.push_error("deployment.name", "Deployment name cannot be empty");
        } else if !is_valid_deployment_name(&deployment.name) {
            result.push_error(
                "deployment.name",
                format!(
                    "Deployment name '{}' is invalid. Use up to {MAX_DEPLOYMENT_NAME_LEN} letters, digits, '-', '_', '.', '(' or ')'.",
                    deployment.name
                ),
            );
        }

        if deployment.subscription.trim().is_empty() {
            result.push_error("deployment.subscription", "Subscription cannot be empty");
        } else if Uuid::parse_str(&deployment.subscription).is_err() {
            result.push_error(
                "deployment.subscription",
                format!("Subscription '{}' is not a GUID", deployment.subscription),
            );
        }

        if deployment.location.trim().is_empty() {
            result.push_error("deployment.location", "Location cannot be empty");
        } else if !deployment
            .location
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            result.warnings.push(format!(
                "deployment.location: '{}' is not a canonical location name (e.g. 'westeurope')",
                deployment.location
            ));
        }

        if let Some(resource_group) = &deployment.resource_group {
            if !is_valid_resource_group_name(resource_group) {
                result.push_error(
                    "deployment.resource_group",
                    format!("Resource group name '{resource_group}' is invalid"),
                );
            }
        }

        if deployment.template.trim().is_empty() {
            result.push_error("deployment.template", "Template path cannot be empty");
        }
    }

    /// Validates prerequisite role assignments.
    fn validate_role_assignments(assignments: &[RoleAssignmentConfig], result: &mut ValidationResult) {
        for (i, assignment) in assignments.iter().enumerate() {
            let prefix = format!("role_assignments[{i}]");

            if Uuid::parse_str(&assignment.principal_id).is_err() {
                result.push_error(
                    format!("{prefix}.principal_id"),
                    format!("Principal ID '{}' is not a GUID", assignment.principal_id),
                );
            }

            if !is_valid_role_definition(&assignment.role_definition_id) {
                result.push_error(
                    format!("{prefix}.role_definition_id"),
                    format!(
                        "Role definition '{}' must be a GUID or a full role definition ID",
                        assignment.role_definition_id
                    ),
                );
            }

            if let Some(scope) = assignment.scope.as_deref().filter(|s| !s.starts_with('/')) {
                result.push_error(
                    format!("{prefix}.scope"),
                    format!("Scope '{scope}' must be a resource ID starting with '/'"),
                );
            }
        }
    }

    /// Validates the retry policy.
    fn validate_retry(retry: &RetryConfig, result: &mut ValidationResult) {
        if retry.max_attempts == 0 {
            result.push_error("retry.max_attempts", "Retry budget must allow at least 1 attempt");
        }

        if retry.interval_secs == 0 {
            result
                .warnings
                .push(String::from("retry.interval_secs: 0 retries without any delay"));
        }
    }

    /// Validates the polling cadence.
    fn validate_polling(polling: &PollingConfig, result: &mut ValidationResult) {
        if polling.interval_ms == 0 {
            result.push_error("polling.interval_ms", "Polling interval must be greater than 0");
        }

        if polling.timeout_secs == Some(0) {
            result.push_error("polling.timeout_secs", "Polling timeout must be greater than 0");
        }
    }

    /// Validates the output sink.
    fn validate_outputs(outputs: &OutputsConfig, result: &mut ValidationResult) {
        match outputs.backend {
            OutputBackend::S3 => {
                if outputs.bucket.as_ref().is_none_or(String::is_empty) {
                    result.push_error(
                        "outputs.bucket",
                        "S3 bucket name is required when using the S3 backend",
                    );
                }
            }
            OutputBackend::Local => {}
        }
    }
}

impl ValidationResult {
    /// Returns true if there are no validation errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Checks an ARM deployment name.
fn is_valid_deployment_name(name: &str) -> bool {
    name.len() <= MAX_DEPLOYMENT_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')'))
}

/// Checks a resource group name.
fn is_valid_resource_group_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_RESOURCE_GROUP_LEN
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')'))
}

/// Accepts a bare role GUID or a full role definition resource ID.
fn is_valid_role_definition(role: &str) -> bool {
    let guid = role
        .rsplit_once(ROLE_DEFINITION_SEGMENT)
        .map_or(role, |(_, guid)| guid);
    Uuid::parse_str(guid).is_ok()
}
