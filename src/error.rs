//! Error types for the armdeploy provisioning system.
//!
//! This module provides the error hierarchy for every stage of a deployment run:
//! configuration, the ARM control plane, orchestration, and output persistence.

use indexmap::IndexMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for armdeploy.
#[derive(Debug, Error)]
pub enum ArmDeployError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// ARM control plane errors.
    #[error("ARM API error: {0}")]
    Arm(#[from] ArmError),

    /// Deployment orchestration errors.
    #[error("Deployment error: {0}")]
    Orchestration(#[from] OrchestrationError),

    /// Output persistence errors.
    #[error("Output error: {0}")]
    Outputs(#[from] OutputError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// The deployment template could not be loaded.
    #[error("Invalid deployment template {path}: {message}")]
    InvalidTemplate {
        /// Path to the template.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },
}

/// ARM control plane errors.
#[derive(Debug, Error)]
pub enum ArmError {
    /// The bearer token was rejected.
    #[error("ARM authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("ARM request failed: {status} {code} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// ARM error code (e.g. `PrincipalNotFound`).
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Rate limited.
    #[error("ARM API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Resource not found.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Path of the missing resource.
        resource: String,
    },

    /// The deployment reached a failed or canceled provisioning state.
    #[error("Deployment {deployment} ended in state {state}: {message}")]
    DeploymentRejected {
        /// Deployment name.
        deployment: String,
        /// Terminal provisioning state reported by ARM.
        state: String,
        /// Error message reported by ARM.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with ARM: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from ARM: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Errors raised while driving a deployment run.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Submission input was malformed. No remote call was made.
    #[error("Invalid submission: {field} {message}")]
    Validation {
        /// Offending input field.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// A propagation-sensitive operation never succeeded within its attempt budget.
    #[error("{operation} did not succeed after {attempts} attempts: {last_error}")]
    PropagationTimeout {
        /// Operation being retried.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last error observed.
        #[source]
        last_error: Box<ArmDeployError>,
    },

    /// The target container could not be created or updated.
    #[error("Failed to provision {container}: {source}")]
    Provisioning {
        /// Container (resource group) name.
        container: String,
        /// Underlying failure.
        #[source]
        source: Box<ArmDeployError>,
    },

    /// The deployment was rejected by the control plane.
    #[error("Deployment {deployment} failed: {reason}{}", format_resource_errors(.errors))]
    DeploymentFailed {
        /// Deployment name.
        deployment: String,
        /// Overall rejection reason.
        reason: String,
        /// Failed resources and their first reported error.
        errors: IndexMap<String, String>,
    },

    /// Polling exceeded the configured timeout.
    #[error("Deployment {deployment} still running after {elapsed_secs}s")]
    PollTimeout {
        /// Deployment name.
        deployment: String,
        /// Seconds spent polling.
        elapsed_secs: u64,
    },

    /// The run was cancelled while polling.
    #[error("Deployment {deployment} tracking was cancelled")]
    Cancelled {
        /// Deployment name.
        deployment: String,
    },

    /// A run tried to leave a terminal phase or skip a phase.
    #[error("Invalid run transition from {from} to {to}")]
    InvalidTransition {
        /// Current phase.
        from: String,
        /// Requested phase.
        to: String,
    },
}

/// Output persistence errors.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Writing to the local filesystem failed.
    #[error("Failed to write outputs to {path}: {message}")]
    WriteFailed {
        /// Target path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Persisted outputs are unreadable.
    #[error("Outputs are corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// S3 backend error.
    #[error("S3 output backend error: {message}")]
    S3Error {
        /// Description of the S3 error.
        message: String,
    },

    /// Serialization error.
    #[error("Output serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Result type alias for armdeploy operations.
pub type Result<T> = std::result::Result<T, ArmDeployError>;

fn format_resource_errors(errors: &IndexMap<String, String>) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = errors
        .iter()
        .map(|(resource, message)| format!("\n  - {resource}: {message}"))
        .collect();
    lines.concat()
}

impl ArmDeployError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the per-resource failures if this is a rejected deployment.
    #[must_use]
    pub const fn resource_errors(&self) -> Option<&IndexMap<String, String>> {
        match self {
            Self::Orchestration(OrchestrationError::DeploymentFailed { errors, .. }) => Some(errors),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl ArmError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl OrchestrationError {
    /// Creates a submission validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl OutputError {
    /// Creates an S3 error with the given message.
    #[must_use]
    pub fn s3(message: impl Into<String>) -> Self {
        Self::S3Error {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_failed_lists_resources() {
        let mut errors = IndexMap::new();
        errors.insert(String::from("/vm/b"), String::from("quota exceeded"));

        let err = ArmDeployError::from(OrchestrationError::DeploymentFailed {
            deployment: String::from("web"),
            reason: String::from("Conflict"),
            errors,
        });

        let text = err.to_string();
        assert!(text.contains("Deployment web failed: Conflict"));
        assert!(text.contains("/vm/b: quota exceeded"));
        assert_eq!(err.resource_errors().map(IndexMap::len), Some(1));
    }

    #[test]
    fn test_propagation_timeout_keeps_last_error() {
        let err = OrchestrationError::PropagationTimeout {
            operation: String::from("role assignment"),
            attempts: 36,
            last_error: Box::new(ArmError::api_error(400, "PrincipalNotFound", "not yet").into()),
        };

        assert!(err.to_string().contains("36 attempts"));
        assert!(err.to_string().contains("PrincipalNotFound"));
    }
}
