//! Configuration module for armdeploy.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `armdeploy.yaml`
//! - Loading the ARM template it references
//! - Validation of configuration values
//! - Hashing for template tags and assignment identifiers

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    DeployConfig, DeploymentConfig, DeploymentMode, OutputBackend, OutputsConfig, PollingConfig,
    PrincipalType, RetryConfig, RoleAssignmentConfig,
};
pub use parser::{find_config_file, ConfigParser, LoadedTemplate, ACCESS_TOKEN_VAR, ENDPOINT_VAR};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
