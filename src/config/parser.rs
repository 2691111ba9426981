//! Configuration parser for loading configuration and templates.
//!
//! This module handles loading configuration from YAML files, environment
//! variables and `.env` files, and reading the ARM template the configuration
//! points at.

use crate::error::{ArmDeployError, ConfigError, Result};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::DeployConfig;

/// Environment variable holding the ARM bearer token.
pub const ACCESS_TOKEN_VAR: &str = "ARM_ACCESS_TOKEN";

/// Environment variable overriding the ARM endpoint.
pub const ENDPOINT_VAR: &str = "ARM_ENDPOINT";

/// Configuration parser for loading deployment configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

/// An ARM template loaded from disk.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    /// Where the template was read from.
    pub path: PathBuf,
    /// The template document.
    pub document: serde_json::Value,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ArmDeployError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ArmDeployError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ArmDeployError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed configuration for deployment: {}", config.deployment.name);
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognized variables: `ARMDEPLOY_DEPLOYMENT_NAME`, `ARMDEPLOY_SUBSCRIPTION`,
    /// `ARMDEPLOY_LOCATION`, `ARMDEPLOY_RESOURCE_GROUP`, `ARMDEPLOY_OUTPUTS_BUCKET`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut DeployConfig) {
        if let Ok(name) = std::env::var("ARMDEPLOY_DEPLOYMENT_NAME") {
            debug!("Overriding deployment.name from environment");
            config.deployment.name = name;
        }

        if let Ok(subscription) = std::env::var("ARMDEPLOY_SUBSCRIPTION") {
            debug!("Overriding deployment.subscription from environment");
            config.deployment.subscription = subscription;
        }

        if let Ok(location) = std::env::var("ARMDEPLOY_LOCATION") {
            debug!("Overriding deployment.location from environment");
            config.deployment.location = location;
        }

        if let Ok(resource_group) = std::env::var("ARMDEPLOY_RESOURCE_GROUP") {
            debug!("Overriding deployment.resource_group from environment");
            config.deployment.resource_group = Some(resource_group);
        }

        if let Ok(bucket) = std::env::var("ARMDEPLOY_OUTPUTS_BUCKET") {
            debug!("Overriding outputs.bucket from environment");
            config.outputs.bucket = Some(bucket);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ArmDeployError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Resolves a path from the configuration against the base path.
    #[must_use]
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let path = Path::new(relative);
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Loads the ARM template referenced by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is missing, is not JSON, or is not an object.
    pub fn load_template(&self, config: &DeployConfig) -> Result<LoadedTemplate> {
        let path = self.resolve(&config.deployment.template);
        debug!("Loading template from: {}", path.display());

        let content = std::fs::read_to_string(&path).map_err(|e| {
            ArmDeployError::Config(ConfigError::InvalidTemplate {
                path: path.clone(),
                message: format!("Failed to read template: {e}"),
            })
        })?;

        let document: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            ArmDeployError::Config(ConfigError::InvalidTemplate {
                path: path.clone(),
                message: format!("Template is not valid JSON: {e}"),
            })
        })?;

        if !document.is_object() {
            return Err(ArmDeployError::Config(ConfigError::InvalidTemplate {
                path,
                message: String::from("Template must be a JSON object"),
            }));
        }

        Ok(LoadedTemplate { path, document })
    }

    /// Gets the ARM bearer token from environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set.
    pub fn get_access_token() -> Result<SecretString> {
        std::env::var(ACCESS_TOKEN_VAR)
            .map(SecretString::from)
            .map_err(|_| {
                ArmDeployError::Config(ConfigError::MissingEnvVar {
                    name: String::from(ACCESS_TOKEN_VAR),
                })
            })
    }

    /// Gets the ARM endpoint override from environment (optional).
    #[must_use]
    pub fn get_endpoint() -> Option<String> {
        std::env::var(ENDPOINT_VAR).ok()
    }
}

impl LoadedTemplate {
    /// Number of top-level resources the template declares.
    ///
    /// ARM also accepts `resources` as an object keyed by symbolic name.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        match self.document.get("resources") {
            Some(serde_json::Value::Array(resources)) => resources.len(),
            Some(serde_json::Value::Object(resources)) => resources.len(),
            _ => 0,
        }
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["armdeploy.yaml", "armdeploy.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ArmDeployError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploymentMode, OutputBackend, PrincipalType};
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
deployment:
  name: web-stack
  subscription: 00000000-0000-0000-0000-000000000000
  location: westeurope
  template: main.json
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.deployment.name, "web-stack");
        assert!(config.role_assignments.is_empty());
        assert_eq!(config.retry.max_attempts, 36);
        assert_eq!(config.polling.interval_ms, 200);
        assert_eq!(config.outputs.backend, OutputBackend::Local);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
deployment:
  name: web-stack
  subscription: 00000000-0000-0000-0000-000000000000
  location: westeurope
  resource_group: web-rg
  template: ./main.json
  mode: complete
  parameters:
    sku: B1
    instances: 2
  tags:
    team: web

role_assignments:
  - principal_id: 11111111-1111-1111-1111-111111111111
    role_definition_id: b24988ac-6180-42a0-ab88-20f7382dd24c
    principal_type: User

retry:
  interval_secs: 2
  max_attempts: 10
  settle_secs: 1

polling:
  interval_ms: 500
  timeout_secs: 3600

outputs:
  backend: s3
  bucket: deploy-outputs
  prefix: web/prod
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();

        assert_eq!(config.deployment.resource_group_name(), "web-rg");
        assert_eq!(config.deployment.mode, DeploymentMode::Complete);
        assert_eq!(config.deployment.parameters.len(), 2);
        assert_eq!(config.role_assignments[0].principal_type, PrincipalType::User);
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.polling.timeout_secs, Some(3600));
        assert_eq!(config.outputs.bucket.as_deref(), Some("deploy-outputs"));
    }

    #[test]
    fn test_load_template_counts_resources() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("main.json"),
            r#"{"resources": [{"type": "a"}, {"type": "b"}], "outputs": {}}"#,
        )
        .unwrap();

        let yaml = r"
deployment:
  name: web-stack
  subscription: sub
  location: westeurope
  template: main.json
";
        let parser = ConfigParser::new().with_base_path(dir.path());
        let config = parser.parse_yaml(yaml, None).unwrap();
        let template = parser.load_template(&config).unwrap();

        assert_eq!(template.resource_count(), 2);
    }

    #[test]
    fn test_load_template_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.json"), "[1, 2]").unwrap();

        let yaml = r"
deployment:
  name: web-stack
  subscription: sub
  location: westeurope
  template: main.json
";
        let parser = ConfigParser::new().with_base_path(dir.path());
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert!(matches!(
            parser.load_template(&config),
            Err(ArmDeployError::Config(ConfigError::InvalidTemplate { .. }))
        ));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("armdeploy.yaml"), "").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("armdeploy.yaml"));
    }
}
