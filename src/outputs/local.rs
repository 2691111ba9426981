//! Local file-based output sink.
//!
//! Outputs are written as one JSON file per deployment under a directory,
//! `.armdeploy` in the current directory by default.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ArmDeployError, OutputError, Result};

use super::sink::{outputs_file_name, OutputSink, PersistedOutputs};

/// Default outputs directory name.
pub const OUTPUTS_DIR: &str = ".armdeploy";

/// Local file-based output sink.
#[derive(Debug)]
pub struct LocalOutputSink {
    /// Directory holding output files.
    base_dir: PathBuf,
}

impl LocalOutputSink {
    /// Creates a sink writing to `.armdeploy` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| ArmDeployError::internal(format!("Cannot determine current directory: {e}")))?
            .join(OUTPUTS_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a sink writing to a custom directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Path of the outputs file for a deployment.
    #[must_use]
    pub fn outputs_path(&self, deployment_id: &str) -> PathBuf {
        self.base_dir.join(outputs_file_name(deployment_id))
    }

    fn write_failed(path: &std::path::Path, message: String) -> ArmDeployError {
        ArmDeployError::Outputs(OutputError::WriteFailed {
            path: path.to_path_buf(),
            message,
        })
    }
}

#[async_trait]
impl OutputSink for LocalOutputSink {
    async fn write_outputs(
        &self,
        deployment_id: &str,
        outputs: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating outputs directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| Self::write_failed(&self.base_dir, format!("Failed to create directory: {e}")))?;
        }

        let path = self.outputs_path(deployment_id);
        info!("Writing outputs to: {}", path.display());

        let record = PersistedOutputs::new(deployment_id, outputs);
        let content = serde_json::to_string_pretty(&record)
            .map_err(|e| OutputError::serialization(format!("Failed to serialize outputs: {e}")))?;

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Self::write_failed(&temp_path, format!("Failed to create temp file: {e}")))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Self::write_failed(&temp_path, format!("Failed to write: {e}")))?;

        file.sync_all()
            .await
            .map_err(|e| Self::write_failed(&temp_path, format!("Failed to sync: {e}")))?;

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Self::write_failed(&path, format!("Failed to rename: {e}")))?;

        debug!("Outputs saved successfully");
        Ok(())
    }

    async fn read_outputs(&self, deployment_id: &str) -> Result<Option<PersistedOutputs>> {
        let path = self.outputs_path(deployment_id);
        if !path.exists() {
            debug!("Outputs file does not exist: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await.map_err(|e| OutputError::Corrupted {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;

        let record: PersistedOutputs =
            serde_json::from_str(&content).map_err(|e| OutputError::Corrupted {
                message: format!("Failed to parse {}: {e}", path.display()),
            })?;

        Ok(Some(record))
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_sink() -> (LocalOutputSink, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let sink = LocalOutputSink::with_base_dir(temp_dir.path().join("outputs"));
        (sink, temp_dir)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (sink, _temp) = create_test_sink();

        let mut outputs = serde_json::Map::new();
        outputs.insert(String::from("endpoint"), serde_json::json!("https://web"));
        sink.write_outputs("web", &outputs).await.expect("Failed to write outputs");

        let record = sink
            .read_outputs("web")
            .await
            .expect("Failed to read outputs")
            .expect("Outputs should exist");

        assert_eq!(record.deployment, "web");
        assert_eq!(record.outputs["endpoint"], "https://web");
        assert!(!sink.outputs_path("web").with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_read_missing() {
        let (sink, _temp) = create_test_sink();

        let result = sink.read_outputs("web").await.expect("Read should not fail");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_corrupted_file() {
        let (sink, temp) = create_test_sink();
        std::fs::create_dir_all(temp.path().join("outputs")).expect("mkdir");
        std::fs::write(sink.outputs_path("web"), "not json").expect("write");

        let result = sink.read_outputs("web").await;
        assert!(matches!(
            result,
            Err(ArmDeployError::Outputs(OutputError::Corrupted { .. }))
        ));
    }
}
