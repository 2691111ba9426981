//! Deployment output persistence.
//!
//! When a deployment succeeds its outputs (endpoints, keys, generated names)
//! are handed to an [`OutputSink`], either a local JSON file or an S3 object.

mod sink;
mod local;
mod s3;

pub use sink::{outputs_file_name, OutputSink, PersistedOutputs};
pub use local::{LocalOutputSink, OUTPUTS_DIR};
pub use s3::S3OutputSink;

use std::path::Path;
use tracing::debug;

use crate::config::{OutputBackend, OutputsConfig};
use crate::error::{ConfigError, Result};

/// Creates the output sink described by the configuration.
///
/// A relative local path is resolved against `base_dir`.
///
/// # Errors
///
/// Returns an error if the S3 backend is selected without a bucket.
pub async fn create_output_sink(
    config: &OutputsConfig,
    base_dir: &Path,
) -> Result<Box<dyn OutputSink>> {
    match config.backend {
        OutputBackend::Local => {
            let dir = config.path.as_deref().unwrap_or(OUTPUTS_DIR);
            let dir = base_dir.join(dir);
            debug!("Using local output sink at {}", dir.display());
            Ok(Box::new(LocalOutputSink::with_base_dir(dir)))
        }
        OutputBackend::S3 => {
            let bucket = config
                .bucket
                .as_deref()
                .filter(|b| !b.is_empty())
                .ok_or_else(|| {
                    ConfigError::validation("S3 bucket name is required", "outputs.bucket")
                })?;
            debug!("Using S3 output sink in bucket {bucket}");
            let sink =
                S3OutputSink::new(bucket, config.prefix.as_deref(), config.region.as_deref()).await;
            Ok(Box::new(sink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_sink_resolves_against_base() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let config = OutputsConfig {
            path: Some(String::from("out")),
            ..OutputsConfig::default()
        };

        let sink = create_output_sink(&config, temp.path()).await.expect("sink");
        assert_eq!(sink.backend_type(), "local");

        sink.write_outputs("web", &serde_json::Map::new())
            .await
            .expect("write");
        assert!(temp.path().join("out").join("web.outputs.json").exists());
    }

    #[tokio::test]
    async fn test_s3_sink_requires_bucket() {
        let config = OutputsConfig {
            backend: OutputBackend::S3,
            ..OutputsConfig::default()
        };

        assert!(create_output_sink(&config, Path::new(".")).await.is_err());
    }
}
