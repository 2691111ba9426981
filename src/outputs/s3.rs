//! S3-based output sink.
//!
//! Outputs are stored as `<prefix><deployment>.outputs.json` objects so other
//! pipelines can pick them up.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{OutputError, Result};

use super::sink::{outputs_file_name, OutputSink, PersistedOutputs};

/// S3-based output sink.
#[derive(Debug)]
pub struct S3OutputSink {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix, empty or ending with `/`.
    prefix: String,
}

impl S3OutputSink {
    /// Creates a new S3 output sink.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Self {
        let config = match region {
            Some(region) => {
                aws_config::from_env()
                    .region(aws_config::Region::new(region.to_string()))
                    .load()
                    .await
            }
            None => aws_config::load_from_env().await,
        };

        Self::with_client(Client::new(&config), bucket, prefix)
    }

    /// Creates a new S3 output sink with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
        }
    }

    /// Gets the full S3 key for a deployment.
    #[must_use]
    pub fn key(&self, deployment_id: &str) -> String {
        format!("{}{}", self.prefix, outputs_file_name(deployment_id))
    }
}

/// Trims slashes and appends a single trailing `/` to a non-empty prefix.
fn normalize_prefix(prefix: Option<&str>) -> String {
    prefix
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .map(|p| format!("{p}/"))
        .unwrap_or_default()
}

#[async_trait]
impl OutputSink for S3OutputSink {
    async fn write_outputs(
        &self,
        deployment_id: &str,
        outputs: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let key = self.key(deployment_id);
        info!("Writing outputs to s3://{}/{key}", self.bucket);

        let record = PersistedOutputs::new(deployment_id, outputs);
        let content = serde_json::to_vec_pretty(&record)
            .map_err(|e| OutputError::serialization(format!("Failed to serialize outputs: {e}")))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(content.into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| OutputError::s3(format!("S3 put error: {e}")))?;

        debug!("Outputs uploaded successfully");
        Ok(())
    }

    async fn read_outputs(&self, deployment_id: &str) -> Result<Option<PersistedOutputs>> {
        let key = self.key(deployment_id);
        debug!("Reading outputs from s3://{}/{key}", self.bucket);

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    return Ok(None);
                }
                return Err(OutputError::s3(format!("S3 get error: {service_err}")).into());
            }
        };

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| OutputError::s3(format!("Failed to read S3 object: {e}")))?;

        let record: PersistedOutputs =
            serde_json::from_slice(&bytes.into_bytes()).map_err(|e| OutputError::Corrupted {
                message: format!("Failed to parse s3://{}/{key}: {e}", self.bucket),
            })?;

        Ok(Some(record))
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_normalization() {
        assert_eq!(normalize_prefix(None), "");
        assert_eq!(normalize_prefix(Some("/")), "");
        assert_eq!(normalize_prefix(Some("/web/prod/")), "web/prod/");
        assert_eq!(normalize_prefix(Some("web")), "web/");
    }
}
