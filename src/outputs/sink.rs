//! Output sink trait definition.
//!
//! This module defines the common interface for deployment output backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outputs of one successful deployment, as persisted by a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedOutputs {
    /// Deployment name.
    pub deployment: String,
    /// When the outputs were recorded.
    pub recorded_at: DateTime<Utc>,
    /// Output values keyed by output name.
    pub outputs: serde_json::Map<String, serde_json::Value>,
}

impl PersistedOutputs {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(deployment: &str, outputs: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            deployment: deployment.to_string(),
            recorded_at: Utc::now(),
            outputs: outputs.clone(),
        }
    }
}

/// Trait for deployment output backends.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Persists the outputs of a successful deployment.
    async fn write_outputs(
        &self,
        deployment_id: &str,
        outputs: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()>;

    /// Reads the last persisted outputs of a deployment.
    ///
    /// Returns `None` if nothing was recorded yet.
    async fn read_outputs(&self, deployment_id: &str) -> Result<Option<PersistedOutputs>>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl OutputSink for Box<dyn OutputSink> {
    async fn write_outputs(
        &self,
        deployment_id: &str,
        outputs: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        (**self).write_outputs(deployment_id, outputs).await
    }

    async fn read_outputs(&self, deployment_id: &str) -> Result<Option<PersistedOutputs>> {
        (**self).read_outputs(deployment_id).await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}

/// File name used for a deployment's outputs.
#[must_use]
pub fn outputs_file_name(deployment_id: &str) -> String {
    format!("{deployment_id}.outputs.json")
}
