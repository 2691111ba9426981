//! Deployment observer for inspecting an existing deployment.
//!
//! Unlike the orchestrator, the observer reads the sub-operation listing once
//! and summarizes it. It backs the `status` command.

use tracing::{debug, info};

use crate::error::Result;
use crate::tracker::{OperationState, OperationStatusTracker, OrderedStatusView};

use super::plane::ControlPlane;

/// One-shot reader of deployment progress.
#[derive(Debug)]
pub struct DeploymentObserver<P> {
    /// Control plane to query.
    plane: P,
}

/// Status summary for a deployment.
#[derive(Debug, Clone)]
pub struct DeploymentStatus {
    /// Resource group ID.
    pub container_id: String,
    /// Deployment name.
    pub deployment_id: String,
    /// Ordered per-resource view.
    pub view: OrderedStatusView,
    /// Number of succeeded resources.
    pub succeeded: usize,
    /// Number of running resources.
    pub running: usize,
    /// Number of pending resources.
    pub pending: usize,
    /// Number of failed resources.
    pub failed: usize,
    /// Failed resources with their first error.
    pub errors: indexmap::IndexMap<String, String>,
}

impl<P: ControlPlane> DeploymentObserver<P> {
    /// Creates a new deployment observer.
    #[must_use]
    pub const fn new(plane: P) -> Self {
        Self { plane }
    }

    /// Reads the current status of a deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing call fails.
    pub async fn status(&self, container_id: &str, deployment_id: &str) -> Result<DeploymentStatus> {
        info!("Reading status of deployment {deployment_id}");

        let operations = self
            .plane
            .list_sub_operations(container_id, deployment_id)
            .await?;
        debug!("Found {} operation records", operations.len());

        let mut tracker = OperationStatusTracker::new();
        let view = tracker.observe(&operations);

        Ok(DeploymentStatus {
            container_id: container_id.to_string(),
            deployment_id: deployment_id.to_string(),
            succeeded: view.count(OperationState::Succeeded),
            running: view.count(OperationState::Running),
            pending: view.count(OperationState::Pending),
            failed: view.count(OperationState::Failed),
            errors: tracker.collect_errors(),
            view,
        })
    }

    /// Gets the underlying control plane reference.
    #[must_use]
    pub const fn plane(&self) -> &P {
        &self.plane
    }
}

impl DeploymentStatus {
    /// Total number of resources seen.
    #[must_use]
    pub fn total(&self) -> usize {
        self.view.len()
    }

    /// Returns true if every seen resource succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.view.is_empty() && self.succeeded == self.view.len()
    }

    /// Returns true if any resource failed.
    #[must_use]
    pub const fn has_errors(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::MockControlPlane;
    use crate::tracker::SubOperation;

    #[tokio::test]
    async fn test_status_summarizes_listing() {
        let mut plane = MockControlPlane::new();
        plane
            .expect_list_sub_operations()
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    SubOperation::new("/res/a", "t", OperationState::Succeeded),
                    SubOperation::new("/res/b", "t", OperationState::Failed).with_error("quota exceeded"),
                    SubOperation::new("/res/c", "t", OperationState::Running),
                    SubOperation::new("/res/a", "t", OperationState::Succeeded),
                ])
            });

        let observer = DeploymentObserver::new(plane);
        let status = observer.status("/rg", "web").await.unwrap();

        assert_eq!(status.total(), 3);
        assert_eq!(status.succeeded, 1);
        assert_eq!(status.running, 1);
        assert!(status.has_errors());
        assert!(!status.is_complete());
        assert_eq!(status.errors.get("/res/b").map(String::as_str), Some("quota exceeded"));
    }
}
