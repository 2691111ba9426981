//! State of one deployment run.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{OrchestrationError, Result};
use crate::tracker::{OperationStatusTracker, OrderedStatusView, SubOperation};

/// Lifecycle phase of a deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RunPhase {
    /// Submission accepted, nothing sent yet.
    Created,
    /// Creating or updating the resource group and prerequisite roles.
    ContainerProvisioning,
    /// Deployment request being sent.
    DeploymentSubmitting,
    /// Waiting for the deployment while listing its operations.
    Polling,
    /// Deployment finished successfully.
    Succeeded,
    /// Run ended with an error.
    Failed,
}

impl RunPhase {
    /// Returns true if no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the run may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::ContainerProvisioning | Self::Failed)
                | (Self::ContainerProvisioning, Self::DeploymentSubmitting | Self::Failed)
                | (Self::DeploymentSubmitting, Self::Polling | Self::Failed)
                | (Self::Polling, Self::Succeeded | Self::Failed)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::ContainerProvisioning => "provisioning resource group",
            Self::DeploymentSubmitting => "submitting deployment",
            Self::Polling => "deploying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One invocation of the orchestrator.
///
/// Owns the tracker for the run; dropped when the run ends.
#[derive(Debug)]
pub struct DeploymentRun {
    deployment_id: String,
    container_id: String,
    total_expected_resources: usize,
    phase: RunPhase,
    tracker: OperationStatusTracker,
    started_at: Instant,
}

impl DeploymentRun {
    /// Creates a run in the `Created` phase.
    #[must_use]
    pub fn new(deployment_id: impl Into<String>, total_expected_resources: usize) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            container_id: String::new(),
            total_expected_resources,
            phase: RunPhase::Created,
            tracker: OperationStatusTracker::new(),
            started_at: Instant::now(),
        }
    }

    /// Moves the run to the next phase.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the move is not allowed, in particular
    /// when leaving a terminal phase.
    pub fn transition(&mut self, next: RunPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(OrchestrationError::InvalidTransition {
                from: format!("{:?}", self.phase),
                to: format!("{next:?}"),
            }
            .into());
        }
        debug!("{}: {:?} -> {next:?}", self.deployment_id, self.phase);
        self.phase = next;
        Ok(())
    }

    /// Records the resource group the deployment targets.
    pub fn set_container_id(&mut self, container_id: impl Into<String>) {
        self.container_id = container_id.into();
    }

    /// Merges a listing into the run's tracker.
    pub fn observe(&mut self, snapshot: &[SubOperation]) -> OrderedStatusView {
        self.tracker.observe(snapshot)
    }

    /// Current view of tracked resources.
    #[must_use]
    pub fn view(&self) -> OrderedStatusView {
        self.tracker.view()
    }

    /// Failed resources with their first error.
    #[must_use]
    pub fn collect_errors(&self) -> IndexMap<String, String> {
        self.tracker.collect_errors()
    }

    /// Deployment name.
    #[must_use]
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Resource group ID, empty until provisioned.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Number of resources the template declares.
    #[must_use]
    pub const fn total_expected_resources(&self) -> usize {
        self.total_expected_resources
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Number of distinct resources seen so far.
    #[must_use]
    pub fn resources_seen(&self) -> usize {
        self.tracker.resources_seen()
    }

    /// Time elapsed since the run was created.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArmDeployError;

    #[test]
    fn test_happy_path_transitions() {
        let mut run = DeploymentRun::new("web", 2);

        for phase in [
            RunPhase::ContainerProvisioning,
            RunPhase::DeploymentSubmitting,
            RunPhase::Polling,
            RunPhase::Succeeded,
        ] {
            run.transition(phase).unwrap();
        }

        assert_eq!(run.phase(), RunPhase::Succeeded);
    }

    #[test]
    fn test_terminal_phase_is_final() {
        let mut run = DeploymentRun::new("web", 0);
        run.transition(RunPhase::ContainerProvisioning).unwrap();
        run.transition(RunPhase::Failed).unwrap();

        let err = run.transition(RunPhase::Polling).unwrap_err();
        assert!(matches!(
            err,
            ArmDeployError::Orchestration(OrchestrationError::InvalidTransition { .. })
        ));
        assert_eq!(run.phase(), RunPhase::Failed);
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        let mut run = DeploymentRun::new("web", 0);
        assert!(run.transition(RunPhase::Polling).is_err());
        assert_eq!(run.phase(), RunPhase::Created);
    }
}
