//! Deployment orchestrator.
//!
//! This module drives one deployment from submission to a terminal state:
//!
//! 1. create or update the target resource group
//! 2. create prerequisite role assignments, retrying while the principal propagates
//! 3. submit the deployment
//! 4. list its sub-operations on every tick until the deployment resolves
//! 5. persist outputs on success, or aggregate per-resource errors on failure

mod presenter;
mod run;

pub use presenter::{NullPresenter, StatusPresenter};
pub use run::{DeploymentRun, RunPhase};

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::arm::{ContainerSpec, ControlPlane, DeploymentSpec, RoleAssignment, RoleAssignmentSpec};
use crate::config::{
    ConfigHasher, DeployConfig, DeploymentMode, LoadedTemplate, PollingConfig, PrincipalType,
};
use crate::error::{ArmDeployError, ArmError, OrchestrationError, Result};
use crate::outputs::OutputSink;
use crate::retry::{RetryInvoker, RetryPolicy};
use crate::tracker::OrderedStatusView;

/// Tag carrying the hash of the last template applied to a resource group.
pub const TEMPLATE_HASH_TAG: &str = "armdeploy-template-hash";

/// Default delay between sub-operation listings.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A deployment to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    /// Deployment name.
    pub deployment_name: String,
    /// Subscription ID.
    pub subscription: String,
    /// Azure location of the resource group.
    pub location: String,
    /// Resource group name.
    pub container_name: String,
    /// Template document.
    pub template: serde_json::Value,
    /// Template parameter values.
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Deployment mode.
    pub mode: DeploymentMode,
    /// Tags for the resource group.
    pub tags: HashMap<String, String>,
    /// Roles to grant before submitting.
    pub role_assignments: Vec<RoleAssignmentRequest>,
    /// Number of resources the template declares.
    pub total_expected_resources: usize,
}

/// A prerequisite role assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignmentRequest {
    /// Principal object ID.
    pub principal_id: String,
    /// Role definition GUID or full ID.
    pub role_definition_id: String,
    /// Principal type.
    pub principal_type: PrincipalType,
    /// Scope; the resource group when absent.
    pub scope: Option<String>,
}

impl DeploymentRequest {
    /// Builds a request from a configuration and its loaded template.
    #[must_use]
    pub fn from_config(config: &DeployConfig, template: &LoadedTemplate) -> Self {
        let deployment = &config.deployment;
        Self {
            deployment_name: deployment.name.clone(),
            subscription: deployment.subscription.clone(),
            location: deployment.location.clone(),
            container_name: deployment.resource_group_name().to_string(),
            template: template.document.clone(),
            parameters: deployment.parameters.clone(),
            mode: deployment.mode,
            tags: deployment.tags.clone(),
            role_assignments: config
                .role_assignments
                .iter()
                .map(|r| RoleAssignmentRequest {
                    principal_id: r.principal_id.clone(),
                    role_definition_id: r.role_definition_id.clone(),
                    principal_type: r.principal_type,
                    scope: r.scope.clone(),
                })
                .collect(),
            total_expected_resources: template.resource_count(),
        }
    }

    /// Checks the fields that must be present before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error naming the first empty field.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("deployment_name", &self.deployment_name),
            ("subscription", &self.subscription),
            ("location", &self.location),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(OrchestrationError::validation(field, "must not be empty").into());
            }
        }
        Ok(())
    }
}

/// Polling cadence and bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between listings.
    pub interval: Duration,
    /// Optional bound on the polling phase.
    pub timeout: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            timeout: config.timeout(),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    /// Deployment name.
    pub deployment_id: String,
    /// Resource group ID.
    pub container_id: String,
    /// Final provisioning state.
    pub provisioning_state: String,
    /// Deployment outputs.
    pub outputs: serde_json::Map<String, serde_json::Value>,
    /// Final view of tracked resources.
    pub resources: OrderedStatusView,
    /// Wall time of the run in seconds.
    pub elapsed_secs: f64,
}

/// Drives deployment runs against a control plane.
pub struct DeploymentOrchestrator<P: ControlPlane, S: OutputSink> {
    /// Control plane.
    plane: P,
    /// Output sink.
    sink: S,
    /// Retry executor for role assignments.
    retry: RetryInvoker,
    /// Polling cadence.
    poll: PollSettings,
    /// Cancels the polling phase.
    cancel: CancellationToken,
    /// Hasher for tags and assignment IDs.
    hasher: ConfigHasher,
}

impl<P: ControlPlane, S: OutputSink> DeploymentOrchestrator<P, S> {
    /// Creates an orchestrator with default retry and polling settings.
    #[must_use]
    pub fn new(plane: P, sink: S) -> Self {
        Self {
            plane,
            sink,
            retry: RetryInvoker::new(RetryPolicy::ROLE_ASSIGNMENT),
            poll: PollSettings::default(),
            cancel: CancellationToken::new(),
            hasher: ConfigHasher::new(),
        }
    }

    /// Sets the retry policy for role assignments.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryInvoker::new(policy);
        self
    }

    /// Sets the polling cadence.
    #[must_use]
    pub const fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns a handle that cancels this orchestrator's runs.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Submits a deployment and tracks it to completion.
    ///
    /// # Errors
    ///
    /// - `Validation` if a required field is empty; nothing is sent.
    /// - `Provisioning` if the resource group cannot be created.
    /// - `PropagationTimeout` if a role assignment never succeeds.
    /// - `DeploymentFailed` with per-resource errors if ARM rejects the deployment.
    /// - `PollTimeout` if polling is bounded and the bound is reached.
    /// - `Cancelled` if the token fires; nothing is submitted when it fires
    ///   before the deployment request.
    pub async fn submit(
        &self,
        request: &DeploymentRequest,
        presenter: &mut dyn StatusPresenter,
    ) -> Result<DeploymentOutcome> {
        request.validate()?;
        if self.poll.interval.is_zero() {
            return Err(
                OrchestrationError::validation("poll.interval", "must be greater than zero").into(),
            );
        }

        let mut run = DeploymentRun::new(&request.deployment_name, request.total_expected_resources);
        info!(
            "Starting deployment {} ({} resources)",
            request.deployment_name, request.total_expected_resources
        );

        Self::enter(&mut run, RunPhase::ContainerProvisioning, presenter)?;
        let provisioned = tokio::select! {
            biased;

            () = self.cancel.cancelled() => Err(cancelled(&request.deployment_name)),
            result = self.provision(&mut run, request) => result,
        };
        if let Err(err) = provisioned {
            return Self::abort(&mut run, err, presenter);
        }

        if self.cancel.is_cancelled() {
            return Self::abort(&mut run, cancelled(&request.deployment_name), presenter);
        }

        Self::enter(&mut run, RunPhase::DeploymentSubmitting, presenter)?;
        let spec = DeploymentSpec {
            template: request.template.clone(),
            parameters: request.parameters.clone(),
            mode: request.mode,
            tags: request.tags.clone(),
        };
        let container_id = run.container_id().to_string();
        let deployment = self.plane.create_or_update_deployment(
            &container_id,
            &request.deployment_name,
            &spec,
        );
        tokio::pin!(deployment);

        Self::enter(&mut run, RunPhase::Polling, presenter)?;

        let mut ticker = tokio::time::interval(self.poll.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline = self.poll.timeout.map(|timeout| Instant::now() + timeout);
        let poll_timeout = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(poll_timeout);

        let result = loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    return Self::abort(&mut run, cancelled(&request.deployment_name), presenter);
                }

                result = &mut deployment => break result,

                () = &mut poll_timeout => {
                    let err = OrchestrationError::PollTimeout {
                        deployment: request.deployment_name.clone(),
                        elapsed_secs: run.elapsed().as_secs(),
                    };
                    return Self::abort(&mut run, err.into(), presenter);
                }

                _ = ticker.tick() => {
                    self.poll_once(&mut run, presenter).await;
                }
            }
        };

        match result {
            Ok(deployment) => {
                self.refresh(&mut run).await;
                presenter.progress(&run.view(), run.total_expected_resources());

                if let Err(err) = self.sink.write_outputs(run.deployment_id(), &deployment.outputs).await {
                    return Self::abort(&mut run, err, presenter);
                }

                Self::enter(&mut run, RunPhase::Succeeded, presenter)?;
                let outcome = DeploymentOutcome {
                    deployment_id: run.deployment_id().to_string(),
                    container_id: run.container_id().to_string(),
                    provisioning_state: deployment.provisioning_state,
                    outputs: deployment.outputs,
                    resources: run.view(),
                    elapsed_secs: run.elapsed().as_secs_f64(),
                };
                info!(
                    "Deployment {} succeeded in {:.1}s",
                    outcome.deployment_id, outcome.elapsed_secs
                );
                presenter.succeeded(&outcome);
                Ok(outcome)
            }
            Err(err) => {
                self.refresh(&mut run).await;
                presenter.progress(&run.view(), run.total_expected_resources());

                let reason = rejection_reason(&err);
                let errors = run.collect_errors();
                error!(
                    "Deployment {} failed: {reason} ({} failed resources)",
                    run.deployment_id(),
                    errors.len()
                );

                run.transition(RunPhase::Failed)?;
                presenter.phase_changed(RunPhase::Failed);
                presenter.failed(&reason, &errors);

                Err(OrchestrationError::DeploymentFailed {
                    deployment: run.deployment_id().to_string(),
                    reason,
                    errors,
                }
                .into())
            }
        }
    }

    /// Creates a role assignment, retrying until the principal is visible.
    ///
    /// The assignment ID is derived from scope, principal and role, so a
    /// repeated call targets the same assignment.
    ///
    /// # Errors
    ///
    /// Returns `PropagationTimeout` carrying the last error once the retry
    /// budget is exhausted.
    pub async fn assign_role(&self, scope: &str, spec: &RoleAssignmentSpec) -> Result<RoleAssignment> {
        let assignment_id = self
            .hasher
            .assignment_id(scope, &spec.principal_id, &spec.role_definition_id)
            .to_string();
        let label = format!("Role assignment for {}", spec.principal_id);

        self.retry
            .invoke(&label, || {
                self.plane
                    .create_role_assignment(scope, &assignment_id, spec)
            })
            .await
            .map_err(|last_error| {
                OrchestrationError::PropagationTimeout {
                    operation: label,
                    attempts: self.retry.max_attempts(),
                    last_error: Box::new(last_error),
                }
                .into()
            })
    }

    /// Creates the resource group and the prerequisite role assignments.
    async fn provision(&self, run: &mut DeploymentRun, request: &DeploymentRequest) -> Result<()> {
        let mut tags = request.tags.clone();
        tags.insert(
            TEMPLATE_HASH_TAG.to_string(),
            self.hasher.short_template_hash(&request.template),
        );

        let container = ContainerSpec {
            subscription: request.subscription.clone(),
            name: request.container_name.clone(),
            location: request.location.clone(),
            tags,
        };

        let created = self
            .plane
            .create_or_update_container(&container)
            .await
            .map_err(|e| OrchestrationError::Provisioning {
                container: container.name.clone(),
                source: Box::new(e),
            })?;
        info!("Resource group ready: {}", created.id);
        run.set_container_id(created.id);

        for assignment in &request.role_assignments {
            let scope = assignment
                .scope
                .clone()
                .unwrap_or_else(|| run.container_id().to_string());
            let spec = RoleAssignmentSpec::new(
                &request.subscription,
                &assignment.role_definition_id,
                assignment.principal_id.clone(),
                assignment.principal_type,
            );
            self.assign_role(&scope, &spec).await?;
        }

        Ok(())
    }

    /// Lists sub-operations once and hands the view to the presenter.
    async fn poll_once(&self, run: &mut DeploymentRun, presenter: &mut dyn StatusPresenter) {
        let view = match self
            .plane
            .list_sub_operations(run.container_id(), run.deployment_id())
            .await
        {
            Ok(snapshot) => {
                let view = run.observe(&snapshot);
                debug!(
                    "{}: {} of {} resources seen",
                    run.deployment_id(),
                    view.len(),
                    run.total_expected_resources()
                );
                view
            }
            Err(e) => {
                warn!("Listing operations of {} failed: {e}", run.deployment_id());
                run.view()
            }
        };
        presenter.progress(&view, run.total_expected_resources());
    }

    /// Issues one last listing after the deployment resolved.
    async fn refresh(&self, run: &mut DeploymentRun) {
        match self
            .plane
            .list_sub_operations(run.container_id(), run.deployment_id())
            .await
        {
            Ok(snapshot) => {
                run.observe(&snapshot);
            }
            Err(e) => warn!("Final listing of {} failed: {e}", run.deployment_id()),
        }
    }

    /// Moves the run to `phase` and tells the presenter.
    fn enter(
        run: &mut DeploymentRun,
        phase: RunPhase,
        presenter: &mut dyn StatusPresenter,
    ) -> Result<()> {
        run.transition(phase)?;
        presenter.phase_changed(phase);
        Ok(())
    }

    /// Fails the run with `err`.
    fn abort<T>(
        run: &mut DeploymentRun,
        err: ArmDeployError,
        presenter: &mut dyn StatusPresenter,
    ) -> Result<T> {
        error!("Deployment {} failed: {err}", run.deployment_id());
        run.transition(RunPhase::Failed)?;
        presenter.phase_changed(RunPhase::Failed);
        presenter.failed(&err.to_string(), &run.collect_errors());
        Err(err)
    }
}

/// Builds the error for a run stopped by its cancellation token.
fn cancelled(deployment: &str) -> ArmDeployError {
    warn!("Deployment {deployment} cancelled");
    OrchestrationError::Cancelled {
        deployment: deployment.to_string(),
    }
    .into()
}

/// Extracts the message ARM gave for rejecting a deployment.
fn rejection_reason(err: &ArmDeployError) -> String {
    match err {
        ArmDeployError::Arm(ArmError::DeploymentRejected { message, .. }) => message.clone(),
        other => other.to_string(),
    }
}
