//! Control plane capability used by the orchestrator.
//!
//! The orchestrator only talks to ARM through this trait, so it can be driven
//! by the REST client in production and by fakes in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::tracker::SubOperation;

use super::types::{
    ContainerResult, ContainerSpec, DeploymentResult, DeploymentSpec, RoleAssignment,
    RoleAssignmentSpec,
};

/// Remote operations needed to provision and track a deployment.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Creates the resource group, or updates it if it exists.
    async fn create_or_update_container(&self, spec: &ContainerSpec) -> Result<ContainerResult>;

    /// Submits a deployment into a resource group.
    ///
    /// Resolves once the deployment reaches a terminal provisioning state.
    async fn create_or_update_deployment(
        &self,
        container_id: &str,
        deployment_id: &str,
        spec: &DeploymentSpec,
    ) -> Result<DeploymentResult>;

    /// Lists the current sub-operations of a deployment.
    async fn list_sub_operations(
        &self,
        container_id: &str,
        deployment_id: &str,
    ) -> Result<Vec<SubOperation>>;

    /// Creates a role assignment with a caller-chosen assignment ID.
    async fn create_role_assignment(
        &self,
        scope: &str,
        assignment_id: &str,
        spec: &RoleAssignmentSpec,
    ) -> Result<RoleAssignment>;
}

#[async_trait]
impl ControlPlane for Box<dyn ControlPlane> {
    async fn create_or_update_container(&self, spec: &ContainerSpec) -> Result<ContainerResult> {
        (**self).create_or_update_container(spec).await
    }

    async fn create_or_update_deployment(
        &self,
        container_id: &str,
        deployment_id: &str,
        spec: &DeploymentSpec,
    ) -> Result<DeploymentResult> {
        (**self)
            .create_or_update_deployment(container_id, deployment_id, spec)
            .await
    }

    async fn list_sub_operations(
        &self,
        container_id: &str,
        deployment_id: &str,
    ) -> Result<Vec<SubOperation>> {
        (**self).list_sub_operations(container_id, deployment_id).await
    }

    async fn create_role_assignment(
        &self,
        scope: &str,
        assignment_id: &str,
        spec: &RoleAssignmentSpec,
    ) -> Result<RoleAssignment> {
        (**self).create_role_assignment(scope, assignment_id, spec).await
    }
}
