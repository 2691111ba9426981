//! Azure Resource Manager integration module.
//!
//! This module provides the control plane capability the orchestrator drives,
//! its REST implementation, and a one-shot deployment observer.

mod client;
mod types;
mod plane;
mod observer;

pub use client::{ArmClient, ARM_ENDPOINT};
pub use types::{
    parse_provisioning_state, ArmErrorBody, ArmErrorEnvelope, ContainerProperties, ContainerResult,
    ContainerSpec, DeploymentOperation, DeploymentProperties, DeploymentResource, DeploymentResult,
    DeploymentSpec, OperationPage, OperationProperties, RoleAssignment, RoleAssignmentProperties,
    RoleAssignmentSpec, TargetResource,
};
pub use plane::ControlPlane;
#[cfg(test)]
pub use plane::MockControlPlane;
pub use observer::{DeploymentObserver, DeploymentStatus};
