//! ARM request and response types.
//!
//! Wire structs mirror the JSON shapes of the Resource Manager REST API. The
//! conversion into [`SubOperation`] happens here so the rest of the crate
//! never sees loosely typed operation records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::{DeploymentMode, PrincipalType};
use crate::tracker::{OperationState, SubOperation};

/// Role definition path segment under a subscription.
const ROLE_DEFINITIONS_PATH: &str = "/providers/Microsoft.Authorization/roleDefinitions/";

/// Resource group to create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Subscription ID.
    pub subscription: String,
    /// Resource group name.
    pub name: String,
    /// Azure location.
    pub location: String,
    /// Tags applied to the resource group.
    pub tags: HashMap<String, String>,
}

impl ContainerSpec {
    /// Resource ID of the resource group.
    #[must_use]
    pub fn resource_id(&self) -> String {
        format!("/subscriptions/{}/resourceGroups/{}", self.subscription, self.name)
    }
}

/// A resource group as returned by ARM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResult {
    /// Resource ID.
    pub id: String,
    /// Resource group name.
    pub name: String,
    /// Azure location.
    pub location: String,
    /// Provisioning properties.
    #[serde(default)]
    pub properties: ContainerProperties,
}

/// Resource group properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProperties {
    /// Provisioning state.
    #[serde(default)]
    pub provisioning_state: Option<String>,
}

/// Template deployment to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentSpec {
    /// Template document.
    pub template: serde_json::Value,
    /// Parameter values, keyed by parameter name.
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Deployment mode.
    pub mode: DeploymentMode,
    /// Tags applied to the deployment resource.
    pub tags: HashMap<String, String>,
}

impl DeploymentSpec {
    /// Builds the PUT body, wrapping each parameter as `{ "value": ... }`.
    #[must_use]
    pub fn to_request_body(&self) -> serde_json::Value {
        let parameters: serde_json::Map<String, serde_json::Value> = self
            .parameters
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::json!({ "value": value })))
            .collect();

        serde_json::json!({
            "properties": {
                "mode": self.mode.to_string(),
                "template": self.template,
                "parameters": parameters,
            },
            "tags": self.tags,
        })
    }
}

/// A deployment resource as returned by ARM.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentResource {
    /// Resource ID.
    #[serde(default)]
    pub id: String,
    /// Deployment name.
    #[serde(default)]
    pub name: String,
    /// Deployment properties.
    #[serde(default)]
    pub properties: DeploymentProperties,
}

/// Properties of a deployment resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProperties {
    /// Provisioning state (`Accepted`, `Running`, `Succeeded`, ...).
    #[serde(default)]
    pub provisioning_state: String,
    /// Outputs, each as `{ "type": ..., "value": ... }`.
    #[serde(default)]
    pub outputs: Option<serde_json::Map<String, serde_json::Value>>,
    /// Error reported for a failed deployment.
    #[serde(default)]
    pub error: Option<ArmErrorBody>,
    /// Timestamp of the last state change.
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl DeploymentResource {
    /// Returns true once ARM will not change the deployment anymore.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.properties.provisioning_state.as_str(),
            "Succeeded" | "Failed" | "Canceled"
        )
    }

    /// Returns true if the deployment succeeded.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.properties.provisioning_state == "Succeeded"
    }
}

/// Outcome of a successful deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Deployment resource ID.
    pub id: String,
    /// Deployment name.
    pub name: String,
    /// Final provisioning state.
    pub provisioning_state: String,
    /// Output values keyed by output name.
    pub outputs: serde_json::Map<String, serde_json::Value>,
}

impl From<DeploymentResource> for DeploymentResult {
    fn from(resource: DeploymentResource) -> Self {
        let outputs = resource
            .properties
            .outputs
            .map(flatten_outputs)
            .unwrap_or_default();

        Self {
            id: resource.id,
            name: resource.name,
            provisioning_state: resource.properties.provisioning_state,
            outputs,
        }
    }
}

/// Strips the `{ "type", "value" }` wrapper ARM puts around each output.
fn flatten_outputs(
    outputs: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    outputs
        .into_iter()
        .map(|(name, output)| {
            let value = match output {
                serde_json::Value::Object(mut wrapper) if wrapper.contains_key("value") => {
                    wrapper.remove("value").unwrap_or(serde_json::Value::Null)
                }
                other => other,
            };
            (name, value)
        })
        .collect()
}

/// Role assignment to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignmentSpec {
    /// Fully qualified role definition ID.
    pub role_definition_id: String,
    /// Object ID of the principal.
    pub principal_id: String,
    /// Principal type.
    pub principal_type: PrincipalType,
}

impl RoleAssignmentSpec {
    /// Creates a role assignment spec, qualifying a bare role GUID with the subscription.
    #[must_use]
    pub fn new(
        subscription: &str,
        role_definition_id: &str,
        principal_id: impl Into<String>,
        principal_type: PrincipalType,
    ) -> Self {
        let role_definition_id = if role_definition_id.starts_with('/') {
            role_definition_id.to_string()
        } else {
            format!("/subscriptions/{subscription}{ROLE_DEFINITIONS_PATH}{role_definition_id}")
        };

        Self {
            role_definition_id,
            principal_id: principal_id.into(),
            principal_type,
        }
    }

    /// Builds the PUT body for the authorization API.
    #[must_use]
    pub fn to_request_body(&self) -> serde_json::Value {
        serde_json::json!({
            "properties": {
                "roleDefinitionId": self.role_definition_id,
                "principalId": self.principal_id,
                "principalType": self.principal_type.to_string(),
            }
        })
    }
}

/// A role assignment as returned by ARM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Resource ID.
    pub id: String,
    /// Assignment GUID.
    pub name: String,
    /// Assignment properties.
    #[serde(default)]
    pub properties: RoleAssignmentProperties,
}

/// Role assignment properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentProperties {
    /// Role definition ID.
    #[serde(default)]
    pub role_definition_id: String,
    /// Principal object ID.
    #[serde(default)]
    pub principal_id: String,
    /// Assignment scope.
    #[serde(default)]
    pub scope: Option<String>,
}

/// ARM error body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArmErrorBody {
    /// Error code (e.g. `PrincipalNotFound`).
    #[serde(default)]
    pub code: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Nested errors.
    #[serde(default)]
    pub details: Vec<ArmErrorBody>,
}

impl ArmErrorBody {
    /// Joins this message with the messages of nested details.
    #[must_use]
    pub fn full_message(&self) -> String {
        let mut parts = vec![self.message.clone()];
        parts.extend(
            self.details
                .iter()
                .filter(|d| !d.message.is_empty())
                .map(|d| format!("{}: {}", d.code, d.message)),
        );
        parts.retain(|p| !p.is_empty());
        parts.join("; ")
    }
}

/// Error envelope returned by ARM on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ArmErrorEnvelope {
    /// The error.
    pub error: ArmErrorBody,
}

/// One page of deployment operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPage {
    /// Operations on this page.
    #[serde(default)]
    pub value: Vec<DeploymentOperation>,
    /// URL of the next page.
    #[serde(default)]
    pub next_link: Option<String>,
}

/// One deployment operation record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOperation {
    /// Operation ID.
    #[serde(default)]
    pub operation_id: String,
    /// Operation properties.
    #[serde(default)]
    pub properties: OperationProperties,
}

/// Deployment operation properties.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProperties {
    /// Provisioning state of the operation.
    #[serde(default)]
    pub provisioning_state: String,
    /// Resource the operation acts on, absent until materialized.
    #[serde(default)]
    pub target_resource: Option<TargetResource>,
    /// Status message, an object carrying `error` or a plain string.
    #[serde(default)]
    pub status_message: Option<serde_json::Value>,
}

/// Resource targeted by a deployment operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResource {
    /// Resource ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Resource type.
    #[serde(default)]
    pub resource_type: String,
    /// Resource name.
    #[serde(default)]
    pub resource_name: Option<String>,
}

impl DeploymentOperation {
    /// Converts the record into a [`SubOperation`].
    ///
    /// Returns `None` for provisioning states that carry no progress meaning.
    #[must_use]
    pub fn into_sub_operation(self) -> Option<SubOperation> {
        let Some(state) = parse_provisioning_state(&self.properties.provisioning_state) else {
            debug!(
                "Ignoring operation {} in state '{}'",
                self.operation_id, self.properties.provisioning_state
            );
            return None;
        };

        let target = self.properties.target_resource.unwrap_or_default();
        let error_message = if state == OperationState::Failed {
            self.properties.status_message.as_ref().and_then(status_error_message)
        } else {
            None
        };

        Some(SubOperation {
            resource_id: target.id.filter(|id| !id.is_empty()),
            resource_type: target.resource_type,
            state,
            error_message,
        })
    }
}

/// Maps an ARM provisioning state onto an [`OperationState`].
#[must_use]
pub fn parse_provisioning_state(state: &str) -> Option<OperationState> {
    match state.to_ascii_lowercase().as_str() {
        "accepted" | "notstarted" | "waiting" | "created" => Some(OperationState::Pending),
        "running" | "creating" | "updating" | "deleting" => Some(OperationState::Running),
        "succeeded" => Some(OperationState::Succeeded),
        "failed" | "canceled" => Some(OperationState::Failed),
        _ => None,
    }
}

/// Extracts a human-readable error from an operation status message.
fn status_error_message(status: &serde_json::Value) -> Option<String> {
    if let Some(message) = status.pointer("/error/message").and_then(|m| m.as_str()) {
        return Some(message.to_string());
    }
    if let Some(message) = status.pointer("/message").and_then(|m| m.as_str()) {
        return Some(message.to_string());
    }
    match status {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(json: serde_json::Value) -> DeploymentOperation {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_failed_operation_extracts_nested_error() {
        let op = operation(serde_json::json!({
            "operationId": "1",
            "properties": {
                "provisioningState": "Failed",
                "targetResource": {
                    "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/b",
                    "resourceType": "Microsoft.Compute/virtualMachines"
                },
                "statusMessage": {
                    "status": "Failed",
                    "error": { "code": "QuotaExceeded", "message": "quota exceeded" }
                }
            }
        }));

        let sub = op.into_sub_operation().unwrap();
        assert_eq!(sub.state, OperationState::Failed);
        assert_eq!(sub.error_message.as_deref(), Some("quota exceeded"));
        assert_eq!(sub.resource_type, "Microsoft.Compute/virtualMachines");
    }

    #[test]
    fn test_operation_without_target_has_no_id() {
        let op = operation(serde_json::json!({
            "operationId": "2",
            "properties": { "provisioningState": "Running" }
        }));

        let sub = op.into_sub_operation().unwrap();
        assert_eq!(sub.resource_id, None);
        assert_eq!(sub.state, OperationState::Running);
    }

    #[test]
    fn test_unknown_state_is_dropped() {
        let op = operation(serde_json::json!({
            "operationId": "3",
            "properties": { "provisioningState": "Ready" }
        }));

        assert!(op.into_sub_operation().is_none());
    }

    #[test]
    fn test_running_operation_ignores_status_message() {
        let op = operation(serde_json::json!({
            "operationId": "4",
            "properties": {
                "provisioningState": "Running",
                "targetResource": { "id": "/x", "resourceType": "t" },
                "statusMessage": "still working"
            }
        }));

        assert_eq!(op.into_sub_operation().unwrap().error_message, None);
    }

    #[test]
    fn test_provisioning_state_mapping() {
        assert_eq!(parse_provisioning_state("Accepted"), Some(OperationState::Pending));
        assert_eq!(parse_provisioning_state("Creating"), Some(OperationState::Running));
        assert_eq!(parse_provisioning_state("succeeded"), Some(OperationState::Succeeded));
        assert_eq!(parse_provisioning_state("Canceled"), Some(OperationState::Failed));
        assert_eq!(parse_provisioning_state(""), None);
    }

    #[test]
    fn test_deployment_body_wraps_parameters() {
        let mut parameters = serde_json::Map::new();
        parameters.insert(String::from("sku"), serde_json::json!("B1"));
        let spec = DeploymentSpec {
            template: serde_json::json!({ "resources": [] }),
            parameters,
            mode: DeploymentMode::Complete,
            tags: HashMap::new(),
        };

        let body = spec.to_request_body();
        assert_eq!(body["properties"]["mode"], "Complete");
        assert_eq!(body["properties"]["parameters"]["sku"]["value"], "B1");
    }

    #[test]
    fn test_outputs_are_unwrapped() {
        let resource: DeploymentResource = serde_json::from_value(serde_json::json!({
            "id": "/d/web",
            "name": "web",
            "properties": {
                "provisioningState": "Succeeded",
                "outputs": { "url": { "type": "String", "value": "https://web" } }
            }
        }))
        .unwrap();

        let result = DeploymentResult::from(resource);
        assert_eq!(result.outputs["url"], "https://web");
    }

    #[test]
    fn test_role_definition_is_qualified() {
        let spec = RoleAssignmentSpec::new("sub", "abc", "p", PrincipalType::User);
        assert_eq!(
            spec.role_definition_id,
            "/subscriptions/sub/providers/Microsoft.Authorization/roleDefinitions/abc"
        );
        assert_eq!(spec.to_request_body()["properties"]["principalType"], "User");
    }
}
