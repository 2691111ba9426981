//! ARM REST client implementation.
//!
//! This module provides the HTTP client for the Azure Resource Manager API.
//! The client performs no retries of its own: callers decide which failures
//! are worth repeating.

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::error::{ArmDeployError, ArmError, Result};
use crate::tracker::SubOperation;

use super::plane::ControlPlane;
use super::types::{
    ArmErrorEnvelope, ContainerResult, ContainerSpec, DeploymentResource, DeploymentResult,
    DeploymentSpec, OperationPage, RoleAssignment, RoleAssignmentProperties, RoleAssignmentSpec,
};

/// Public Azure Resource Manager endpoint.
pub const ARM_ENDPOINT: &str = "https://management.azure.com";

/// API version for resource groups and deployments.
const RESOURCES_API_VERSION: &str = "2021-04-01";

/// API version for role assignments.
const AUTHORIZATION_API_VERSION: &str = "2022-04-01";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default delay between deployment status reads.
const DEFAULT_DEPLOYMENT_POLL: Duration = Duration::from_secs(5);

/// Fallback wait when a 429 carries no `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Error code returned when an identical role assignment already exists.
const ROLE_ASSIGNMENT_EXISTS: &str = "RoleAssignmentExists";

/// Azure Resource Manager client.
#[derive(Debug)]
pub struct ArmClient {
    /// HTTP client.
    client: Client,
    /// Bearer token.
    token: SecretString,
    /// Base URL without trailing slash.
    endpoint: String,
    /// Delay between deployment status reads.
    deployment_poll: Duration,
}

impl ArmClient {
    /// Creates a new ARM client for the public cloud endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(token: SecretString) -> Result<Self> {
        Self::with_timeout(token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(token: SecretString, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ArmError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token,
            endpoint: ARM_ENDPOINT.to_string(),
            deployment_poll: DEFAULT_DEPLOYMENT_POLL,
        })
    }

    /// Overrides the ARM endpoint (sovereign clouds, tests).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the delay between deployment status reads.
    #[must_use]
    pub const fn with_deployment_poll(mut self, interval: Duration) -> Self {
        self.deployment_poll = interval;
        self
    }

    /// Returns the endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{path}?api-version={api_version}", self.endpoint)
    }

    fn deployment_path(container_id: &str, deployment_id: &str) -> String {
        format!("{container_id}/providers/Microsoft.Resources/deployments/{deployment_id}")
    }

    /// Sends a request and decodes a JSON response.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, resource: &str) -> Result<T> {
        let response = request
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| ArmError::network(format!("Request failed: {e}")))?;

        let response = Self::check_status(response, resource).await?;

        response
            .json()
            .await
            .map_err(|e| ArmError::invalid_response(format!("Failed to parse response: {e}")).into())
    }

    /// Maps non-success statuses onto [`ArmError`].
    async fn check_status(response: Response, resource: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

            return Err(ArmError::RateLimited {
                retry_after_secs: retry_after,
            }
            .into());
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ArmError::NotFound {
                resource: resource.to_string(),
            }
            .into());
        }

        let body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ArmErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.code.clone(), envelope.error.full_message()),
            Err(_) => (
                status.canonical_reason().unwrap_or("Unknown").to_string(),
                body,
            ),
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ArmError::AuthenticationFailed {
                message: if message.is_empty() { code } else { message },
            }
            .into());
        }

        Err(ArmError::api_error(status.as_u16(), code, message).into())
    }

    /// Reads the current state of a deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if the deployment does not exist or the API call fails.
    pub async fn get_deployment(
        &self,
        container_id: &str,
        deployment_id: &str,
    ) -> Result<DeploymentResource> {
        let path = Self::deployment_path(container_id, deployment_id);
        let url = self.url(&path, RESOURCES_API_VERSION);
        trace!("GET {url}");
        self.send(self.client.get(&url), &path).await
    }

    /// Waits until a deployment reaches a terminal state.
    ///
    /// Failed status reads are logged and retried on the next poll; only an
    /// authentication failure or a terminal provisioning state ends the wait.
    async fn wait_for_deployment(
        &self,
        container_id: &str,
        deployment_id: &str,
        mut current: DeploymentResource,
    ) -> Result<DeploymentResult> {
        while !current.is_terminal() {
            debug!(
                "Deployment {deployment_id} is {}",
                current.properties.provisioning_state
            );
            tokio::time::sleep(self.deployment_poll).await;
            match self.get_deployment(container_id, deployment_id).await {
                Ok(next) => current = next,
                // The bearer is never refreshed, so this cannot recover.
                Err(err @ ArmDeployError::Arm(ArmError::AuthenticationFailed { .. })) => {
                    return Err(err);
                }
                Err(ArmDeployError::Arm(ArmError::RateLimited { retry_after_secs })) => {
                    warn!("Reading deployment {deployment_id} throttled, waiting {retry_after_secs}s");
                    tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                }
                Err(e) => warn!("Reading deployment {deployment_id} failed, will retry: {e}"),
            }
        }

        if current.is_succeeded() {
            info!("Deployment {deployment_id} succeeded");
            return Ok(DeploymentResult::from(current));
        }

        let message = current
            .properties
            .error
            .as_ref()
            .map(super::types::ArmErrorBody::full_message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| String::from("no error details reported"));

        Err(ArmError::DeploymentRejected {
            deployment: deployment_id.to_string(),
            state: current.properties.provisioning_state,
            message,
        }
        .into())
    }
}

#[async_trait]
impl ControlPlane for ArmClient {
    async fn create_or_update_container(&self, spec: &ContainerSpec) -> Result<ContainerResult> {
        let path = spec.resource_id();
        let url = self.url(&path, RESOURCES_API_VERSION);
        debug!("PUT resource group {}", spec.name);

        let body = serde_json::json!({
            "location": spec.location,
            "tags": spec.tags,
        });

        self.send(self.client.put(&url).json(&body), &path).await
    }

    async fn create_or_update_deployment(
        &self,
        container_id: &str,
        deployment_id: &str,
        spec: &DeploymentSpec,
    ) -> Result<DeploymentResult> {
        let path = Self::deployment_path(container_id, deployment_id);
        let url = self.url(&path, RESOURCES_API_VERSION);
        info!("Submitting deployment {deployment_id}");

        let accepted: DeploymentResource = self
            .send(self.client.put(&url).json(&spec.to_request_body()), &path)
            .await?;

        self.wait_for_deployment(container_id, deployment_id, accepted)
            .await
    }

    async fn list_sub_operations(
        &self,
        container_id: &str,
        deployment_id: &str,
    ) -> Result<Vec<SubOperation>> {
        let path = format!(
            "{}/operations",
            Self::deployment_path(container_id, deployment_id)
        );
        let mut next = Some(self.url(&path, RESOURCES_API_VERSION));
        let mut operations = Vec::new();

        while let Some(url) = next {
            trace!("GET {url}");
            let page: OperationPage = self.send(self.client.get(&url), &path).await?;
            operations.extend(
                page.value
                    .into_iter()
                    .filter_map(super::types::DeploymentOperation::into_sub_operation),
            );
            next = page.next_link.filter(|link| !link.is_empty());
        }

        debug!(
            "Listed {} operations for {deployment_id}",
            operations.len()
        );
        Ok(operations)
    }

    async fn create_role_assignment(
        &self,
        scope: &str,
        assignment_id: &str,
        spec: &RoleAssignmentSpec,
    ) -> Result<RoleAssignment> {
        let path = format!("{scope}/providers/Microsoft.Authorization/roleAssignments/{assignment_id}");
        let url = self.url(&path, AUTHORIZATION_API_VERSION);
        debug!(
            "PUT role assignment {assignment_id} for {} at {scope}",
            spec.principal_id
        );

        let result: Result<RoleAssignment> = self
            .send(self.client.put(&url).json(&spec.to_request_body()), &path)
            .await;

        match result {
            Err(ArmDeployError::Arm(ArmError::ApiRequestFailed { status: 409, code, .. }))
                if code == ROLE_ASSIGNMENT_EXISTS =>
            {
                debug!("Role assignment already exists at {scope}");
                Ok(RoleAssignment {
                    id: path,
                    name: assignment_id.to_string(),
                    properties: RoleAssignmentProperties {
                        role_definition_id: spec.role_definition_id.clone(),
                        principal_id: spec.principal_id.clone(),
                        scope: Some(scope.to_string()),
                    },
                })
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploymentMode, PrincipalType};
    use crate::tracker::OperationState;
    use std::collections::HashMap;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RG: &str = "/subscriptions/sub/resourceGroups/rg";

    fn client(server: &MockServer) -> ArmClient {
        ArmClient::new(SecretString::from("test-token"))
            .unwrap()
            .with_endpoint(server.uri())
            .with_deployment_poll(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_create_container_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(RG))
            .and(query_param("api-version", RESOURCES_API_VERSION))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": RG,
                "name": "rg",
                "location": "westeurope",
                "properties": { "provisioningState": "Succeeded" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let spec = ContainerSpec {
            subscription: String::from("sub"),
            name: String::from("rg"),
            location: String::from("westeurope"),
            tags: HashMap::new(),
        };
        let result = client(&server).create_or_update_container(&spec).await.unwrap();

        assert_eq!(result.id, RG);
        assert_eq!(result.properties.provisioning_state.as_deref(), Some("Succeeded"));
    }

    #[tokio::test]
    async fn test_list_follows_next_link() {
        let server = MockServer::start().await;
        let operations_path = format!("{RG}/providers/Microsoft.Resources/deployments/web/operations");

        Mock::given(method("GET"))
            .and(path(operations_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    { "operationId": "1", "properties": {
                        "provisioningState": "Running",
                        "targetResource": { "id": "/res/a", "resourceType": "t" } } },
                    { "operationId": "2", "properties": { "provisioningState": "Running" } }
                ],
                "nextLink": format!("{}/page2", server.uri())
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    { "operationId": "3", "properties": {
                        "provisioningState": "Succeeded",
                        "targetResource": { "id": "/res/b", "resourceType": "t" } } }
                ]
            })))
            .mount(&server)
            .await;

        let ops = client(&server).list_sub_operations(RG, "web").await.unwrap();

        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].resource_id.as_deref(), Some("/res/a"));
        assert_eq!(ops[1].resource_id, None);
        assert_eq!(ops[2].state, OperationState::Succeeded);
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "code": "InvalidAuthenticationToken", "message": "token expired" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).list_sub_operations(RG, "web").await.unwrap_err();

        assert!(matches!(
            err,
            ArmDeployError::Arm(ArmError::AuthenticationFailed { ref message }) if message == "token expired"
        ));
    }

    #[tokio::test]
    async fn test_deployment_polls_until_succeeded() {
        let server = MockServer::start().await;
        let deployment_path = format!("{RG}/providers/Microsoft.Resources/deployments/web");

        Mock::given(method("PUT"))
            .and(path(deployment_path.as_str()))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": deployment_path,
                "name": "web",
                "properties": { "provisioningState": "Accepted" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(deployment_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": deployment_path,
                "name": "web",
                "properties": {
                    "provisioningState": "Succeeded",
                    "outputs": { "endpoint": { "type": "String", "value": "https://web" } }
                }
            })))
            .mount(&server)
            .await;

        let spec = DeploymentSpec {
            template: serde_json::json!({ "resources": [] }),
            parameters: serde_json::Map::new(),
            mode: DeploymentMode::Incremental,
            tags: HashMap::new(),
        };
        let result = client(&server)
            .create_or_update_deployment(RG, "web", &spec)
            .await
            .unwrap();

        assert_eq!(result.provisioning_state, "Succeeded");
        assert_eq!(result.outputs["endpoint"], "https://web");
    }

    #[tokio::test]
    async fn test_deployment_wait_survives_transient_read_failure() {
        let server = MockServer::start().await;
        let deployment_path = format!("{RG}/providers/Microsoft.Resources/deployments/web");

        Mock::given(method("PUT"))
            .and(path(deployment_path.as_str()))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": deployment_path,
                "name": "web",
                "properties": { "provisioningState": "Running" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(deployment_path.as_str()))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": { "code": "ServiceUnavailable", "message": "try again" }
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(deployment_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": deployment_path,
                "name": "web",
                "properties": { "provisioningState": "Succeeded" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let spec = DeploymentSpec {
            template: serde_json::json!({ "resources": [] }),
            parameters: serde_json::Map::new(),
            mode: DeploymentMode::Incremental,
            tags: HashMap::new(),
        };
        let result = client(&server)
            .create_or_update_deployment(RG, "web", &spec)
            .await
            .unwrap();

        assert_eq!(result.provisioning_state, "Succeeded");
    }

    #[tokio::test]
    async fn test_deployment_wait_stops_on_auth_failure() {
        let server = MockServer::start().await;
        let deployment_path = format!("{RG}/providers/Microsoft.Resources/deployments/web");

        Mock::given(method("PUT"))
            .and(path(deployment_path.as_str()))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": deployment_path,
                "name": "web",
                "properties": { "provisioningState": "Running" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(deployment_path.as_str()))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "code": "ExpiredAuthenticationToken", "message": "token expired" }
            })))
            .mount(&server)
            .await;

        let spec = DeploymentSpec {
            template: serde_json::json!({}),
            parameters: serde_json::Map::new(),
            mode: DeploymentMode::Incremental,
            tags: HashMap::new(),
        };
        let err = client(&server)
            .create_or_update_deployment(RG, "web", &spec)
            .await
            .unwrap_err();

        assert!(matches!(err, ArmDeployError::Arm(ArmError::AuthenticationFailed { .. })));
    }

    #[tokio::test]
    async fn test_failed_deployment_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "/d/web",
                "name": "web",
                "properties": {
                    "provisioningState": "Failed",
                    "error": { "code": "DeploymentFailed", "message": "At least one resource failed" }
                }
            })))
            .mount(&server)
            .await;

        let spec = DeploymentSpec {
            template: serde_json::json!({}),
            parameters: serde_json::Map::new(),
            mode: DeploymentMode::Incremental,
            tags: HashMap::new(),
        };
        let err = client(&server)
            .create_or_update_deployment(RG, "web", &spec)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ArmDeployError::Arm(ArmError::DeploymentRejected { ref state, .. }) if state == "Failed"
        ));
    }

    #[tokio::test]
    async fn test_existing_role_assignment_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(query_param("api-version", AUTHORIZATION_API_VERSION))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "error": { "code": "RoleAssignmentExists", "message": "The role assignment already exists." }
            })))
            .mount(&server)
            .await;

        let spec = RoleAssignmentSpec::new("sub", "role", "principal", PrincipalType::ServicePrincipal);
        let assignment = client(&server)
            .create_role_assignment(RG, "assignment", &spec)
            .await
            .unwrap();

        assert_eq!(assignment.name, "assignment");
        assert_eq!(assignment.properties.scope.as_deref(), Some(RG));
    }

    #[tokio::test]
    async fn test_principal_not_found_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "code": "PrincipalNotFound", "message": "Principal does not exist" }
            })))
            .mount(&server)
            .await;

        let spec = RoleAssignmentSpec::new("sub", "role", "principal", PrincipalType::ServicePrincipal);
        let err = client(&server)
            .create_role_assignment(RG, "assignment", &spec)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ArmDeployError::Arm(ArmError::ApiRequestFailed { status: 400, ref code, .. }) if code == "PrincipalNotFound"
        ));
    }
}
