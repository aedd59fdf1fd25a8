//! ARM template deployment driver: PUTs a deployment, polls until it
//! settles, and classifies the terminal state.
//!
//! Grounded on
//! `original_source/pkg/infrastructure/authorizationCheckers/ARMTemplateDeployment/armTemplateAuthorizationChecker.go`
//! and the parameter-unwrapping helper in
//! `original_source/pkg/infrastructure/ARMTemplateShared/armTemplateShared.go`.

use crate::{
    backend::Backend,
    driver::{AttemptOutcome, DeploymentDriver},
    error::MpfError,
    models::config::ResourceGroup,
};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// ARM rejects a template outright (bad JSON, unknown resource type,
/// schema mismatch) with this provisioning error code; retrying without
/// changing RBAC will never help, so the controller must abort.
const INVALID_TEMPLATE_CODE: &str = "InvalidTemplate";

pub struct ArmDeploymentDriver<'a> {
    backend: &'a Backend,
    subscription_id: String,
    resource_group: Option<ResourceGroup>,
    deployment_name: String,
    template: Value,
    parameters: Value,
    location: Option<String>,
}

impl<'a> ArmDeploymentDriver<'a> {
    #[must_use]
    pub fn new(
        backend: &'a Backend,
        subscription_id: String,
        resource_group: Option<ResourceGroup>,
        deployment_name: String,
        template: Value,
        parameters: Value,
        location: Option<String>,
    ) -> Self {
        Self {
            backend,
            subscription_id,
            resource_group,
            deployment_name,
            template,
            parameters: strip_parameters_file_envelope(parameters),
            location,
        }
    }

    fn deployment_path(&self) -> String {
        match &self.resource_group {
            Some(rg) => format!(
                "{}/providers/Microsoft.Resources/deployments/{}",
                rg.id, self.deployment_name
            ),
            None => format!(
                "/subscriptions/{}/providers/Microsoft.Resources/deployments/{}",
                self.subscription_id, self.deployment_name
            ),
        }
    }

    fn deployment_body(&self) -> Value {
        let properties = serde_json::json!({
            "mode": "Incremental",
            "template": self.template,
            "parameters": self.parameters,
        });
        if self.resource_group.is_none() {
            if let Some(location) = &self.location {
                return serde_json::json!({ "location": location, "properties": properties });
            }
        }
        serde_json::json!({ "properties": properties })
    }

    #[allow(clippy::indexing_slicing)] // serde_json Value indexing returns Null on a miss
    async fn poll_until_settled(&self) -> anyhow::Result<Value> {
        let path = self.deployment_path();
        loop {
            let response = self
                .backend
                .request(Method::GET, path.clone())
                .send()
                .await?;

            let state = response["properties"]["provisioningState"]
                .as_str()
                .unwrap_or_default()
                .to_string();

            debug!("deployment {} provisioningState: {state}", self.deployment_name);
            match state.as_str() {
                "Succeeded" | "Failed" | "Canceled" => return Ok(response),
                _ => tokio::time::sleep(Duration::from_secs(5)).await,
            }
        }
    }
}

#[async_trait]
impl<'a> DeploymentDriver for ArmDeploymentDriver<'a> {
    async fn attempt(&self) -> Result<AttemptOutcome, MpfError> {
        let path = self.deployment_path();
        self.backend
            .request(Method::PUT, path)
            .json(self.deployment_body())
            .send()
            .await?;

        let settled = self.poll_until_settled().await?;
        let outcome = classify_settled_deployment(&settled)?;
        if matches!(outcome, AttemptOutcome::Success) {
            info!("deployment {} succeeded", self.deployment_name);
        }
        Ok(outcome)
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        let path = self.deployment_path();
        self.backend.request(Method::DELETE, path).send().await?;
        info!("cleaned up deployment {}", self.deployment_name);
        Ok(())
    }
}

/// ARM parameter files wrap the actual parameters map in a
/// `{"$schema": ..., "parameters": {...}}` envelope; the deployment
/// body wants the inner map only.
fn strip_parameters_file_envelope(parameters: Value) -> Value {
    if let Some(inner) = parameters.get("parameters") {
        return inner.clone();
    }
    parameters
}

/// Reads a settled deployment's terminal `provisioningState` and, on
/// failure, distinguishes a malformed template (spec.md §8 scenario 6)
/// from an authorization error the parser should consume.
#[allow(clippy::indexing_slicing)] // serde_json Value indexing returns Null on a miss
fn classify_settled_deployment(settled: &Value) -> Result<AttemptOutcome, MpfError> {
    let state = settled["properties"]["provisioningState"].as_str().unwrap_or_default();
    if state == "Succeeded" {
        return Ok(AttemptOutcome::Success);
    }

    let error = &settled["properties"]["error"];
    let code = error["code"].as_str().unwrap_or_default();
    let message = error["message"].as_str().unwrap_or_default();

    if code == INVALID_TEMPLATE_CODE {
        return Err(MpfError::InvalidTemplate(message.to_string()));
    }

    Ok(AttemptOutcome::AuthorizationFailure(format!("{error:#}")))
}

#[cfg(test)]
mod tests {
    use super::{classify_settled_deployment, strip_parameters_file_envelope};
    use crate::driver::AttemptOutcome;
    use crate::error::MpfError;
    use serde_json::json;

    #[test]
    fn unwraps_standard_parameters_file() {
        let wrapped = json!({ "$schema": "x", "parameters": { "foo": { "value": "bar" } } });
        let unwrapped = strip_parameters_file_envelope(wrapped);
        assert_eq!(unwrapped, json!({ "foo": { "value": "bar" } }));
    }

    #[test]
    fn passes_through_already_unwrapped_parameters() {
        let plain = json!({ "foo": { "value": "bar" } });
        assert_eq!(strip_parameters_file_envelope(plain.clone()), plain);
    }

    #[test]
    fn succeeded_deployment_classifies_as_success() {
        let settled = json!({ "properties": { "provisioningState": "Succeeded" } });
        assert!(matches!(classify_settled_deployment(&settled), Ok(AttemptOutcome::Success)));
    }

    #[test]
    fn invalid_template_code_aborts_with_invalid_template() {
        // spec.md §8 scenario 6: aks-invalid-template.json fails with no permissions returned.
        let settled = json!({
            "properties": {
                "provisioningState": "Failed",
                "error": { "code": "InvalidTemplate", "message": "template malformed" }
            }
        });
        match classify_settled_deployment(&settled) {
            Err(MpfError::InvalidTemplate(message)) => assert_eq!(message, "template malformed"),
            other => panic!("expected InvalidTemplate, got {other:?}"),
        }
    }

    #[test]
    fn authorization_failed_error_passes_through_for_the_parser() {
        let settled = json!({
            "properties": {
                "provisioningState": "Failed",
                "error": {
                    "code": "AuthorizationFailed",
                    "message": "The client does not have authorization to perform action 'Microsoft.ContainerService/managedClusters/write'"
                }
            }
        });
        match classify_settled_deployment(&settled) {
            Ok(AttemptOutcome::AuthorizationFailure(text)) => {
                assert!(text.contains("Microsoft.ContainerService/managedClusters/write"));
            }
            other => panic!("expected AuthorizationFailure, got {other:?}"),
        }
    }
}
