//! ARM What-If deployment driver: evaluates the deployment without
//! applying it, by polling the async What-If operation until Azure
//! reports a result or error.
//!
//! Grounded on
//! `original_source/pkg/infrastructure/authorizationCheckers/ARMTemplateWhatIf/armTemplateWhatIfAuthorizationChecker.go`'s
//! `GetWhatIfResp` polling loop (500ms interval, 50 retries).

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

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_POLLS: u32 = 50;
const INVALID_TEMPLATE_CODE: &str = "InvalidTemplate";

pub struct ArmWhatIfDriver<'a> {
    backend: &'a Backend,
    subscription_id: String,
    resource_group: Option<ResourceGroup>,
    deployment_name: String,
    template: Value,
    parameters: Value,
    location: Option<String>,
}

impl<'a> ArmWhatIfDriver<'a> {
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
            parameters,
            location,
        }
    }

    fn whatif_path(&self) -> String {
        match &self.resource_group {
            Some(rg) => format!(
                "{}/providers/Microsoft.Resources/deployments/{}/whatIf",
                rg.id, self.deployment_name
            ),
            None => format!(
                "/subscriptions/{}/providers/Microsoft.Resources/deployments/{}/whatIf",
                self.subscription_id, self.deployment_name
            ),
        }
    }

    fn whatif_body(&self) -> Value {
        let properties = serde_json::json!({
            "mode": "Incremental",
            "template": self.template,
            "parameters": self.parameters,
            "whatIfSettings": { "resultFormat": "ResourceIdOnly" },
        });
        if self.resource_group.is_none() {
            if let Some(location) = &self.location {
                return serde_json::json!({ "location": location, "properties": properties });
            }
        }
        serde_json::json!({ "properties": properties })
    }
}

#[async_trait]
impl<'a> DeploymentDriver for ArmWhatIfDriver<'a> {
    #[allow(clippy::indexing_slicing)] // serde_json Value indexing returns Null on a miss
    async fn attempt(&self) -> Result<AttemptOutcome, MpfError> {
        let path = self.whatif_path();
        let mut response = self
            .backend
            .request(Method::POST, path.clone())
            .json(self.whatif_body())
            .send()
            .await?;

        for poll in 0..MAX_POLLS {
            let status = response["status"].as_str().unwrap_or_default();
            debug!("what-if poll {poll}: status {status}");
            if status != "Running" && status != "Accepted" && !status.is_empty() {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            response = self.backend.request(Method::GET, path.clone()).send().await?;
        }

        let outcome = classify_whatif_response(&response)?;
        if matches!(outcome, AttemptOutcome::Success) {
            info!("what-if for deployment {} reported no errors", self.deployment_name);
        }
        Ok(outcome)
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        // What-If never applies anything, so there is nothing to tear down.
        Ok(())
    }
}

/// Reads a settled What-If response's top-level `error`, distinguishing
/// a malformed template from an authorization error the parser consumes.
#[allow(clippy::indexing_slicing)] // serde_json Value indexing returns Null on a miss
fn classify_whatif_response(response: &Value) -> Result<AttemptOutcome, MpfError> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        let code = error["code"].as_str().unwrap_or_default();
        let message = error["message"].as_str().unwrap_or_default();
        if code == INVALID_TEMPLATE_CODE {
            return Err(MpfError::InvalidTemplate(message.to_string()));
        }
        return Ok(AttemptOutcome::AuthorizationFailure(format!("{error:#}")));
    }
    Ok(AttemptOutcome::Success)
}

#[cfg(test)]
mod tests {
    use super::classify_whatif_response;
    use crate::{driver::AttemptOutcome, error::MpfError};
    use serde_json::json;

    #[test]
    fn no_error_field_classifies_as_success() {
        let response = json!({ "status": "Succeeded" });
        assert!(matches!(classify_whatif_response(&response), Ok(AttemptOutcome::Success)));
    }

    #[test]
    fn null_error_field_classifies_as_success() {
        let response = json!({ "status": "Succeeded", "error": null });
        assert!(matches!(classify_whatif_response(&response), Ok(AttemptOutcome::Success)));
    }

    #[test]
    fn invalid_template_code_aborts_with_invalid_template() {
        let response = json!({ "error": { "code": "InvalidTemplate", "message": "bad template" } });
        match classify_whatif_response(&response) {
            Err(MpfError::InvalidTemplate(message)) => assert_eq!(message, "bad template"),
            other => panic!("expected InvalidTemplate, got {other:?}"),
        }
    }

    #[test]
    fn authorization_error_passes_through_for_the_parser() {
        let response = json!({
            "error": {
                "code": "AuthorizationFailed",
                "message": "does not have authorization to perform action 'Microsoft.Resources/subscriptions/resourceGroups/write'"
            }
        });
        match classify_whatif_response(&response) {
            Ok(AttemptOutcome::AuthorizationFailure(text)) => {
                assert!(text.contains("Microsoft.Resources/subscriptions/resourceGroups/write"));
            }
            other => panic!("expected AuthorizationFailure, got {other:?}"),
        }
    }
}
