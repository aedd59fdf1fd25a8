//! RBAC state manager (§4.3): creates and grows the ephemeral custom
//! role, assigns and detaches it from the SP under test, and tears
//! everything down on cleanup.
//!
//! Grounded on
//! `original_source/pkg/infrastructure/spRoleAssignmentManager/defaultSPRoleAssignmentManager.go`.

use crate::{
    backend::Backend,
    models::{
        config::{Role, ServicePrincipal},
        role_assignment::RoleAssignments,
        role_definition::{RoleDefinition, RoleDefinitionList},
    },
    parser::dialects::invalid_action,
};
use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{info, warn};

/// How many times `create_or_update_custom_role` will strip a freshly
/// rejected `InvalidActionOrNotAction` action and retry, rather than
/// failing the whole run over one bad action string.
const INVALID_ACTION_RETRY_COUNT: usize = 5;

pub struct RbacManager<'a> {
    backend: &'a Backend,
    subscription_id: String,
    sp: &'a ServicePrincipal,
}

impl<'a> RbacManager<'a> {
    #[must_use]
    pub fn new(backend: &'a Backend, subscription_id: String, sp: &'a ServicePrincipal) -> Self {
        Self {
            backend,
            subscription_id,
            sp,
        }
    }

    fn subscription_scope(&self) -> String {
        format!("/subscriptions/{}", self.subscription_id)
    }

    /// Creates or updates the ephemeral custom role so that its actions
    /// equal `role.actions` / `role.data_actions`. If Azure rejects one
    /// or more actions as `InvalidActionOrNotAction`, those actions are
    /// stripped from the role in memory and the PUT is retried, up to
    /// [`INVALID_ACTION_RETRY_COUNT`] times.
    pub async fn create_or_update_custom_role(&self, role: &mut Role) -> Result<()> {
        let scope = self.subscription_scope();
        for attempt in 0..=INVALID_ACTION_RETRY_COUNT {
            let body = RoleDefinition::for_actions(
                &role.name,
                "az-mpf discovery role",
                &scope,
                role.actions.clone(),
                role.data_actions.clone(),
            );

            let path = format!(
                "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions/{}",
                self.subscription_id, role.definition_id
            );

            let response = self
                .backend
                .request(Method::PUT, path)
                .json(serde_json::to_value(&body)?)
                .validate(accept_invalid_action_or_not_action)
                .send()
                .await
                .context("creating or updating the custom role")?;

            if let Some(action) = extract_invalid_action(&response) {
                if attempt == INVALID_ACTION_RETRY_COUNT {
                    anyhow::bail!(
                        "custom role update rejected action '{action}' after {INVALID_ACTION_RETRY_COUNT} retries"
                    );
                }
                warn!("azure rejected action '{action}' as InvalidActionOrNotAction, dropping it and retrying");
                role.actions.retain(|a| a != &action);
                role.data_actions.retain(|a| a != &action);
                continue;
            }

            info!("custom role '{}' now grants {} action(s)", role.name, role.actions.len());
            return Ok(());
        }
        unreachable!("loop always returns or bails before exhausting its range")
    }

    /// Assigns the custom role to the SP under test at the subscription
    /// scope.
    pub async fn assign_role_to_sp(&self, role: &Role) -> Result<()> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Authorization/roleAssignments/{}",
            self.subscription_id, role.assignment_id
        );
        let body = serde_json::json!({
            "properties": {
                "roleDefinitionId": role.resource_id,
                "principalId": self.sp.object_id,
                "principalType": "ServicePrincipal",
            }
        });

        self.backend
            .request(Method::PUT, path)
            .json(body)
            .validate(accept_role_assignment_exists)
            .send()
            .await
            .context("assigning the custom role to the service principal")?;
        Ok(())
    }

    /// Enumerates every role assignment held by the SP at or below the
    /// subscription scope and deletes each one, unconditionally. This is
    /// RESET_RBAC: the SP must start each run with zero roles, not just
    /// without the previous run's custom role.
    pub async fn detach_all_roles_from_sp(&self) -> Result<()> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Authorization/roleAssignments",
            self.subscription_id
        );
        let response = self
            .backend
            .request(Method::GET, path)
            .query("$filter", format!("principalId eq '{}'", self.sp.object_id))
            .send()
            .await
            .context("listing role assignments for the service principal")?;

        let assignments = RoleAssignments::parse(&response)?;
        info!("detaching {} existing role assignment(s) from the service principal", assignments.0.len());

        for assignment in assignments.0 {
            let delete_path = format!(
                "/subscriptions/{}/providers/Microsoft.Authorization/roleAssignments/{}",
                self.subscription_id, assignment.name
            );
            self.backend
                .request(Method::DELETE, delete_path)
                .validate(accept_not_found)
                .send()
                .await
                .with_context(|| format!("deleting role assignment {}", assignment.name))?;
        }
        Ok(())
    }

    /// Deletes the ephemeral custom role definition. Logged, not fatal,
    /// on failure: cleanup best-effort here mirrors the Go original's
    /// `DeleteCustomRole`, which logs a read failure rather than
    /// aborting the rest of cleanup.
    pub async fn delete_custom_role(&self, role: &Role) -> Result<()> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions/{}",
            self.subscription_id, role.definition_id
        );
        if let Err(err) = self
            .backend
            .request(Method::DELETE, path)
            .validate(accept_not_found)
            .send()
            .await
        {
            warn!("error deleting custom role {}: {err}", role.name);
        }
        Ok(())
    }

    /// Fetches the custom role's current definition, mostly useful in
    /// tests and diagnostics.
    pub async fn get_custom_role(&self, role: &Role) -> Result<RoleDefinitionList> {
        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions",
            self.subscription_id
        );
        let response = self
            .backend
            .request(Method::GET, path)
            .query("$filter", format!("roleName eq '{}'", role.name))
            .send()
            .await?;
        Ok(serde_json::from_value(response)?)
    }
}

fn accept_invalid_action_or_not_action(status: StatusCode, body: &Value) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if invalid_action(&body.to_string()).is_some() {
        return Ok(());
    }
    anyhow::bail!("unexpected status {status} creating/updating role: {body:#?}")
}

// NOTE: serde_json's indexing returns `Value::Null` on a miss rather than panicking.
#[allow(clippy::indexing_slicing)]
fn accept_role_assignment_exists(status: StatusCode, body: &Value) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let code = body["error"]["code"].as_str().unwrap_or_default();
    if code == "RoleAssignmentExists" || code == "RoleAssignmentRequestExists" {
        return Ok(());
    }
    anyhow::bail!("unexpected status {status} assigning role: {body:#?}")
}

fn accept_not_found(status: StatusCode, body: &Value) -> Result<()> {
    if status.is_success() || status == StatusCode::NOT_FOUND {
        return Ok(());
    }
    anyhow::bail!("unexpected status {status}: {body:#?}")
}

fn extract_invalid_action(body: &Value) -> Option<String> {
    invalid_action(&body.to_string())
}
