//! Wire model for Azure role assignments, narrowed to what RESET_RBAC
//! needs: enumerate every assignment held by the SP under test and
//! delete each one.
//!
//! Grounded on the teacher's `models/roles.rs` (`RoleAssignments::parse`),
//! dropping the PIM eligibility/Graph-object fields this tool never uses.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RoleAssignment {
    pub name: String,
    pub id: String,
    pub role_definition_id: String,
    pub scope: String,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct RoleAssignments(pub Vec<RoleAssignment>);

impl RoleAssignments {
    // serde_json's indexing returns `Value::Null` on a miss rather than panicking.
    #[allow(clippy::indexing_slicing)]
    pub(crate) fn parse(body: &Value) -> Result<Self> {
        let Some(values) = body["value"].as_array() else {
            bail!("unable to parse role assignment list response: missing value array: {body:#?}");
        };

        let mut results = Vec::with_capacity(values.len());
        for entry in values {
            let Some(name) = entry["name"].as_str().map(ToString::to_string) else {
                bail!("role assignment missing name: {entry:#?}");
            };
            let Some(id) = entry["id"].as_str().map(ToString::to_string) else {
                bail!("role assignment missing id: {entry:#?}");
            };
            let Some(role_definition_id) = entry["properties"]["roleDefinitionId"]
                .as_str()
                .map(ToString::to_string)
            else {
                bail!("role assignment missing roleDefinitionId: {entry:#?}");
            };
            let Some(scope) = entry["properties"]["scope"].as_str().map(ToString::to_string)
            else {
                bail!("role assignment missing scope: {entry:#?}");
            };

            results.push(RoleAssignment {
                name,
                id,
                role_definition_id,
                scope,
            });
        }

        Ok(Self(results))
    }
}

#[cfg(test)]
mod tests {
    use super::RoleAssignments;
    use serde_json::json;

    #[test]
    fn parses_assignment_list() {
        let body = json!({
            "value": [{
                "name": "11111111-1111-1111-1111-111111111111",
                "id": "/subscriptions/sub/providers/Microsoft.Authorization/roleAssignments/11111111-1111-1111-1111-111111111111",
                "properties": {
                    "roleDefinitionId": "/subscriptions/sub/providers/Microsoft.Authorization/roleDefinitions/abc",
                    "scope": "/subscriptions/sub",
                    "principalId": "sp-object-id"
                }
            }]
        });
        let parsed = RoleAssignments::parse(&body).unwrap();
        assert_eq!(parsed.0.len(), 1);
        assert_eq!(parsed.0[0].scope, "/subscriptions/sub");
    }

    #[test]
    fn rejects_missing_value_array() {
        let body = json!({});
        assert!(RoleAssignments::parse(&body).is_err());
    }
}
