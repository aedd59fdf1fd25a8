//! Wire model for Azure custom role definitions.
//!
//! Grounded on the teacher's `models/definitions.rs`, narrowed to the
//! fields this crate actually reads or writes: a custom role only ever
//! has one assignable scope (the subscription under test) and this tool
//! never touches built-in roles.

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Serialize)]
pub struct RoleDefinitionList {
    pub value: Vec<RoleDefinition>,
}

#[derive(Deserialize, Debug, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RoleDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub properties: RoleDefinitionProperties,
}

#[derive(Deserialize, Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct RoleDefinitionProperties {
    pub role_name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub assignable_scopes: Vec<String>,
    pub permissions: Vec<Permission>,
}

#[derive(Deserialize, Debug, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct Permission {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub actions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub not_actions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub data_actions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub not_data_actions: Vec<String>,
}

impl RoleDefinition {
    /// Builds the PUT body for creating or updating the ephemeral custom
    /// role, given the current full set of actions it should grant.
    #[must_use]
    pub fn for_actions(
        role_name: &str,
        description: &str,
        assignable_scope: &str,
        actions: Vec<String>,
        data_actions: Vec<String>,
    ) -> Self {
        Self {
            id: None,
            name: None,
            properties: RoleDefinitionProperties {
                role_name: role_name.to_string(),
                description: description.to_string(),
                type_: "CustomRole".to_string(),
                assignable_scopes: vec![assignable_scope.to_string()],
                permissions: vec![Permission {
                    actions,
                    not_actions: Vec::new(),
                    data_actions,
                    not_data_actions: Vec::new(),
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RoleDefinition;

    #[test]
    fn build_role_definition_body() {
        let def = RoleDefinition::for_actions(
            "tmp-rol-abc1234",
            "az-mpf discovery role",
            "/subscriptions/00000000-0000-0000-0000-000000000000",
            vec!["Microsoft.Resources/subscriptions/resourceGroups/read".to_string()],
            vec![],
        );
        assert_eq!(def.properties.permissions.len(), 1);
        assert_eq!(def.properties.permissions[0].actions.len(), 1);
        assert!(def.properties.permissions[0].data_actions.is_empty());
    }
}
