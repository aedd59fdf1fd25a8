//! A small fixed table of permissions that Azure requires in practice
//! but never mentions in the authorization error for the action that
//! actually triggers them.
//!
//! Grounded on `original_source/pkg/domain/appendPermissionsForSpecialCases.go`'s
//! `toAppendSpecialCasePermissions` map. Applied once, after every
//! dialect handler has run and its findings have been merged.

use std::collections::BTreeMap;

const READ: &str = "Microsoft.Insights/components/read";
const WRITE: &str = "Microsoft.Insights/components/write";

fn companions_for(action: &str) -> &'static [&'static str] {
    match action {
        _ if action == READ => &[
            "Microsoft.Insights/components/currentbillingfeatures/read",
            "Microsoft.AlertsManagement/smartDetectorAlertRules/read",
        ],
        _ if action == WRITE => &[
            "Microsoft.Insights/components/currentbillingfeatures/write",
            "Microsoft.AlertsManagement/smartDetectorAlertRules/write",
        ],
        _ => &[],
    }
}

/// Walks every scope's action list and appends each action's companion
/// permissions, if any, at the same scope.
pub fn append_special_cases(required: &mut BTreeMap<String, Vec<String>>) {
    for actions in required.values_mut() {
        let mut additions = Vec::new();
        for action in actions.iter() {
            for companion in companions_for(action) {
                if !actions.contains(&(*companion).to_string()) && !additions.contains(&(*companion).to_string()) {
                    additions.push((*companion).to_string());
                }
            }
        }
        actions.extend(additions);
    }
}

#[cfg(test)]
mod tests {
    use super::append_special_cases;
    use std::collections::BTreeMap;

    #[test]
    fn read_action_pulls_in_both_companions() {
        let mut required = BTreeMap::new();
        required.insert(
            "/subscriptions/sub".to_string(),
            vec!["Microsoft.Insights/components/read".to_string()],
        );
        append_special_cases(&mut required);
        let actions = &required["/subscriptions/sub"];
        assert!(actions.contains(&"Microsoft.Insights/components/currentbillingfeatures/read".to_string()));
        assert!(actions.contains(&"Microsoft.AlertsManagement/smartDetectorAlertRules/read".to_string()));
    }

    #[test]
    fn write_action_pulls_in_both_companions() {
        let mut required = BTreeMap::new();
        required.insert(
            "/subscriptions/sub".to_string(),
            vec!["Microsoft.Insights/components/write".to_string()],
        );
        append_special_cases(&mut required);
        let actions = &required["/subscriptions/sub"];
        assert_eq!(actions.len(), 3);
    }

    #[test]
    fn unrelated_actions_are_untouched() {
        let mut required = BTreeMap::new();
        required.insert(
            "/subscriptions/sub".to_string(),
            vec!["Microsoft.Resources/read".to_string()],
        );
        append_special_cases(&mut required);
        assert_eq!(required["/subscriptions/sub"].len(), 1);
    }
}
