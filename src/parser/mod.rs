//! The authorization-error parser: turns one deployment engine's error
//! text into a `scope -> [action]` map.
//!
//! Grounded on `original_source/pkg/domain/authorizationErrorParser.go`,
//! with one deliberate departure from it: the Go source's dispatcher is
//! a `switch` that runs at most one dialect handler per call, in a fixed
//! priority order. spec.md's description of this component is explicit
//! that "multiple [dialects] may co-exist in a single response body" and
//! that the parser "runs each matching handler, and merges the resulting
//! maps" — a true union, not a first-match switch. This module
//! implements that union: every dialect whose marker substring is
//! present gets to contribute findings, and all of them are merged
//! before special-case augmentation runs.

pub mod action_completion;
pub mod dialects;
pub mod special_cases;

use action_completion::complete_partial_action;
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::warn;

/// Parses one deployment engine's authorization-failure text into a
/// `scope -> [action]` map. Returns an empty map (not an error) when the
/// text contains none of the recognized dialect markers at all, since an
/// empty body is itself a legitimate "nothing new learned" outcome for
/// the controller's retry loop; callers that need to distinguish "no
/// authorization error present" from "parsed to nothing" should check
/// [`dialects::looks_like_authorization_error`] first.
pub fn parse(body: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let mut found = Vec::new();
    found.extend(dialects::authorization_failed(body));
    found.extend(dialects::authorization_failed_template(body));
    found.extend(dialects::linked_access_check_failed(body));
    found.extend(dialects::authorization_permission_mismatch(body));
    found.extend(dialects::lack_of_permissions(body));

    // LinkedAuthorizationFailed findings get their action completed
    // against their own scope before merging; every other dialect's
    // action is already a full action string.
    for finding in dialects::linked_authorization_failed(body) {
        match complete_partial_action(&finding.action, &finding.scope) {
            Ok(action) => found.push(dialects::Finding {
                action,
                scope: finding.scope,
            }),
            Err(err) => warn!("unable to complete partial action '{}': {err}", finding.action),
        }
    }

    let mut required: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for finding in found {
        let entry = required.entry(finding.scope).or_default();
        if !entry.contains(&finding.action) {
            entry.push(finding.action);
        }
    }

    special_cases::append_special_cases(&mut required);

    Ok(required)
}

#[cfg(test)]
mod tests {
    use super::parse;

    #[test]
    fn single_dialect_yields_one_scope() {
        let body = "The client 'abc' with object id 'def' does not have authorization to perform action 'Microsoft.Resources/subscriptions/resourceGroups/read' over scope '/subscriptions/sub' or the scope is invalid.";
        let found = parse(body).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("/subscriptions/sub"));
    }

    #[test]
    fn combined_dialects_yield_distinct_scopes() {
        // AuthorizationFailed over one scope and LinkedAuthorizationFailed
        // over another distinct scope in the same body: both dialects'
        // findings must survive the merge, not just whichever matched first.
        let body = "The client 'abc' with object id 'def' does not have authorization to perform action 'Microsoft.Resources/subscriptions/resourceGroups/read' over scope '/subscriptions/sub/resourceGroups/rg1' or the scope is invalid. does not have permission to perform action(s) 'Microsoft.Compute/virtualMachines/write' on the linked scope(s) '/subscriptions/sub/resourceGroups/rg2' (respectively) or the linked scope(s) are invalid";
        let found = parse(body).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains_key("/subscriptions/sub/resourceGroups/rg1"));
        assert!(found.contains_key("/subscriptions/sub/resourceGroups/rg2"));
    }

    #[test]
    fn unrecognized_body_yields_empty_map() {
        let found = parse("completely unrelated failure").unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn linked_authorization_failed_read_on_rg_scope_completes_to_rg_read() {
        // spec.md §8 parser seed: LinkedAuthorizationFailed `/read` on a RG
        // scope completes to Microsoft.Resources/subscriptions/resourceGroups/read.
        let body = "does not have permission to perform action(s) '/read' on the linked scope(s) '/subscriptions/sub/resourceGroups/rg' (respectively) or the linked scope(s) are invalid";
        let found = parse(body).unwrap();
        assert_eq!(
            found.get("/subscriptions/sub/resourceGroups/rg"),
            Some(&vec!["Microsoft.Resources/subscriptions/resourceGroups/read".to_string()])
        );
    }
}
