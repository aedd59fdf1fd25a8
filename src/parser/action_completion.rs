//! Completes a partial action string (as emitted by the
//! `LinkedAuthorizationFailed` dialect, e.g. `/read`) into a full action
//! string, based on the *shape* of the scope it was reported against.
//!
//! Grounded on `original_source/pkg/domain/actionCompletion.go`. The Go
//! source only ever handles the `/read` suffix against a resource-group or
//! subscription scope; anything else is passed through unchanged (a
//! non-`/read` action) or rejected (an unrecognized scope shape).

use anyhow::{bail, Result};
use regex::Regex;
use std::sync::LazyLock;

// Both patterns are string literals fixed at compile time; a failed
// `Regex::new` here is a bug in this file, not a runtime condition to
// propagate.
#[allow(clippy::expect_used)]
static RESOURCE_GROUP_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^/subscriptions/[^/]+/resourceGroups/[^/]+$").expect("static regex is valid"));
#[allow(clippy::expect_used)]
static SUBSCRIPTION_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/subscriptions/[^/]+$").expect("static regex is valid"));

pub fn complete_partial_action(action: &str, scope: &str) -> Result<String> {
    if action.is_empty() {
        bail!("cannot complete an empty action");
    }
    if action != "/read" {
        return Ok(action.to_string());
    }

    if RESOURCE_GROUP_SCOPE.is_match(scope) {
        return Ok("Microsoft.Resources/subscriptions/resourceGroups/read".to_string());
    }
    if SUBSCRIPTION_SCOPE.is_match(scope) {
        return Ok("Microsoft.Resources/subscriptions/read".to_string());
    }

    bail!("unable to complete partial action '{action}' for unrecognized scope pattern: {scope}");
}

#[cfg(test)]
mod tests {
    use super::complete_partial_action;

    #[test]
    fn completes_read_action_on_resource_group_scope() {
        let action = complete_partial_action("/read", "/subscriptions/sub/resourceGroups/rg").unwrap();
        assert_eq!(action, "Microsoft.Resources/subscriptions/resourceGroups/read");
    }

    #[test]
    fn completes_read_action_on_subscription_scope() {
        let action = complete_partial_action("/read", "/subscriptions/sub").unwrap();
        assert_eq!(action, "Microsoft.Resources/subscriptions/read");
    }

    #[test]
    fn passes_through_non_read_actions_unchanged() {
        let action = complete_partial_action("Microsoft.Storage/storageAccounts/write", "/subscriptions/sub").unwrap();
        assert_eq!(action, "Microsoft.Storage/storageAccounts/write");
    }

    #[test]
    fn rejects_empty_action() {
        assert!(complete_partial_action("", "/subscriptions/sub").is_err());
    }

    #[test]
    fn rejects_scope_without_recognized_shape() {
        let scope = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/myacct";
        assert!(complete_partial_action("/read", scope).is_err());
    }
}
