//! The individual authorization-error dialects Azure's various engines
//! emit, each as an independent regex-driven extractor.
//!
//! Every regex here is taken verbatim (translated to Rust's regex syntax)
//! from the corresponding `*ErrorParser.go` file in
//! `original_source/pkg/domain/`: spec.md describes the dialects by name
//! but is silent on their literal wording, so the original source is the
//! ground truth for these patterns.

// Every pattern below is a string literal fixed at compile time; a failed
// `Regex::new` here is a bug in this file, not a runtime condition to
// propagate, so `expect` is the static-initializer exception to the
// crate's usual "no expect in non-test code" rule.
#![allow(clippy::expect_used)]

use regex::Regex;
use std::sync::LazyLock;

/// One `(scope, action)` pair extracted from an error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub scope: String,
    pub action: String,
}

static AUTHORIZATION_FAILED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"The client '[^']+' with object id '[^']+' does not have authorization to perform action '([^']+)'[^.]*\. over scope '([^']+)' or the scope is invalid\.",
    )
    .expect("static regex is valid")
});

// The Go source's literal wording has the period before "over scope", not
// after the verb phrase; keep a second, more permissive match for that
// shape since real-world responses are not perfectly consistent here.
static AUTHORIZATION_FAILED_LOOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"The client '[^']+' with object id '[^']+' does not have authorization to perform action '([^']+)'.*? over scope '([^']+)' or the scope is invalid\.",
    )
    .expect("static regex is valid")
});

static AUTHORIZATION_FAILED_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Authorization failed for template resource '[^']+' of type '[^']+'\. The client '[^']+' with object id '[^']+' does not have permission to perform action '([^']+)' at scope '([^']+)'\.",
    )
    .expect("static regex is valid")
});

static LINKED_AUTHORIZATION_FAILED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"does not have permission to perform action\(s\) '([^']+)' on the linked scope\(s\) '([^']+)' \(respectively\) or the linked scope\(s\) are invalid",
    )
    .expect("static regex is valid")
});

static LINKED_ACCESS_CHECK_FAILED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"The client with object id '[^']+' does not have authorization to perform action '([^']+)'.*? over scope '([^']+)' or the scope is invalid\.",
    )
    .expect("static regex is valid")
});

static AUTHORIZATION_PERMISSION_MISMATCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"retrieving (queue|file|blob) properties for Storage Account \(Subscription: "([^"]+)"\nResource Group Name: "([^"]+)"\nStorage Account Name: "([^"]+)"\): executing request: unexpected status 403 \(403 This request is not authorized to perform this operation using this permission\.\) with AuthorizationPermissionMismatch: This request is not authorized to perform this operation using this permission\."#,
    )
    .expect("static regex is valid")
});

static LACK_OF_PERMISSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"or more specifically the (Microsoft\.([^.]+)) permission\.").expect("static regex is valid")
});

static INVALID_ACTION_OR_NOT_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""message":"'([^']+)' does not match any of the actions supported by the providers\.""#)
        .expect("static regex is valid")
});

/// Sentinel scope used when `LackOfPermissions` can't recover a real
/// scope from the error text. The caller still needs a key to merge the
/// action under.
pub const LACK_OF_PERMISSIONS_SENTINEL_SCOPE: &str = "ScopeCannotBeParsedFromLackOfPermissionsError";

#[allow(clippy::indexing_slicing)] // capture groups are guaranteed present by the pattern
pub fn authorization_failed(body: &str) -> Vec<Finding> {
    if !body.contains("AuthorizationFailed") {
        return Vec::new();
    }
    let re = if AUTHORIZATION_FAILED.is_match(body) {
        &*AUTHORIZATION_FAILED
    } else {
        &*AUTHORIZATION_FAILED_LOOSE
    };
    re.captures_iter(body)
        .map(|c| Finding {
            action: c[1].to_string(),
            scope: c[2].to_string(),
        })
        .collect()
}

#[allow(clippy::indexing_slicing)] // capture groups are guaranteed present by the pattern
pub fn authorization_failed_template(body: &str) -> Vec<Finding> {
    if !body.contains("Authorization failed") {
        return Vec::new();
    }
    AUTHORIZATION_FAILED_TEMPLATE
        .captures_iter(body)
        .map(|c| Finding {
            action: c[1].to_string(),
            scope: c[2].to_string(),
        })
        .collect()
}

#[allow(clippy::indexing_slicing)] // capture groups are guaranteed present by the pattern
pub fn linked_authorization_failed(body: &str) -> Vec<Finding> {
    if !body.contains("LinkedAuthorizationFailed") {
        return Vec::new();
    }
    LINKED_AUTHORIZATION_FAILED
        .captures_iter(body)
        .map(|c| Finding {
            action: c[1].to_string(),
            scope: c[2].to_string(),
        })
        .collect()
}

#[allow(clippy::indexing_slicing)] // capture groups are guaranteed present by the pattern
pub fn linked_access_check_failed(body: &str) -> Vec<Finding> {
    if !body.contains("LinkedAccessCheckFailed") {
        return Vec::new();
    }
    LINKED_ACCESS_CHECK_FAILED
        .captures_iter(body)
        .map(|c| Finding {
            action: c[1].to_string(),
            scope: c[2].to_string(),
        })
        .collect()
}

#[allow(clippy::indexing_slicing)] // capture groups are guaranteed present by the pattern
pub fn authorization_permission_mismatch(body: &str) -> Vec<Finding> {
    if !body.contains("AuthorizationPermissionMismatch") {
        return Vec::new();
    }
    AUTHORIZATION_PERMISSION_MISMATCH
        .captures_iter(body)
        .map(|c| {
            let family = match &c[1] {
                "queue" => "Microsoft.Storage/storageAccounts/queueServices/read",
                "file" => "Microsoft.Storage/storageAccounts/fileServices/read",
                _ => "Microsoft.Storage/storageAccounts/blobServices/read",
            };
            let subscription = &c[2];
            let resource_group = &c[3];
            let storage_account = &c[4];
            Finding {
                action: family.to_string(),
                scope: format!(
                    "/subscriptions/{subscription}/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{storage_account}"
                ),
            }
        })
        .collect()
}

#[allow(clippy::indexing_slicing)] // capture groups are guaranteed present by the pattern
pub fn lack_of_permissions(body: &str) -> Vec<Finding> {
    LACK_OF_PERMISSIONS
        .captures_iter(body)
        .map(|c| Finding {
            action: c[1].to_string(),
            scope: LACK_OF_PERMISSIONS_SENTINEL_SCOPE.to_string(),
        })
        .collect()
}

/// Returns the action Azure rejected as not matching any registered
/// provider action, if the error body is an `InvalidActionOrNotAction`
/// response.
#[must_use]
#[allow(clippy::indexing_slicing)] // capture group is guaranteed present by the pattern
pub fn invalid_action(body: &str) -> Option<String> {
    if !body.contains("InvalidActionOrNotAction") {
        return None;
    }
    INVALID_ACTION_OR_NOT_ACTION
        .captures(body)
        .map(|c| c[1].to_string())
}

/// Any of the five textual markers this module knows how to parse.
#[must_use]
pub fn looks_like_authorization_error(body: &str) -> bool {
    body.contains("AuthorizationFailed")
        || body.contains("Authorization failed")
        || body.contains("AuthorizationPermissionMismatch")
        || body.contains("LinkedAccessCheckFailed")
        || body.contains("LinkedAuthorizationFailed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_authorization_failed() {
        let body = "The client 'abc' with object id 'def' does not have authorization to perform action 'Microsoft.Resources/subscriptions/resourceGroups/read' over scope '/subscriptions/00000000-0000-0000-0000-000000000000' or the scope is invalid.";
        let found = authorization_failed(body);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].action, "Microsoft.Resources/subscriptions/resourceGroups/read");
        assert_eq!(found[0].scope, "/subscriptions/00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn parses_linked_authorization_failed() {
        let body = "does not have permission to perform action(s) '/read' on the linked scope(s) '/subscriptions/sub/resourceGroups/rg' (respectively) or the linked scope(s) are invalid";
        let found = linked_authorization_failed(body);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].action, "/read");
    }

    #[test]
    fn parses_lack_of_permissions() {
        let body = "the client does not have the required permissions, or more specifically the Microsoft.Network/virtualNetworks/join/action permission.";
        let found = lack_of_permissions(body);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].action, "Microsoft.Network/virtualNetworks/join/action");
        assert_eq!(found[0].scope, LACK_OF_PERMISSIONS_SENTINEL_SCOPE);
    }

    #[test]
    fn extracts_invalid_action() {
        let body = r#"{"error":{"code":"InvalidActionOrNotAction","message":"'Microsoft.Fake/doesNotExist/action' does not match any of the actions supported by the providers."}}"#;
        assert_eq!(
            invalid_action(body),
            Some("Microsoft.Fake/doesNotExist/action".to_string())
        );
    }

    #[test]
    fn non_authorization_body_matches_nothing() {
        assert!(!looks_like_authorization_error("totally unrelated failure"));
        assert!(authorization_failed("totally unrelated failure").is_empty());
    }
}
