//! Presentation (§6): a sorted flat action list by default, an optional
//! per-scope breakdown, or the raw map as JSON.
//!
//! Grounded on `original_source/pkg/presentation/defaultFormatter.go` and
//! `jsonFormatter.go`. The custom role this tool assigns is always
//! subscription-scoped regardless of which scope an individual action was
//! discovered at, so the "canonical" list the Go original keys off its
//! default resource group resource ID is, here, simply every discovered
//! action flattened and deduplicated.
use crate::models::result::MpfResult;
use std::fmt::Write as _;

#[must_use]
pub fn format_json(result: &MpfResult) -> String {
    serde_json::to_string(&result.required_permissions).unwrap_or_default()
}

#[must_use]
pub fn format_text(result: &MpfResult, show_detailed_output: bool) -> String {
    let mut canonical: Vec<&String> = result.required_permissions.values().flatten().collect();
    canonical.sort();
    canonical.dedup();

    let separator = "-".repeat(148);
    let mut out = String::new();
    let _ = writeln!(out, "{separator}");
    let _ = writeln!(out, "Permissions Required:");
    let _ = writeln!(out, "{separator}");
    for action in &canonical {
        let _ = writeln!(out, "{action}");
    }
    let _ = writeln!(out, "{separator}");

    if !show_detailed_output {
        return out;
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Break down of permissions by different resource types:");
    let _ = writeln!(out);
    for (scope, actions) in &result.required_permissions {
        let mut actions: Vec<&String> = actions.iter().collect();
        actions.sort();
        let _ = writeln!(out, "Permissions required for {scope}:");
        for action in actions {
            let _ = writeln!(out, "{action}");
        }
        let _ = writeln!(out, "--------------");
        let _ = writeln!(out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{format_json, format_text};
    use crate::models::result::MpfResult;
    use std::collections::BTreeMap;

    fn sample() -> MpfResult {
        let mut required_permissions = BTreeMap::new();
        required_permissions.insert(
            "/subscriptions/sub".to_string(),
            vec!["b/write".to_string(), "a/read".to_string()],
        );
        required_permissions.insert(
            "/subscriptions/sub/resourceGroups/rg".to_string(),
            vec!["c/read".to_string()],
        );
        MpfResult {
            required_permissions,
            iteration_count: 3,
        }
    }

    #[test]
    fn text_output_flattens_and_sorts_the_canonical_list() {
        let text = format_text(&sample(), false);
        let permissions_block = text.split("Permissions Required:").nth(1).unwrap();
        assert!(permissions_block.find("a/read").unwrap() < permissions_block.find("b/write").unwrap());
        assert!(permissions_block.find("b/write").unwrap() < permissions_block.find("c/read").unwrap());
        assert!(!text.contains("Break down"));
    }

    #[test]
    fn detailed_output_includes_per_scope_breakdown() {
        let text = format_text(&sample(), true);
        assert!(text.contains("Break down of permissions by different resource types"));
        assert!(text.contains("/subscriptions/sub/resourceGroups/rg"));
    }

    #[test]
    fn json_output_is_the_raw_map() {
        let json = format_json(&sample());
        let parsed: BTreeMap<String, Vec<String>> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
    }
}
