//! The final (or partial) answer the controller produces: a map from
//! scope to the list of actions required at that scope, plus how many
//! iterations it took.
//!
//! Grounded on `original_source/pkg/domain/mpfConfig.go`'s `MPFResult`
//! and `GetMPFResult`/`GetMPFResultWithIterationCount`, and on the
//! dedup/sort step implied by `mpfResultFilterSort_test.go` (the
//! corresponding non-test implementation file was not present in the
//! retrieved pack; the dedup-then-sort behavior below is inferred from
//! that test file's name and from spec.md's Result-model description).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct MpfResult {
    pub required_permissions: BTreeMap<String, Vec<String>>,
    pub iteration_count: u32,
}

impl MpfResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges newly discovered `(scope, action)` pairs into the running
    /// map, keeping each scope's action list free of duplicates.
    pub fn merge(&mut self, discovered: &BTreeMap<String, Vec<String>>) {
        for (scope, actions) in discovered {
            let entry = self.required_permissions.entry(scope.clone()).or_default();
            for action in actions {
                if !entry.contains(action) {
                    entry.push(action.clone());
                }
            }
        }
    }

    /// Deduplicates and lexicographically sorts every scope's action
    /// list, in place. Called once, right before the result is reported.
    pub fn normalize(&mut self) {
        for actions in self.required_permissions.values_mut() {
            actions.sort();
            actions.dedup();
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.required_permissions.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::MpfResult;
    use std::collections::BTreeMap;

    #[test]
    fn merge_deduplicates_within_a_scope() {
        let mut result = MpfResult::new();
        let mut discovered = BTreeMap::new();
        discovered.insert(
            "/subscriptions/sub".to_string(),
            vec!["Microsoft.Resources/read".to_string()],
        );
        result.merge(&discovered);
        result.merge(&discovered);
        assert_eq!(
            result.required_permissions["/subscriptions/sub"],
            vec!["Microsoft.Resources/read".to_string()]
        );
    }

    #[test]
    fn normalize_sorts_each_scopes_actions() {
        let mut result = MpfResult::new();
        result.required_permissions.insert(
            "/subscriptions/sub".to_string(),
            vec!["b/write".to_string(), "a/read".to_string(), "a/read".to_string()],
        );
        result.normalize();
        assert_eq!(
            result.required_permissions["/subscriptions/sub"],
            vec!["a/read".to_string(), "b/write".to_string()]
        );
    }
}
