//! The iteration controller (§4.1): RESET_RBAC, SEED_ROLE, ASSIGN,
//! WAIT_PROPAGATE, ATTEMPT, PARSE, MERGE, UPDATE_ROLE, repeat until
//! success, iteration cap, or hard error. CLEANUP always runs.
//!
//! Grounded on `original_source/pkg/usecase/mpfService.go`'s
//! `MPFService`/`GetMinimumPermissionsRequired`/`CleanUpResources`.

use crate::{
    error::{MpfError, PartialFailure},
    driver::{AttemptOutcome, DeploymentDriver},
    models::{config::Role, result::MpfResult},
    parser,
    rbac::RbacManager,
};
use anyhow::Result;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Delay after RESET_RBAC before the first role is even created, giving
/// Azure time to finish propagating the mass role-assignment deletion.
const RESET_PROPAGATION_DELAY: Duration = Duration::from_secs(90);
/// Delay after every subsequent role/assignment update.
const UPDATE_PROPAGATION_DELAY: Duration = Duration::from_secs(5);
/// Hard ceiling on ATTEMPT iterations; exceeding this aborts the run but
/// still returns whatever permissions were discovered so far.
const MAX_ITERATIONS: u32 = 50;

/// Bootstrap actions granted on the custom role before the first
/// attempt, covering the baseline read access every deployment needs
/// just to enumerate the resource group and its own prior state.
const BOOTSTRAP_ACTIONS: &[&str] = &[
    "Microsoft.Resources/subscriptions/resourceGroups/read",
    "Microsoft.Resources/deployments/read",
    "Microsoft.Resources/deployments/write",
];

type Checkpoint = Box<dyn Fn(&MpfResult) + Send + Sync>;

pub struct Controller<'a> {
    rbac: RbacManager<'a>,
    driver: &'a dyn DeploymentDriver,
    role: Role,
    result: MpfResult,
    checkpoint: Option<Checkpoint>,
    /// Extra actions seeded onto the role's bootstrap list by
    /// [`Controller::resume_from`]; never reported in `result` directly
    /// (see `resume_from`'s doc comment).
    resumed_bootstrap_actions: Vec<String>,
    auto_add_read: bool,
    auto_add_delete: bool,
}

impl<'a> Controller<'a> {
    #[must_use]
    pub fn new(rbac: RbacManager<'a>, driver: &'a dyn DeploymentDriver, role: Role) -> Self {
        Self {
            rbac,
            driver,
            role,
            result: MpfResult::new(),
            checkpoint: None,
            resumed_bootstrap_actions: Vec::new(),
            auto_add_read: false,
            auto_add_delete: false,
        }
    }

    /// Configures the MERGE-step sibling-action augmentation (spec.md §4.1
    /// MERGE, §8 "auto-add-read"/"auto-add-delete" testable properties):
    /// for every discovered action ending `/write`, also add the sibling
    /// `/read` and/or `/delete` action at the same scope. Grounded on
    /// `mpfService.go`'s `autoAddReadPermissionForEachWrite`/
    /// `autoAddDeletePermissionForEachWrite`, driven per-verb by the
    /// caller (`armCmd.go`/`bicepCmd.go` pass read-only, `terraformCmd.go`
    /// passes delete-only).
    #[must_use]
    pub fn with_sibling_expansion(mut self, auto_add_read: bool, auto_add_delete: bool) -> Self {
        self.auto_add_read = auto_add_read;
        self.auto_add_delete = auto_add_delete;
        self
    }

    /// Resumes a previous crashed run: seeds the role's bootstrap actions
    /// and iteration count from `.permissionsFromFailedRun.json`'s
    /// contents, so a crash-resumed run does not restart the iteration
    /// budget from zero and does not re-discover already-known
    /// permissions from scratch. The previous run's permissions are
    /// *not* copied into the reported result directly — only genuinely
    /// (re-)discovered permissions are reported, the same as every other
    /// bootstrap action.
    pub fn resume_from(&mut self, previous: MpfResult) {
        self.resumed_bootstrap_actions = previous.required_permissions.into_values().flatten().collect();
        self.result.iteration_count = previous.iteration_count;
    }

    /// Registers a callback invoked with the running result every time the
    /// custom role grows. Used by the Terraform driver's caller to persist
    /// `.permissionsFromFailedRun.json` so a killed process can resume.
    #[must_use]
    pub fn with_checkpoint(mut self, f: impl Fn(&MpfResult) + Send + Sync + 'static) -> Self {
        self.checkpoint = Some(Box::new(f));
        self
    }

    /// Runs the discovery loop to completion (success, iteration cap, or
    /// hard error), then always runs cleanup before returning.
    ///
    /// Only a genuinely successful deployment returns `Ok`. Every other
    /// outcome (iteration cap, parse failure, RBAC provisioning error,
    /// invalid template) returns `Err(PartialFailure)`, matching spec.md
    /// §7's "exits non-zero" propagation policy; the partial result
    /// attached to the error is empty only for `InvalidTemplate`.
    pub async fn run(mut self) -> Result<MpfResult> {
        let outcome = self.run_inner().await;

        if let Err(err) = self.cleanup().await {
            warn!("cleanup failed: {err}");
        }

        match outcome {
            Ok(()) => {
                self.result.normalize();
                Ok(self.result)
            }
            Err(err) => {
                warn!("discovery ended without a successful deployment: {err}");
                self.result.normalize();
                let is_invalid_template = matches!(err.downcast_ref::<MpfError>(), Some(MpfError::InvalidTemplate(_)));
                let result = if is_invalid_template { MpfResult::new() } else { self.result };
                Err(PartialFailure { result, source: err }.into())
            }
        }
    }

    async fn run_inner(&mut self) -> Result<()> {
        info!("RESET_RBAC: detaching all existing role assignments from the service principal");
        self.rbac.detach_all_roles_from_sp().await?;
        tokio::time::sleep(RESET_PROPAGATION_DELAY).await;

        self.role.actions = BOOTSTRAP_ACTIONS.iter().map(|s| (*s).to_string()).collect();
        grow_actions(&mut self.role.actions, self.result.required_permissions.values());
        grow_actions(&mut self.role.actions, std::iter::once(&self.resumed_bootstrap_actions));

        info!("SEED_ROLE: creating the ephemeral custom role");
        self.rbac.create_or_update_custom_role(&mut self.role).await?;
        if let Some(checkpoint) = &self.checkpoint {
            checkpoint(&self.result);
        }

        info!("ASSIGN: attaching the custom role to the service principal");
        self.rbac.assign_role_to_sp(&self.role).await?;
        tokio::time::sleep(UPDATE_PROPAGATION_DELAY).await;

        while self.result.iteration_count < MAX_ITERATIONS {
            self.result.iteration_count += 1;
            info!("ATTEMPT #{}", self.result.iteration_count);

            let outcome = self.driver.attempt().await;
            match outcome {
                Ok(AttemptOutcome::Success) => {
                    info!("deployment succeeded after {} iteration(s)", self.result.iteration_count);
                    return Ok(());
                }
                Ok(AttemptOutcome::AuthorizationFailure(error_text)) => {
                    let mut discovered = parser::parse(&error_text)?;
                    if discovered.is_empty() {
                        anyhow::bail!(MpfError::ParseFailure(error_text));
                    }
                    expand_write_siblings(&mut discovered, self.auto_add_read, self.auto_add_delete);
                    self.result.merge(&discovered);
                    grow_actions(&mut self.role.actions, discovered.values());

                    info!("UPDATE_ROLE: growing the custom role with newly discovered permissions");
                    self.rbac.create_or_update_custom_role(&mut self.role).await?;
                    if let Some(checkpoint) = &self.checkpoint {
                        checkpoint(&self.result);
                    }
                    tokio::time::sleep(UPDATE_PROPAGATION_DELAY).await;
                }
                Err(MpfError::RetryWithoutChange) => {
                    info!("transient failure, retrying without changing RBAC state");
                    tokio::time::sleep(UPDATE_PROPAGATION_DELAY).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(MpfError::IterationLimitReached(MAX_ITERATIONS).into())
    }

    async fn cleanup(&self) -> Result<()> {
        self.driver.cleanup().await?;
        self.rbac.detach_all_roles_from_sp().await?;
        self.rbac.delete_custom_role(&self.role).await?;
        Ok(())
    }
}

/// Appends every action from `groups` onto `actions` that isn't already
/// present (§8 invariant: "after `UPDATE_ROLE`, actions on the role equal
/// bootstrap ∪ discovered \ invalid-actions-rejected-so-far").
fn grow_actions<'a>(actions: &mut Vec<String>, groups: impl Iterator<Item = &'a Vec<String>>) {
    for group in groups {
        for action in group {
            if !actions.contains(action) {
                actions.push(action.clone());
            }
        }
    }
}

/// MERGE-step sibling expansion (§8 auto-add-read/auto-add-delete): for
/// every action ending `/write` at a given scope, adds the sibling
/// `/read` and/or `/delete` action at that same scope. Grounded on
/// `mpfService.go`'s per-scope `scpMp[scope] = append(scpMp[scope],
/// readPermission)` loop, run before the scope map is merged into the
/// running result.
fn expand_write_siblings(discovered: &mut BTreeMap<String, Vec<String>>, auto_add_read: bool, auto_add_delete: bool) {
    if !auto_add_read && !auto_add_delete {
        return;
    }
    for actions in discovered.values_mut() {
        let mut siblings = Vec::new();
        for action in actions.iter() {
            let Some(prefix) = action.strip_suffix("/write") else {
                continue;
            };
            if auto_add_read {
                siblings.push(format!("{prefix}/read"));
            }
            if auto_add_delete {
                siblings.push(format!("{prefix}/delete"));
            }
        }
        for sibling in siblings {
            if !actions.contains(&sibling) {
                actions.push(sibling);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{expand_write_siblings, grow_actions};
    use std::collections::BTreeMap;

    #[test]
    fn grow_actions_dedups_against_existing_and_across_groups() {
        let mut actions = vec!["Microsoft.Resources/deployments/read".to_string()];
        let discovered: BTreeMap<String, Vec<String>> = BTreeMap::from([
            (
                "/subscriptions/sub".to_string(),
                vec!["Microsoft.Resources/deployments/read".to_string(), "Microsoft.ContainerService/managedClusters/write".to_string()],
            ),
            (
                "/subscriptions/sub/resourceGroups/rg".to_string(),
                vec!["Microsoft.ContainerService/managedClusters/write".to_string(), "Microsoft.Network/virtualNetworks/read".to_string()],
            ),
        ]);

        grow_actions(&mut actions, discovered.values());

        assert_eq!(
            actions,
            vec![
                "Microsoft.Resources/deployments/read".to_string(),
                "Microsoft.ContainerService/managedClusters/write".to_string(),
                "Microsoft.Network/virtualNetworks/read".to_string(),
            ]
        );
    }

    #[test]
    fn grow_actions_accumulates_to_scenario_sized_totals_across_iterations() {
        // Mirrors spec.md §8 scenario 1: 9 distinct actions surface across
        // several ATTEMPT iterations as the role grows one rejection at a time.
        let mut actions = vec![
            "Microsoft.Resources/subscriptions/resourceGroups/read".to_string(),
            "Microsoft.Resources/deployments/read".to_string(),
            "Microsoft.Resources/deployments/write".to_string(),
        ];
        let rounds: Vec<BTreeMap<String, Vec<String>>> = vec![
            BTreeMap::from([(
                "/subscriptions/sub".to_string(),
                vec!["Microsoft.ContainerService/managedClusters/read".to_string(), "Microsoft.ContainerService/managedClusters/write".to_string()],
            )]),
            BTreeMap::from([(
                "/subscriptions/sub".to_string(),
                vec!["Microsoft.Network/virtualNetworks/read".to_string(), "Microsoft.Network/virtualNetworks/write".to_string()],
            )]),
            BTreeMap::from([(
                "/subscriptions/sub".to_string(),
                vec![
                    "Microsoft.Network/virtualNetworks/subnets/read".to_string(),
                    "Microsoft.Network/virtualNetworks/subnets/write".to_string(),
                    "Microsoft.Network/virtualNetworks/subnets/join/action".to_string(),
                ],
            )]),
        ];

        for round in &rounds {
            grow_actions(&mut actions, round.values());
        }

        assert_eq!(actions.len(), 9);
    }

    #[test]
    fn expand_write_siblings_adds_read_only_when_configured() {
        let mut discovered: BTreeMap<String, Vec<String>> =
            BTreeMap::from([("/subscriptions/sub".to_string(), vec!["Microsoft.Compute/virtualMachines/write".to_string()])]);

        expand_write_siblings(&mut discovered, true, false);

        assert_eq!(
            discovered["/subscriptions/sub"],
            vec![
                "Microsoft.Compute/virtualMachines/write".to_string(),
                "Microsoft.Compute/virtualMachines/read".to_string(),
            ]
        );
    }

    #[test]
    fn expand_write_siblings_adds_delete_only_when_configured() {
        let mut discovered: BTreeMap<String, Vec<String>> =
            BTreeMap::from([("/subscriptions/sub".to_string(), vec!["Microsoft.Compute/virtualMachines/write".to_string()])]);

        expand_write_siblings(&mut discovered, false, true);

        assert_eq!(
            discovered["/subscriptions/sub"],
            vec![
                "Microsoft.Compute/virtualMachines/write".to_string(),
                "Microsoft.Compute/virtualMachines/delete".to_string(),
            ]
        );
    }

    #[test]
    fn expand_write_siblings_leaves_non_write_actions_alone() {
        let mut discovered: BTreeMap<String, Vec<String>> =
            BTreeMap::from([("/subscriptions/sub".to_string(), vec!["Microsoft.Compute/virtualMachines/read".to_string()])]);

        expand_write_siblings(&mut discovered, true, true);

        assert_eq!(discovered["/subscriptions/sub"], vec!["Microsoft.Compute/virtualMachines/read".to_string()]);
    }

    #[test]
    fn expand_write_siblings_does_not_duplicate_an_already_present_sibling() {
        let mut discovered: BTreeMap<String, Vec<String>> = BTreeMap::from([(
            "/subscriptions/sub".to_string(),
            vec![
                "Microsoft.Compute/virtualMachines/write".to_string(),
                "Microsoft.Compute/virtualMachines/read".to_string(),
            ],
        )]);

        expand_write_siblings(&mut discovered, true, false);

        assert_eq!(
            discovered["/subscriptions/sub"],
            vec![
                "Microsoft.Compute/virtualMachines/write".to_string(),
                "Microsoft.Compute/virtualMachines/read".to_string(),
            ]
        );
    }
}
