//! Wires the parsed CLI into a concrete [`DeploymentDriver`] and runs the
//! [`Controller`] to completion, including resource-group lifecycle and
//! Terraform's `.permissionsFromFailedRun.json` resume/checkpoint.
//!
//! Grounded on `original_source/cmd/armCmd.go`/`bicepCmd.go`/`terraformCmd.go`'s
//! `getMPF*` functions, which build the same collaborators in the same
//! order before handing off to `MPFService`.

use crate::{
    backend::Backend,
    cli::{Cli, Command},
    controller::Controller,
    driver::{arm::ArmDeploymentDriver, bicep::BicepDriver, terraform::TerraformDriver, whatif::ArmWhatIfDriver, DeploymentDriver},
    models::{
        config::{prefixed_name, Role},
        result::MpfResult,
    },
    rbac::RbacManager,
    resource_group::ResourceGroupManager,
};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_LOCATION: &str = "eastus2";
const RESUME_FILE_NAME: &str = ".permissionsFromFailedRun.json";

/// Runs one full discovery against the verb selected on the command line.
///
/// # Errors
/// Returns `Err` for anything short of a successful deployment. On every
/// path except [`crate::error::MpfError::InvalidTemplate`] the error
/// downcasts to [`crate::error::PartialFailure`], carrying whatever
/// permissions were discovered before the abort.
pub async fn run(cli: &Cli) -> Result<MpfResult> {
    let backend = Backend::new(&cli.common.sp)?;
    let subscription_id = cli.common.subscription_id.clone();
    let rbac = RbacManager::new(&backend, subscription_id.clone(), &cli.common.sp);
    let role = Role::new_ephemeral(&subscription_id);

    match &cli.command {
        Command::Arm(args) => {
            let resource_group = maybe_create_resource_group(
                &backend,
                &subscription_id,
                &cli.common.resource_group_name_pfx,
                cli.common.location.as_deref(),
                args.subscription_scoped,
            )
            .await?;
            let deployment_name = prefixed_name(&cli.common.deployment_name_pfx);
            let template = read_json(&args.template_file_path).await?;
            let parameters = match &args.parameters_file_path {
                Some(path) => read_json(path).await?,
                None => Value::Null,
            };
            let location = args
                .subscription_scoped
                .then(|| cli.common.location.clone().unwrap_or_else(|| DEFAULT_LOCATION.to_string()));
            let driver = ArmDeploymentDriver::new(
                &backend,
                subscription_id.clone(),
                resource_group.clone(),
                deployment_name,
                template,
                parameters,
                location,
            );
            let result = run_with_driver(rbac, &driver, role).await;
            cleanup_resource_group(&backend, resource_group).await;
            result
        }
        Command::ArmWhatIf(args) => {
            let resource_group = maybe_create_resource_group(
                &backend,
                &subscription_id,
                &cli.common.resource_group_name_pfx,
                cli.common.location.as_deref(),
                args.subscription_scoped,
            )
            .await?;
            let deployment_name = prefixed_name(&cli.common.deployment_name_pfx);
            let template = read_json(&args.template_file_path).await?;
            let parameters = match &args.parameters_file_path {
                Some(path) => read_json(path).await?,
                None => Value::Null,
            };
            let location = args
                .subscription_scoped
                .then(|| cli.common.location.clone().unwrap_or_else(|| DEFAULT_LOCATION.to_string()));
            let driver = ArmWhatIfDriver::new(
                &backend,
                subscription_id.clone(),
                resource_group.clone(),
                deployment_name,
                template,
                parameters,
                location,
            );
            let result = run_with_driver(rbac, &driver, role).await;
            cleanup_resource_group(&backend, resource_group).await;
            result
        }
        Command::Bicep(args) => {
            let resource_group = maybe_create_resource_group(
                &backend,
                &subscription_id,
                &cli.common.resource_group_name_pfx,
                cli.common.location.as_deref(),
                args.subscription_scoped,
            )
            .await?;
            let deployment_name = prefixed_name(&cli.common.deployment_name_pfx);
            let parameters = match &args.parameters_file_path {
                Some(path) => read_json(path).await?,
                None => Value::Null,
            };
            let location = args
                .subscription_scoped
                .then(|| cli.common.location.clone().unwrap_or_else(|| DEFAULT_LOCATION.to_string()));
            let driver = BicepDriver::new(
                &backend,
                args.bicep_file_path.clone(),
                args.bicep_exec_path.clone(),
                subscription_id.clone(),
                resource_group.clone(),
                deployment_name,
                parameters,
                location,
            );
            let result = run_with_driver(rbac, &driver, role).await;
            cleanup_resource_group(&backend, resource_group).await;
            result
        }
        Command::Terraform(args) => {
            let driver = TerraformDriver::new(
                args.working_dir.clone(),
                args.tf_path.clone(),
                args.var_file_path.clone(),
                args.target_module.clone(),
                args.import_existing_resources_to_state,
                cli.common.sp.clone(),
                subscription_id.clone(),
                cli.common.sp.tenant_id.clone(),
            );

            let resume_path = args.working_dir.join(RESUME_FILE_NAME);
            // Terraform's MERGE-step sibling policy: auto-add-delete for each
            // discovered `/write`, no auto-add-read, per `terraformCmd.go`'s
            // `NewMPFService(..., false, true, ...)` call.
            let mut controller = Controller::new(rbac, &driver, role).with_sibling_expansion(false, true);
            if let Some(previous) = load_resume_file(&resume_path).await {
                info!("resuming from a previous run's {RESUME_FILE_NAME}");
                controller.resume_from(previous);
            }
            let checkpoint_path = resume_path.clone();
            let controller = controller.with_checkpoint(move |result| {
                if let Ok(contents) = serde_json::to_vec_pretty(result) {
                    if let Err(err) = std::fs::write(&checkpoint_path, contents) {
                        warn!("unable to write {RESUME_FILE_NAME}: {err}");
                    }
                }
            });

            let result = controller.run().await;
            match &result {
                Ok(_) => {
                    if resume_path.exists() {
                        let _ = tokio::fs::remove_file(&resume_path).await;
                    }
                }
                Err(err) => warn!("terraform discovery ended in error: {err}"),
            }
            result
        }
        Command::Readme => anyhow::bail!("readme generation has no deployment to run; handle it before calling run()"),
    }
}

/// Runs `driver` to completion with the ARM/Bicep/What-If MERGE-step
/// sibling-expansion policy: auto-add-read for each discovered `/write`,
/// no auto-add-delete. Grounded on `armCmd.go`/`bicepCmd.go`'s
/// `NewMPFService(..., true, false, ...)` call.
async fn run_with_driver(rbac: RbacManager<'_>, driver: &dyn DeploymentDriver, role: Role) -> Result<MpfResult> {
    Controller::new(rbac, driver, role).with_sibling_expansion(true, false).run().await
}

async fn maybe_create_resource_group(
    backend: &Backend,
    subscription_id: &str,
    name_prefix: &str,
    location: Option<&str>,
    subscription_scoped: bool,
) -> Result<Option<crate::models::config::ResourceGroup>> {
    if subscription_scoped {
        return Ok(None);
    }
    let rg = crate::models::config::ResourceGroup::new(subscription_id, name_prefix, location.unwrap_or(DEFAULT_LOCATION));
    ResourceGroupManager::new(backend).create(&rg).await?;
    Ok(Some(rg))
}

async fn cleanup_resource_group(backend: &Backend, resource_group: Option<crate::models::config::ResourceGroup>) {
    if let Some(rg) = resource_group {
        if let Err(err) = ResourceGroupManager::new(backend).delete(&rg).await {
            warn!("unable to delete resource group {}: {err}", rg.name);
        }
    }
}

async fn read_json(path: &Path) -> Result<Value> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {} as JSON", path.display()))
}

async fn load_resume_file(path: &Path) -> Option<MpfResult> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&contents).ok()
}
