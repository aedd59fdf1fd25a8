//! Terraform deployment driver: shells out to the `terraform` binary for
//! `init`/`apply`/`import`/`destroy`, classifies the resulting stderr,
//! and tracks the apply/destroy phase across a process crash via an
//! on-disk sentinel file.
//!
//! Grounded on
//! `original_source/pkg/infrastructure/authorizationCheckers/terraform/terraformAuthorizationChecker.go`
//! (apply-then-destroy shape, `ARM_*` env vars, `Authorization` substring
//! classification) and supplemented, per SPEC_FULL.md, with the
//! sentinel-file resume and resource-import flows from that package's
//! `fileManager.go` and `resourceImportParser.go`.

use crate::{
    driver::{AttemptOutcome, DeploymentDriver},
    error::MpfError,
    models::config::ServicePrincipal,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};

const DESTROY_PHASE_MARKER: &str = ".azmpfEnteredDestroyPhase.txt";

// The pattern is a string literal fixed at compile time; a failed
// `Regex::new` here is a bug in this file, not a runtime condition to
// propagate.
#[allow(clippy::expect_used)]
static EXISTING_RESOURCE_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"Error: A resource with the ID "([^"]+)" already exists - to be managed via Terraform this resource needs to be imported into the State\. Please see the resource documentation for "[^"]+" for more information\.\n\n  with ([^,]+),"#,
    )
    .expect("static regex is valid")
});

pub struct TerraformDriver {
    working_dir: PathBuf,
    exec_path: PathBuf,
    var_file_path: Option<PathBuf>,
    target_module: Option<String>,
    import_existing_resources: bool,
    sp: ServicePrincipal,
    subscription_id: String,
    tenant_id: String,
    entered_destroy_phase: Mutex<bool>,
}

impl TerraformDriver {
    #[must_use]
    pub fn new(
        working_dir: PathBuf,
        exec_path: PathBuf,
        var_file_path: Option<PathBuf>,
        target_module: Option<String>,
        import_existing_resources: bool,
        sp: ServicePrincipal,
        subscription_id: String,
        tenant_id: String,
    ) -> Self {
        Self {
            working_dir,
            exec_path,
            var_file_path,
            target_module,
            import_existing_resources,
            sp,
            subscription_id,
            tenant_id,
            entered_destroy_phase: Mutex::new(false),
        }
    }

    fn destroy_marker_path(&self) -> PathBuf {
        self.working_dir.join(DESTROY_PHASE_MARKER)
    }

    /// True if a previous run crashed after finishing apply but before
    /// finishing destroy; if so, `attempt` should skip straight to the
    /// destroy phase rather than re-applying.
    async fn resuming_destroy_phase(&self) -> bool {
        if self.destroy_marker_path().exists() {
            return true;
        }
        *self.entered_destroy_phase.lock().await
    }

    async fn mark_destroy_phase_entered(&self) -> Result<()> {
        *self.entered_destroy_phase.lock().await = true;
        tokio::fs::write(self.destroy_marker_path(), b"").await.context("writing destroy-phase marker")?;
        Ok(())
    }

    async fn clear_destroy_phase_marker(&self) -> Result<()> {
        let path = self.destroy_marker_path();
        if path.exists() {
            tokio::fs::remove_file(path).await.context("removing destroy-phase marker")?;
        }
        Ok(())
    }

    fn base_command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.exec_path);
        cmd.current_dir(&self.working_dir)
            .arg(subcommand)
            .env("ARM_CLIENT_ID", &self.sp.client_id)
            .env("ARM_CLIENT_SECRET", &self.sp.client_secret)
            .env("ARM_SUBSCRIPTION_ID", &self.subscription_id)
            .env("ARM_TENANT_ID", &self.tenant_id);
        cmd
    }

    async fn init(&self) -> Result<()> {
        let output = self.base_command("init").output().await.context("running terraform init")?;
        if !output.status.success() {
            anyhow::bail!("terraform init failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(())
    }

    fn apply_args(cmd: &mut Command, var_file: &Option<PathBuf>, target: &Option<String>) {
        cmd.arg("-auto-approve").arg("-input=false");
        if let Some(var_file) = var_file {
            cmd.arg(format!("-var-file={}", var_file.display()));
        }
        if let Some(target) = target {
            cmd.arg(format!("-target={target}"));
        }
    }

    async fn run_apply(&self) -> Result<Option<String>> {
        let mut cmd = self.base_command("apply");
        Self::apply_args(&mut cmd, &self.var_file_path, &self.target_module);
        let output = cmd.output().await.context("running terraform apply")?;
        if output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stderr).to_string()))
    }

    async fn run_destroy(&self) -> Result<Option<String>> {
        let mut cmd = self.base_command("destroy");
        Self::apply_args(&mut cmd, &self.var_file_path, &self.target_module);
        let output = cmd.output().await.context("running terraform destroy")?;
        if output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stderr).to_string()))
    }

    async fn import_existing_resources(&self, error_text: &str) -> Result<bool> {
        let matches = parse_existing_resource_errors(error_text);

        if matches.is_empty() {
            return Ok(false);
        }

        for (address, resource_id) in matches {
            info!("importing existing resource {resource_id} into address {address}");
            let mut cmd = self.base_command("import");
            cmd.arg(&address).arg(&resource_id);
            let output = cmd.output().await.context("running terraform import")?;
            if !output.status.success() {
                warn!(
                    "terraform import failed for {address}: {}",
                    String::from_utf8_lossy(&output.stderr)
                );
            }
        }
        Ok(true)
    }
}

fn is_retryable_without_rbac_change(error_text: &str) -> bool {
    error_text.contains("CurrentBillingFeatures is required in payload")
        || (error_text.contains("waiting for the Data Plane") && error_text.contains("Authorization"))
}

/// Extracts `(module address, resource ID)` pairs from Terraform's
/// "already exists, needs to be imported" apply error, one pair per
/// resource the error body names.
fn parse_existing_resource_errors(error_text: &str) -> Vec<(String, String)> {
    EXISTING_RESOURCE_ERROR
        .captures_iter(error_text)
        .map(|c| {
            #[allow(clippy::indexing_slicing)] // capture groups are guaranteed present by the pattern
            {
                (c[2].trim().to_string(), c[1].to_string())
            }
        })
        .collect()
}

#[async_trait]
impl DeploymentDriver for TerraformDriver {
    async fn attempt(&self) -> Result<AttemptOutcome, MpfError> {
        self.init().await?;

        if !self.resuming_destroy_phase().await {
            let mut apply_error = self.run_apply().await?;

            if let Some(error_text) = &apply_error {
                if self.import_existing_resources && Path::new(&self.working_dir).exists() {
                    if self.import_existing_resources(error_text).await? {
                        apply_error = self.run_apply().await?;
                    }
                }
            }

            if let Some(error_text) = apply_error {
                if is_retryable_without_rbac_change(&error_text) {
                    return Err(MpfError::RetryWithoutChange);
                }
                if error_text.contains("Authorization") {
                    return Ok(AttemptOutcome::AuthorizationFailure(error_text));
                }
                warn!("terraform apply: non-authorization error occurred: {error_text}");
            }

            self.mark_destroy_phase_entered().await?;
        }

        let destroy_error = self.run_destroy().await?;
        if let Some(error_text) = destroy_error {
            if is_retryable_without_rbac_change(&error_text) {
                return Err(MpfError::RetryWithoutChange);
            }
            if error_text.contains("Authorization") {
                return Ok(AttemptOutcome::AuthorizationFailure(error_text));
            }
            warn!("terraform destroy: non-authorization error occurred: {error_text}");
        }

        self.clear_destroy_phase_marker().await?;
        Ok(AttemptOutcome::Success)
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        let _ = self.run_destroy().await?;
        self.clear_destroy_phase_marker().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{is_retryable_without_rbac_change, parse_existing_resource_errors};

    #[test]
    fn billing_features_error_is_retryable_without_rbac_change() {
        assert!(is_retryable_without_rbac_change("CurrentBillingFeatures is required in payload"));
    }

    #[test]
    fn data_plane_wait_with_authorization_is_retryable() {
        assert!(is_retryable_without_rbac_change(
            "waiting for the Data Plane to be ready: Authorization is still propagating"
        ));
    }

    #[test]
    fn unrelated_error_is_not_retryable() {
        assert!(!is_retryable_without_rbac_change("some other transient network error"));
    }

    #[test]
    fn extracts_resource_id_and_module_address_from_apply_error() {
        let error_text = concat!(
            "Error: A resource with the ID \"/subscriptions/sub/resourceGroups/rg\" already exists - ",
            "to be managed via Terraform this resource needs to be imported into the State. ",
            "Please see the resource documentation for \"azurerm_resource_group\" for more information.\n\n",
            "  with azurerm_resource_group.main,\n",
        );
        let matches = parse_existing_resource_errors(error_text);
        assert_eq!(matches, vec![("azurerm_resource_group.main".to_string(), "/subscriptions/sub/resourceGroups/rg".to_string())]);
    }

    #[test]
    fn no_match_on_unrelated_error_text() {
        assert!(parse_existing_resource_errors("some other apply failure").is_empty());
    }
}
