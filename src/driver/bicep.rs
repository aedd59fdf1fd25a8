//! Bicep driver: compiles a `.bicep` file to an ARM template via an
//! external Bicep compiler, then delegates to [`ArmDeploymentDriver`].
//!
//! Grounded on `original_source/cmd/bicepCmd.go`'s flag surface
//! (`bicepFilePath`, `bicepExecPath`); the original shells out to the
//! `az bicep build` subcommand (or a standalone `bicep` binary when
//! configured), same as this driver's `compile` step.

use crate::{
    backend::Backend,
    driver::{arm::ArmDeploymentDriver, AttemptOutcome, DeploymentDriver},
    error::MpfError,
    models::config::ResourceGroup,
};
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

pub struct BicepDriver<'a> {
    bicep_file: std::path::PathBuf,
    bicep_exec_path: std::path::PathBuf,
    inner: std::sync::OnceLock<ArmDeploymentDriver<'a>>,
    backend: &'a Backend,
    subscription_id: String,
    resource_group: Option<ResourceGroup>,
    deployment_name: String,
    parameters: Value,
    location: Option<String>,
}

impl<'a> BicepDriver<'a> {
    #[must_use]
    pub fn new(
        backend: &'a Backend,
        bicep_file: std::path::PathBuf,
        bicep_exec_path: std::path::PathBuf,
        subscription_id: String,
        resource_group: Option<ResourceGroup>,
        deployment_name: String,
        parameters: Value,
        location: Option<String>,
    ) -> Self {
        Self {
            bicep_file,
            bicep_exec_path,
            inner: std::sync::OnceLock::new(),
            backend,
            subscription_id,
            resource_group,
            deployment_name,
            parameters,
            location,
        }
    }

    async fn compile(&self) -> anyhow::Result<Value> {
        let output_path = self.bicep_file.with_extension("json");
        let output = Command::new(&self.bicep_exec_path)
            .arg("build")
            .arg(&self.bicep_file)
            .arg("--outfile")
            .arg(&output_path)
            .output()
            .await
            .context("running the bicep compiler")?;

        if !output.status.success() {
            bail!(
                "bicep build failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let compiled = tokio::fs::read_to_string(&output_path)
            .await
            .context("reading compiled ARM template")?;
        serde_json::from_str(&compiled).context("parsing compiled ARM template")
    }

    async fn driver(&self) -> anyhow::Result<&ArmDeploymentDriver<'a>> {
        if self.inner.get().is_none() {
            let template = self.compile().await?;
            let driver = ArmDeploymentDriver::new(
                self.backend,
                self.subscription_id.clone(),
                self.resource_group.clone(),
                self.deployment_name.clone(),
                template,
                self.parameters.clone(),
                self.location.clone(),
            );
            let _ = self.inner.set(driver);
        }
        self.inner
            .get()
            .context("compiled ARM deployment driver missing after initialization")
    }
}

#[async_trait]
impl<'a> DeploymentDriver for BicepDriver<'a> {
    async fn attempt(&self) -> Result<AttemptOutcome, MpfError> {
        let driver = self.driver().await?;
        driver.attempt().await
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        if let Some(driver) = self.inner.get() {
            driver.cleanup().await?;
        }
        Ok(())
    }
}
