//! The deployment driver contract (§4.4): one narrow adapter trait, and
//! three concrete backends (ARM template deployment, ARM what-if, and
//! Terraform), one implementation per IaC technology this tool drives.
//!
//! Grounded on the three `*AuthorizationChecker.go` files under
//! `original_source/pkg/infrastructure/authorizationCheckers/`, whose
//! shared two-method shape (`GetDeploymentAuthorizationErrors`,
//! `CleanDeployment`) becomes the `DeploymentDriver` trait below. Uses
//! `async-trait` the way `fraiseql-fraiseql` does for its own trait
//! objects, since the controller holds one of these behind `Box<dyn
//! DeploymentDriver>` chosen at CLI-dispatch time.

pub mod arm;
pub mod bicep;
pub mod terraform;
pub mod whatif;

use crate::error::MpfError;
use async_trait::async_trait;

/// What one deployment attempt told us.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The deployment succeeded (or What-If reported no remaining
    /// authorization errors): the controller's job is done.
    Success,
    /// The deployment failed with one or more authorization errors;
    /// carries the raw error text for the parser.
    AuthorizationFailure(String),
}

#[async_trait]
pub trait DeploymentDriver: Send + Sync {
    /// Attempts the deployment once (or, for What-If, evaluates it) and
    /// classifies the result. A hard [`MpfError`] here (e.g.
    /// `InvalidTemplate`) aborts the whole run; anything else bubbles up
    /// through `anyhow::Error`.
    async fn attempt(&self) -> Result<AttemptOutcome, MpfError>;

    /// Tears down whatever the last successful (or partially applied)
    /// attempt created. Called exactly once, during CLEANUP, regardless
    /// of how the run ended.
    async fn cleanup(&self) -> anyhow::Result<()>;
}
