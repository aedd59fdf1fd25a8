//! Resource-group lifecycle for RG-scoped deployments.
//!
//! Grounded on
//! `original_source/pkg/infrastructure/resourceGroupManager/defaultResourceGroupManager.go`:
//! creation is awaited, deletion is fire-and-forget (ARM accepts the
//! delete and finishes it asynchronously; the controller does not block
//! cleanup on it finishing).

use crate::{backend::Backend, models::config::ResourceGroup};
use anyhow::{Context, Result};
use reqwest::Method;
use tracing::info;

pub struct ResourceGroupManager<'a> {
    backend: &'a Backend,
}

impl<'a> ResourceGroupManager<'a> {
    #[must_use]
    pub fn new(backend: &'a Backend) -> Self {
        Self { backend }
    }

    pub async fn create(&self, rg: &ResourceGroup) -> Result<()> {
        let body = serde_json::json!({ "location": rg.location });

        self.backend
            .request(Method::PUT, rg.id.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("creating resource group {}", rg.name))?;
        info!("created resource group {}", rg.name);
        Ok(())
    }

    /// Requests deletion and returns immediately; does not poll for
    /// completion.
    pub async fn delete(&self, rg: &ResourceGroup) -> Result<()> {
        self.backend
            .request(Method::DELETE, rg.id.clone())
            .send()
            .await
            .with_context(|| format!("deleting resource group {}", rg.name))?;
        info!("requested deletion of resource group {}", rg.name);
        Ok(())
    }
}
