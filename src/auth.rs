//! Bearer token acquisition for the Service Principal under test.
//!
//! Unlike the interactive `az` CLI flow this crate's teacher used, every
//! token here is minted directly from the SP's own client-secret
//! credential: the tool is testing that SP's permissions, so it must
//! authenticate as that SP, not as whichever operator happens to be
//! signed in to the `az` CLI locally.

use crate::models::config::ServicePrincipal;
use anyhow::{Context, Result};
use azure_core::auth::TokenCredential;
use azure_identity::ClientSecretCredential;
use std::sync::Arc;

/// The single scope every management-plane call in this crate needs.
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Builds a `ClientSecretCredential` for the SP under test.
///
/// # Errors
/// Will return `Err` if the credential cannot be constructed (malformed
/// tenant/client id).
pub fn credential(sp: &ServicePrincipal) -> Result<Arc<ClientSecretCredential>> {
    let credential = ClientSecretCredential::new(
        azure_core::new_http_client(),
        azure_identity::authority_hosts::AZURE_PUBLIC_CLOUD,
        sp.tenant_id.clone(),
        sp.client_id.clone(),
        sp.client_secret.clone(),
    )
    .context("unable to build a client secret credential for the service principal")?;
    Ok(Arc::new(credential))
}

/// Fetches a fresh ARM management-plane bearer token for the SP.
///
/// # Errors
/// Will return `Err` if Azure AD rejects the SP's credentials.
pub async fn management_token(credential: &ClientSecretCredential) -> Result<String> {
    let token = credential
        .get_token(&[MANAGEMENT_SCOPE])
        .await
        .context("unable to obtain a management-plane token for the service principal")?;
    Ok(token.token.secret().to_string())
}
