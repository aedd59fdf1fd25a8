//! Core data model: the Service Principal under test, the scratch
//! resource group and custom role the controller manages for the
//! duration of a run, and the run-wide configuration that ties them
//! together.
//!
//! Grounded on `original_source/pkg/domain/mpfConfig.go`'s `Role`,
//! `ResourceGroup`, `ServicePrincipal` and `MPFConfig` structs, expressed
//! here as a `clap`-derived `Args` struct the way the teacher's
//! `ScopeBuilder` (`models/scope.rs`) turns domain types into CLI flags.

use clap::Args;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credentials for the Service Principal whose permissions are being
/// discovered. These are never the operator's own credentials.
#[derive(Args, Debug, Clone)]
pub struct ServicePrincipal {
    /// Azure AD tenant ID
    #[arg(long, env = "MPF_TENANT_ID")]
    pub tenant_id: String,

    /// Client (application) ID of the Service Principal under test
    #[arg(long, env = "MPF_SP_CLIENT_ID")]
    pub client_id: String,

    /// Object ID of the Service Principal under test
    #[arg(long, env = "MPF_SP_OBJECT_ID")]
    pub object_id: String,

    /// Client secret of the Service Principal under test
    #[arg(long, env = "MPF_SP_CLIENT_SECRET")]
    pub client_secret: String,
}

/// The scratch resource group created for RG-scoped deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    pub id: String,
    pub location: String,
}

impl ResourceGroup {
    #[must_use]
    pub fn new(subscription_id: &str, name_prefix: &str, location: &str) -> Self {
        let name = format!("{name_prefix}-{}", random_suffix(7));
        Self {
            id: format!("/subscriptions/{subscription_id}/resourceGroups/{name}"),
            name,
            location: location.to_string(),
        }
    }
}

/// The ephemeral custom role the controller creates, grows, and tears
/// down over the lifetime of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub definition_id: Uuid,
    pub resource_id: String,
    pub name: String,
    pub assignment_id: Uuid,
    pub actions: Vec<String>,
    pub data_actions: Vec<String>,
}

impl Role {
    #[must_use]
    pub fn new_ephemeral(subscription_id: &str) -> Self {
        let definition_id = Uuid::new_v4();
        let name = format!("tmp-rol-{}", random_suffix(7));
        Self {
            resource_id: format!(
                "/subscriptions/{subscription_id}/providers/Microsoft.Authorization/roleDefinitions/{definition_id}"
            ),
            definition_id,
            name,
            assignment_id: Uuid::new_v4(),
            actions: Vec::new(),
            data_actions: Vec::new(),
        }
    }
}

/// Builds a `{prefix}-{random}` name the way `ResourceGroup::new` and
/// `Role::new_ephemeral` do, for callers (deployment names) that need the
/// same convention but aren't building a full `ResourceGroup`/`Role`.
#[must_use]
pub fn prefixed_name(prefix: &str) -> String {
    format!("{prefix}-{}", random_suffix(7))
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .filter(u8::is_ascii_lowercase)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::random_suffix;

    #[test]
    fn random_suffix_is_lowercase_ascii_of_requested_length() {
        let s = random_suffix(7);
        assert_eq!(s.len(), 7);
        assert!(s.chars().all(|c| c.is_ascii_lowercase()));
    }
}
