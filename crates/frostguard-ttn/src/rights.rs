//! Credential scope and capability inference from `auth_info`.
//!
//! TTN reports the scope of an API key through which identity block the
//! `auth_info` response carries, and its powers through a rights list.
//! The orchestrator records both on the tenant connection so operators
//! can see what a delegated credential is actually able to do.

use serde::{Deserialize, Serialize};

use crate::types::{rights, AuthInfo};

/// What entity a presented API key was minted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
    /// Application-scoped key: device and webhook powers only.
    Application,
    /// Organization-scoped key: everything under the organization.
    Organization,
    /// User-scoped (account-level) key.
    User,
    /// The response carried no recognizable identity block.
    Unknown,
}

impl KeyScope {
    /// Classify from an `auth_info` response.
    #[must_use]
    pub fn from_auth_info(info: &AuthInfo) -> Self {
        let Some(api_key) = &info.api_key else {
            return KeyScope::Unknown;
        };
        let Some(entity_ids) = &api_key.entity_ids else {
            return KeyScope::Unknown;
        };
        if entity_ids.application_ids.is_some() {
            KeyScope::Application
        } else if entity_ids.organization_ids.is_some() {
            KeyScope::Organization
        } else if entity_ids.user_ids.is_some() {
            KeyScope::User
        } else {
            KeyScope::Unknown
        }
    }
}

/// What a credential can do, derived from scope and rights bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub scope: KeyScope,
    pub can_configure_webhooks: bool,
    pub can_manage_devices: bool,
    pub can_send_downlinks: bool,
    pub can_provision_gateways: bool,
    pub can_manage_api_keys: bool,
}

impl Capabilities {
    /// Derive capabilities from an `auth_info` response.
    ///
    /// Gateway provisioning is scope-gated: an application-scoped key
    /// cannot register gateways no matter what rights it lists, because
    /// gateways hang off users and organizations.
    #[must_use]
    pub fn from_auth_info(info: &AuthInfo) -> Self {
        let scope = KeyScope::from_auth_info(info);
        let granted = granted_rights(info);
        let is_admin = info.is_admin.unwrap_or(false);

        let has = |right: &str, blanket: &str| {
            is_admin || granted.iter().any(|r| r == right || r == blanket)
        };

        let gateway_create = match scope {
            KeyScope::Application => false,
            KeyScope::Organization => has(
                rights::RIGHT_ORGANIZATION_GATEWAYS_CREATE,
                rights::RIGHT_ORGANIZATION_ALL,
            ),
            KeyScope::User | KeyScope::Unknown => {
                is_admin || granted.iter().any(|r| r == rights::RIGHT_USER_GATEWAYS_CREATE)
            }
        };

        // Organization-scoped keys carry application rights implicitly
        // for applications under the organization.
        let org_blanket = matches!(scope, KeyScope::Organization)
            && granted.iter().any(|r| r == rights::RIGHT_ORGANIZATION_ALL);

        Self {
            scope,
            can_configure_webhooks: org_blanket
                || has(
                    rights::RIGHT_APPLICATION_TRAFFIC_READ,
                    rights::RIGHT_APPLICATION_ALL,
                ),
            can_manage_devices: org_blanket
                || has(
                    rights::RIGHT_APPLICATION_DEVICES_WRITE,
                    rights::RIGHT_APPLICATION_ALL,
                ),
            can_send_downlinks: org_blanket
                || has(
                    rights::RIGHT_APPLICATION_TRAFFIC_DOWN_WRITE,
                    rights::RIGHT_APPLICATION_ALL,
                ),
            can_provision_gateways: gateway_create,
            can_manage_api_keys: org_blanket
                || has(
                    rights::RIGHT_APPLICATION_SETTINGS_BASIC,
                    rights::RIGHT_APPLICATION_ALL,
                ),
        }
    }
}

fn granted_rights(info: &AuthInfo) -> Vec<String> {
    let mut granted: Vec<String> = info
        .api_key
        .as_ref()
        .map(|k| k.api_key.rights.clone())
        .unwrap_or_default();
    if let Some(universal) = &info.universal_rights {
        granted.extend(universal.rights.iter().cloned());
    }
    granted
}

/// Outcome of verifying a credential against an expected application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RightsCheck {
    pub capabilities: Capabilities,
    /// Whether the key is bound to the application we expected, when the
    /// key is application-scoped. `None` when scope makes this moot.
    pub bound_application_id: Option<String>,
}

impl RightsCheck {
    /// Evaluate an `auth_info` response.
    #[must_use]
    pub fn evaluate(info: &AuthInfo) -> Self {
        let capabilities = Capabilities::from_auth_info(info);
        let bound_application_id = info
            .api_key
            .as_ref()
            .and_then(|k| k.entity_ids.as_ref())
            .and_then(|e| e.application_ids.as_ref())
            .map(|ids| ids.application_id.clone());
        Self {
            capabilities,
            bound_application_id,
        }
    }

    /// True when an application-scoped key is bound to a different
    /// application than the one we provisioned.
    #[must_use]
    pub fn is_misbound(&self, expected_app_id: &str) -> bool {
        match &self.bound_application_id {
            Some(bound) => bound != expected_app_id,
            None => false,
        }
    }
}
