//! Typed payloads for the TTN v3 HTTP API.
//!
//! Only the fields the control plane reads or writes are modelled; TTN
//! responses carry far more, and serde ignores the rest.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// TTN rights names used by the control plane.
pub mod rights {
    pub const RIGHT_APPLICATION_ALL: &str = "RIGHT_APPLICATION_ALL";
    pub const RIGHT_APPLICATION_DEVICES_READ: &str = "RIGHT_APPLICATION_DEVICES_READ";
    pub const RIGHT_APPLICATION_DEVICES_WRITE: &str = "RIGHT_APPLICATION_DEVICES_WRITE";
    pub const RIGHT_APPLICATION_DEVICES_READ_KEYS: &str = "RIGHT_APPLICATION_DEVICES_READ_KEYS";
    pub const RIGHT_APPLICATION_DEVICES_WRITE_KEYS: &str = "RIGHT_APPLICATION_DEVICES_WRITE_KEYS";
    pub const RIGHT_APPLICATION_TRAFFIC_READ: &str = "RIGHT_APPLICATION_TRAFFIC_READ";
    pub const RIGHT_APPLICATION_TRAFFIC_DOWN_WRITE: &str = "RIGHT_APPLICATION_TRAFFIC_DOWN_WRITE";
    pub const RIGHT_APPLICATION_SETTINGS_BASIC: &str = "RIGHT_APPLICATION_SETTINGS_BASIC";
    pub const RIGHT_APPLICATION_LINK: &str = "RIGHT_APPLICATION_LINK";
    pub const RIGHT_ORGANIZATION_ALL: &str = "RIGHT_ORGANIZATION_ALL";
    pub const RIGHT_ORGANIZATION_GATEWAYS_CREATE: &str = "RIGHT_ORGANIZATION_GATEWAYS_CREATE";
    pub const RIGHT_USER_GATEWAYS_CREATE: &str = "RIGHT_USER_GATEWAYS_CREATE";
    pub const RIGHT_GATEWAY_LINK: &str = "RIGHT_GATEWAY_LINK";
    pub const RIGHT_GATEWAY_INFO: &str = "RIGHT_GATEWAY_INFO";
    pub const RIGHT_GATEWAY_SETTINGS_BASIC: &str = "RIGHT_GATEWAY_SETTINGS_BASIC";
    pub const RIGHT_GATEWAY_READ_SECRETS: &str = "RIGHT_GATEWAY_READ_SECRETS";
}

/// gRPC-style field mask used by TTN set/update endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMask {
    pub paths: Vec<String>,
}

impl FieldMask {
    #[must_use]
    pub fn of(paths: &[&str]) -> Self {
        Self {
            paths: paths.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

// ── Organizations ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationIds {
    pub organization_id: String,
}

impl OrganizationIds {
    #[must_use]
    pub fn new(organization_id: &str) -> Self {
        Self {
            organization_id: organization_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Organization {
    pub ids: OrganizationIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Organization {
    #[must_use]
    pub fn new(organization_id: &str, name: &str) -> Self {
        Self {
            ids: OrganizationIds {
                organization_id: organization_id.to_string(),
            },
            name: Some(name.to_string()),
            description: None,
        }
    }
}

// ── Applications ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationIds {
    pub application_id: String,
}

impl ApplicationIds {
    #[must_use]
    pub fn new(application_id: &str) -> Self {
        Self {
            application_id: application_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Application {
    pub ids: ApplicationIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Application {
    #[must_use]
    pub fn new(application_id: &str, name: &str) -> Self {
        Self {
            ids: ApplicationIds {
                application_id: application_id.to_string(),
            },
            name: Some(name.to_string()),
            description: None,
        }
    }
}

// ── API keys ─────────────────────────────────────────────────────────────

/// Request body for minting an API key on any entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRequest {
    pub name: String,
    pub rights: Vec<String>,
}

impl ApiKeyRequest {
    #[must_use]
    pub fn new(name: &str, rights: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            rights: rights.iter().map(|r| (*r).to_string()).collect(),
        }
    }
}

/// An issued API key. `key` is only returned at creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub rights: Vec<String>,
}

// ── Auth info (rights introspection) ─────────────────────────────────────

/// Response of `GET /api/v3/auth_info` for the presented credential.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthInfo {
    #[serde(default)]
    pub api_key: Option<AuthInfoApiKey>,
    #[serde(default)]
    pub universal_rights: Option<RightsList>,
    #[serde(default)]
    pub is_admin: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthInfoApiKey {
    pub api_key: ApiKey,
    #[serde(default)]
    pub entity_ids: Option<EntityIds>,
}

/// Which identity block is present tells us what scope the key was minted
/// under.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityIds {
    #[serde(default)]
    pub application_ids: Option<ApplicationIds>,
    #[serde(default)]
    pub organization_ids: Option<OrganizationIds>,
    #[serde(default)]
    pub user_ids: Option<UserIds>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserIds {
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RightsList {
    #[serde(default)]
    pub rights: Vec<String>,
}

// ── Webhooks ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookIds {
    pub webhook_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_ids: Option<ApplicationIds>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookMessagePath {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Application-server webhook delivering uplinks to FrostGuard ingest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Webhook {
    pub ids: WebhookIds,
    pub base_url: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink_message: Option<WebhookMessagePath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_accept: Option<WebhookMessagePath>,
}

// ── End devices ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndDeviceIds {
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_ids: Option<ApplicationIds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_eui: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_eui: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyEnvelope {
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootKeys {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_key: Option<KeyEnvelope>,
}

/// End device record; each remote plane persists its own subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndDevice {
    pub ids: EndDeviceIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_server_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_server_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_server_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lorawan_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lorawan_phy_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_join: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_keys: Option<RootKeys>,
}

/// Identity-server device list page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndDeviceList {
    #[serde(default)]
    pub end_devices: Vec<EndDevice>,
}

// ── Gateways ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayIds {
    pub gateway_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eui: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AntennaLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Antenna {
    pub location: AntennaLocation,
}

/// Identity-plane gateway record. `gateway_server_address` is the
/// cross-cluster pointer: registration lives on EU1, radio traffic
/// terminates wherever this host says.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gateway {
    pub ids: GatewayIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frequency_plan_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_server_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_duty_cycle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_authenticated_connection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub antennas: Vec<Antenna>,
}
