//! Caller-facing reports from the provisioners.
//!
//! These cross the HTTP boundary, so the rule from the credential store
//! applies here: presence booleans and fingerprints only, never
//! ciphertext or plaintext.

use serde::Serialize;

use frostguard_db::models::{
    AttemptOutcome, ConnectionStatus, CredentialSlot, DeviceProvisioningState, GatewayOwner,
    GatewayStatus, LastErrorSnapshot, RightsCheckStatus, StepName, TenantConnection,
};

/// One step's outcome within a run.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: StepName,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepReport {
    #[must_use]
    pub fn new(step: StepName, outcome: AttemptOutcome) -> Self {
        Self {
            step,
            outcome,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(step: StepName, outcome: AttemptOutcome, message: &str) -> Self {
        Self {
            step,
            outcome,
            message: Some(message.to_string()),
        }
    }
}

/// Result of `provision`, `retry` or `start_fresh`.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionOutcome {
    pub status: ConnectionStatus,
    pub ttn_org_id: Option<String>,
    pub ttn_app_id: Option<String>,
    pub webhook_id: Option<String>,
    pub webhook_url: Option<String>,
    pub steps: Vec<StepReport>,
    /// Rotations consumed so far across the connection's lineage.
    pub org_id_rotations: u32,
    pub app_id_rotations: u32,
}

/// Secret-safe view of one credential slot.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl CredentialSummary {
    #[must_use]
    pub fn from_slot(slot: Option<&CredentialSlot>) -> Self {
        match slot {
            Some(slot) => Self {
                present: true,
                fingerprint: Some(slot.fingerprint.clone()),
            },
            None => Self {
                present: false,
                fingerprint: None,
            },
        }
    }
}

/// Result of `status`. Built entirely from the stored row.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: ConnectionStatus,
    pub current_step: Option<String>,
    pub region: String,
    pub ttn_org_id: Option<String>,
    pub ttn_app_id: Option<String>,
    pub webhook_id: Option<String>,
    pub webhook_url: Option<String>,
    pub rights_status: RightsCheckStatus,
    pub org_key: CredentialSummary,
    pub app_key: CredentialSummary,
    pub gateway_key: CredentialSummary,
    pub webhook_secret: CredentialSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastErrorSnapshot>,
}

impl StatusReport {
    #[must_use]
    pub fn from_connection(conn: &TenantConnection, webhook_url: Option<String>) -> Self {
        Self {
            status: conn.status,
            current_step: conn.current_step.clone(),
            region: conn.region.clone(),
            ttn_org_id: conn.ttn_org_id.clone(),
            ttn_app_id: conn.ttn_app_id.clone(),
            webhook_id: conn.webhook_id.clone(),
            webhook_url,
            rights_status: conn.rights_status,
            org_key: CredentialSummary::from_slot(conn.org_key.as_deref()),
            app_key: CredentialSummary::from_slot(conn.app_key.as_deref()),
            gateway_key: CredentialSummary::from_slot(conn.gateway_key.as_deref()),
            webhook_secret: CredentialSummary::from_slot(conn.webhook_secret.as_deref()),
            last_error: conn.last_error.as_deref().cloned(),
        }
    }
}

/// One remote plane's outcome within a device operation.
#[derive(Debug, Clone, Serialize)]
pub struct PlaneReport {
    pub plane: &'static str,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PlaneReport {
    #[must_use]
    pub fn new(plane: &'static str, outcome: AttemptOutcome) -> Self {
        Self {
            plane,
            outcome,
            message: None,
        }
    }
}

/// Result of a device `create` or `delete`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub dev_eui: String,
    pub ttn_device_id: Option<String>,
    pub provisioning_state: DeviceProvisioningState,
    pub planes: Vec<PlaneReport>,
}

/// Split-brain classification across the four remote device planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClassification {
    FullyProvisioned,
    NotProvisioned,
    SplitBrainNoKeys,
    SplitBrainOrphaned,
    Partial,
}

impl DeviceClassification {
    /// Classify from the four plane-presence probes.
    #[must_use]
    pub fn from_presence(identity: bool, join: bool, network: bool, application: bool) -> Self {
        match (identity, join, network, application) {
            (true, true, true, true) => DeviceClassification::FullyProvisioned,
            (false, false, false, false) => DeviceClassification::NotProvisioned,
            (true, false, false, false) => DeviceClassification::SplitBrainNoKeys,
            (false, _, _, _) => DeviceClassification::SplitBrainOrphaned,
            _ => DeviceClassification::Partial,
        }
    }

    /// Fixed operator hint for the classification.
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            DeviceClassification::FullyProvisioned => {
                "Device is registered on all planes. No action needed."
            }
            DeviceClassification::NotProvisioned => {
                "Device is absent everywhere. Run create to provision it."
            }
            DeviceClassification::SplitBrainNoKeys => {
                "Device exists in the identity registry but has no join keys. \
                 Re-run create; the key push is safe to repeat."
            }
            DeviceClassification::SplitBrainOrphaned => {
                "Device is missing from the identity registry but present on \
                 dependent planes. Likely manual deletion or propagation lag; \
                 delete the remnants or re-run create after they clear."
            }
            DeviceClassification::Partial => {
                "Device is present on some planes only. Re-run create to \
                 complete provisioning; surviving registrations are updated \
                 in place."
            }
        }
    }
}

/// Result of `diagnose`. Never mutates stored state.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnoseReport {
    pub dev_eui: String,
    pub classification: DeviceClassification,
    pub present_identity: bool,
    pub present_join: bool,
    pub present_network: bool,
    pub present_application: bool,
    pub hint: &'static str,
}

/// How (or whether) `adopt` matched a remote device.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AdoptOutcome {
    /// Matched under the orchestrator's own naming convention.
    AdoptedExactId { ttn_device_id: String },
    /// Found by EUI during the bounded registry scan.
    AdoptedByScan { ttn_device_id: String, page: u32 },
    /// Absent from the identity registry but present on dependent
    /// planes: eventual consistency or a stalled external operation,
    /// not proof of non-existence.
    OrphanWarning { planes: Vec<String> },
    /// Absent everywhere.
    NotFound,
}

/// Result of a gateway `create`.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayReport {
    pub gateway_eui: String,
    pub ttn_gateway_id: String,
    pub owner: GatewayOwner,
    /// Which credential strategy won.
    pub strategy: &'static str,
    pub status: GatewayStatus,
    pub lns_key: CredentialSummary,
}
