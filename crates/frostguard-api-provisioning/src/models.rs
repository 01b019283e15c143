//! Request and response models for the provisioning API.
//!
//! Every response carries `success` and the `request_id` minted for the
//! call, so client UIs can render outcomes and quote support references
//! without touching transport status codes. Storage-layer enums cross
//! the boundary as their wire strings, and credential slots as
//! presence-plus-fingerprint views. Nothing in this module can carry
//! key material.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use frostguard_db::models::LastErrorSnapshot;
use frostguard_provisioning::outcome::{
    AdoptOutcome, CredentialSummary, DeviceReport, DiagnoseReport, GatewayReport, PlaneReport,
    ProvisionOutcome, StatusReport, StepReport,
};
use frostguard_provisioning::ProvisionError;

/// Connection lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionAction {
    Provision,
    Retry,
    StartFresh,
    Status,
    Delete,
    RegenerateWebhookSecret,
}

/// Device provisioning action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAction {
    Create,
    Delete,
    Diagnose,
    Adopt,
}

/// Gateway provisioning action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GatewayAction {
    Create,
    Delete,
    RefreshStatus,
}

/// Request to the connection endpoint.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConnectionRequest {
    pub action: ConnectionAction,
    pub tenant_id: Uuid,
    /// TTN cluster region (`eu1`, `nam1`, `au1`). Only read by
    /// `provision`, and only on first contact; an existing connection
    /// keeps its region.
    pub region: Option<String>,
}

/// Request to the device endpoint.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DeviceRequest {
    pub action: DeviceAction,
    pub tenant_id: Uuid,
    /// Device EUI, 16 hex characters.
    pub dev_eui: String,
    /// Join EUI (AppEUI). Required for `create`.
    pub join_eui: Option<String>,
    /// Display name, used by `create`.
    pub name: Option<String>,
}

/// Request to the gateway endpoint.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GatewayRequest {
    pub action: GatewayAction,
    pub tenant_id: Uuid,
    /// Gateway EUI, 16 hex characters.
    pub gateway_eui: String,
    /// Display name, used by `create`.
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

/// In-band failure envelope.
///
/// Returned with HTTP 200: the failure category, not the transport
/// status, drives caller behavior.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub request_id: Uuid,
    /// Step the failure occurred at, when tied to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Stable failure category.
    pub error: String,
    pub message: String,
    /// Whether retrying the same call later can reasonably succeed.
    pub retryable: bool,
    /// Whether `start_fresh` is the recommended way out.
    pub use_start_fresh: bool,
    /// Remote correlation id for support tickets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ErrorEnvelope {
    #[must_use]
    pub fn from_error(request_id: Uuid, err: &ProvisionError) -> Self {
        Self {
            success: false,
            request_id,
            step: err.step().map(|s| s.to_string()),
            error: err.category().to_string(),
            message: err.to_string(),
            retryable: err.retryable(),
            use_start_fresh: err.use_start_fresh(),
            correlation_id: err.correlation_id().map(str::to_string),
        }
    }
}

/// Bare acknowledgement for actions with no payload, like `delete`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Acknowledgement {
    pub success: bool,
    pub request_id: Uuid,
}

impl Acknowledgement {
    #[must_use]
    pub fn new(request_id: Uuid) -> Self {
        Self {
            success: true,
            request_id,
        }
    }
}

/// One step's outcome within a provisioning run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StepResult {
    pub step: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<StepReport> for StepResult {
    fn from(report: StepReport) -> Self {
        Self {
            step: report.step.to_string(),
            outcome: report.outcome.to_string(),
            message: report.message,
        }
    }
}

/// Response to `provision`, `retry` and `start_fresh`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProvisionResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub status: String,
    pub ttn_org_id: Option<String>,
    pub ttn_app_id: Option<String>,
    pub webhook_id: Option<String>,
    pub webhook_url: Option<String>,
    pub steps: Vec<StepResult>,
    pub org_id_rotations: u32,
    pub app_id_rotations: u32,
}

impl ProvisionResponse {
    #[must_use]
    pub fn from_outcome(request_id: Uuid, outcome: ProvisionOutcome) -> Self {
        Self {
            success: true,
            request_id,
            status: outcome.status.to_string(),
            ttn_org_id: outcome.ttn_org_id,
            ttn_app_id: outcome.ttn_app_id,
            webhook_id: outcome.webhook_id,
            webhook_url: outcome.webhook_url,
            steps: outcome.steps.into_iter().map(Into::into).collect(),
            org_id_rotations: outcome.org_id_rotations,
            app_id_rotations: outcome.app_id_rotations,
        }
    }
}

/// Secret-safe view of one credential slot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CredentialView {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl From<CredentialSummary> for CredentialView {
    fn from(summary: CredentialSummary) -> Self {
        Self {
            present: summary.present,
            fingerprint: summary.fingerprint,
        }
    }
}

/// Last recorded failure on the connection.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LastErrorView {
    pub step: Option<String>,
    pub http_status: Option<u16>,
    pub body_excerpt: Option<String>,
    pub correlation_id: Option<String>,
    pub error_namespace: Option<String>,
    pub error_name: Option<String>,
    pub message: String,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl From<LastErrorSnapshot> for LastErrorView {
    fn from(snapshot: LastErrorSnapshot) -> Self {
        Self {
            step: snapshot.step,
            http_status: snapshot.http_status,
            body_excerpt: snapshot.body_excerpt,
            correlation_id: snapshot.correlation_id,
            error_namespace: snapshot.error_namespace,
            error_name: snapshot.error_name,
            message: snapshot.message,
            occurred_at: snapshot.occurred_at,
        }
    }
}

/// Response to `status` and `regenerate_webhook_secret`. Built entirely
/// from storage.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionStatusResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub status: String,
    pub current_step: Option<String>,
    pub region: String,
    pub ttn_org_id: Option<String>,
    pub ttn_app_id: Option<String>,
    pub webhook_id: Option<String>,
    pub webhook_url: Option<String>,
    pub rights_status: String,
    pub org_key: CredentialView,
    pub app_key: CredentialView,
    pub gateway_key: CredentialView,
    pub webhook_secret: CredentialView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastErrorView>,
}

impl ConnectionStatusResponse {
    #[must_use]
    pub fn from_report(request_id: Uuid, report: StatusReport) -> Self {
        Self {
            success: true,
            request_id,
            status: report.status.to_string(),
            current_step: report.current_step,
            region: report.region,
            ttn_org_id: report.ttn_org_id,
            ttn_app_id: report.ttn_app_id,
            webhook_id: report.webhook_id,
            webhook_url: report.webhook_url,
            rights_status: report.rights_status.to_string(),
            org_key: report.org_key.into(),
            app_key: report.app_key.into(),
            gateway_key: report.gateway_key.into(),
            webhook_secret: report.webhook_secret.into(),
            last_error: report.last_error.map(Into::into),
        }
    }
}

/// One remote plane's outcome within a device operation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlaneResult {
    pub plane: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<PlaneReport> for PlaneResult {
    fn from(report: PlaneReport) -> Self {
        Self {
            plane: report.plane.to_string(),
            outcome: report.outcome.to_string(),
            message: report.message,
        }
    }
}

/// Response to device `create` and `delete`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub dev_eui: String,
    pub ttn_device_id: Option<String>,
    pub provisioning_state: String,
    pub planes: Vec<PlaneResult>,
}

impl DeviceResponse {
    #[must_use]
    pub fn from_report(request_id: Uuid, report: DeviceReport) -> Self {
        Self {
            success: true,
            request_id,
            dev_eui: report.dev_eui,
            ttn_device_id: report.ttn_device_id,
            provisioning_state: report.provisioning_state.to_string(),
            planes: report.planes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Response to device `diagnose`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DiagnoseResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub dev_eui: String,
    pub classification: String,
    pub present_identity: bool,
    pub present_join: bool,
    pub present_network: bool,
    pub present_application: bool,
    pub hint: String,
}

impl DiagnoseResponse {
    #[must_use]
    pub fn from_report(request_id: Uuid, report: DiagnoseReport) -> Self {
        use frostguard_provisioning::DeviceClassification as C;
        let classification = match report.classification {
            C::FullyProvisioned => "fully_provisioned",
            C::NotProvisioned => "not_provisioned",
            C::SplitBrainNoKeys => "split_brain_no_keys",
            C::SplitBrainOrphaned => "split_brain_orphaned",
            C::Partial => "partial",
        };
        Self {
            success: true,
            request_id,
            dev_eui: report.dev_eui,
            classification: classification.to_string(),
            present_identity: report.present_identity,
            present_join: report.present_join,
            present_network: report.present_network,
            present_application: report.present_application,
            hint: report.hint.to_string(),
        }
    }
}

/// Response to device `adopt`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdoptResponse {
    pub success: bool,
    pub request_id: Uuid,
    /// `adopted_exact_id`, `adopted_by_scan`, `orphan_warning` or
    /// `not_found`.
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttn_device_id: Option<String>,
    /// Registry page the EUI scan matched on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Dependent planes still holding remnants of an orphaned device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planes: Option<Vec<String>>,
}

impl AdoptResponse {
    #[must_use]
    pub fn from_outcome(request_id: Uuid, outcome: AdoptOutcome) -> Self {
        let base = Self {
            success: true,
            request_id,
            result: String::new(),
            ttn_device_id: None,
            page: None,
            planes: None,
        };
        match outcome {
            AdoptOutcome::AdoptedExactId { ttn_device_id } => Self {
                result: "adopted_exact_id".to_string(),
                ttn_device_id: Some(ttn_device_id),
                ..base
            },
            AdoptOutcome::AdoptedByScan {
                ttn_device_id,
                page,
            } => Self {
                result: "adopted_by_scan".to_string(),
                ttn_device_id: Some(ttn_device_id),
                page: Some(page),
                ..base
            },
            AdoptOutcome::OrphanWarning { planes } => Self {
                result: "orphan_warning".to_string(),
                planes: Some(planes),
                ..base
            },
            AdoptOutcome::NotFound => Self {
                result: "not_found".to_string(),
                ..base
            },
        }
    }
}

/// Response to gateway `create`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GatewayResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub gateway_eui: String,
    pub ttn_gateway_id: String,
    pub owner: String,
    /// Credential strategy that won the registration.
    pub strategy: String,
    pub status: String,
    pub lns_key: CredentialView,
}

impl GatewayResponse {
    #[must_use]
    pub fn from_report(request_id: Uuid, report: GatewayReport) -> Self {
        Self {
            success: true,
            request_id,
            gateway_eui: report.gateway_eui,
            ttn_gateway_id: report.ttn_gateway_id,
            owner: report.owner.to_string(),
            strategy: report.strategy.to_string(),
            status: report.status.to_string(),
            lns_key: report.lns_key.into(),
        }
    }
}

/// Response to gateway `refresh_status`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GatewayStatusResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub gateway_eui: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adopt_outcome_flattens_by_variant() {
        let request_id = Uuid::new_v4();

        let response = AdoptResponse::from_outcome(
            request_id,
            AdoptOutcome::AdoptedByScan {
                ttn_device_id: "legacy-sensor-7".to_string(),
                page: 3,
            },
        );
        assert_eq!(response.result, "adopted_by_scan");
        assert_eq!(response.page, Some(3));
        assert_eq!(response.request_id, request_id);

        let response = AdoptResponse::from_outcome(
            request_id,
            AdoptOutcome::OrphanWarning {
                planes: vec!["join".to_string()],
            },
        );
        assert_eq!(response.result, "orphan_warning");
        assert!(response.ttn_device_id.is_none());

        let json = serde_json::to_value(AdoptResponse::from_outcome(
            request_id,
            AdoptOutcome::NotFound,
        ))
        .unwrap();
        assert_eq!(json["result"], "not_found");
        assert!(json.get("ttn_device_id").is_none());
    }

    #[test]
    fn test_envelope_carries_the_category_and_guidance() {
        let err = ProvisionError::InvalidState {
            message: "application rights are known-forbidden; retry cannot help, \
                      use start_fresh"
                .to_string(),
            use_start_fresh: true,
        };
        let envelope = ErrorEnvelope::from_error(Uuid::new_v4(), &err);
        assert!(!envelope.success);
        assert_eq!(envelope.error, "invalid_state");
        assert!(!envelope.retryable);
        assert!(envelope.use_start_fresh);
        assert!(envelope.step.is_none());
    }

    #[test]
    fn test_actions_deserialize_snake_case() {
        let request: ConnectionRequest = serde_json::from_value(serde_json::json!({
            "action": "start_fresh",
            "tenant_id": Uuid::new_v4(),
        }))
        .unwrap();
        assert_eq!(request.action, ConnectionAction::StartFresh);

        let request: GatewayRequest = serde_json::from_value(serde_json::json!({
            "action": "refresh_status",
            "tenant_id": Uuid::new_v4(),
            "gateway_eui": "AA555A0000000101",
        }))
        .unwrap();
        assert_eq!(request.action, GatewayAction::RefreshStatus);
    }
}
