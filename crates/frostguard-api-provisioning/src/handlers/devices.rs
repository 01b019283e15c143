//! Handler for the end-device endpoint.

use axum::{extract::State, response::Response, Json};
use tracing::info;
use uuid::Uuid;

use frostguard_core::{DevEui, JoinEui};

use crate::error::{respond, ApiError, ApiResult};
use crate::models::{
    AdoptResponse, DeviceAction, DeviceRequest, DeviceResponse, DiagnoseResponse,
};
use crate::router::ProvisioningState;

/// Dispatch a device provisioning action.
///
/// `create` registers the device across the identity, join, network
/// and application planes and returns the per-plane outcome; `delete`
/// deregisters deepest-plane first; `diagnose` probes without writing;
/// `adopt` links an externally created device.
#[utoipa::path(
    post,
    path = "/provisioning/devices",
    tag = "Devices",
    request_body = DeviceRequest,
    responses(
        (status = 200, description = "Action outcome or failure envelope", body = DeviceResponse),
        (status = 400, description = "Malformed request or invalid EUI")
    )
)]
pub async fn device_action(
    State(state): State<ProvisioningState>,
    Json(request): Json<DeviceRequest>,
) -> ApiResult<Response> {
    let request_id = Uuid::new_v4();
    let tenant_id = request.tenant_id;
    let dev_eui = DevEui::parse(&request.dev_eui)?;
    info!(request_id = %request_id, tenant_id = %tenant_id, dev_eui = %dev_eui,
        action = ?request.action, "device action received");

    let response = match request.action {
        DeviceAction::Create => {
            let join_eui = request
                .join_eui
                .as_deref()
                .ok_or(ApiError::MissingField("join_eui"))?;
            let join_eui = JoinEui::parse(join_eui)?;
            respond(
                request_id,
                state
                    .devices
                    .create(tenant_id, &dev_eui, &join_eui, request.name.as_deref())
                    .await
                    .map(|report| DeviceResponse::from_report(request_id, report)),
            )
        }
        DeviceAction::Delete => respond(
            request_id,
            state
                .devices
                .delete(tenant_id, &dev_eui)
                .await
                .map(|report| DeviceResponse::from_report(request_id, report)),
        ),
        DeviceAction::Diagnose => respond(
            request_id,
            state
                .devices
                .diagnose(tenant_id, &dev_eui)
                .await
                .map(|report| DiagnoseResponse::from_report(request_id, report)),
        ),
        DeviceAction::Adopt => respond(
            request_id,
            state
                .devices
                .adopt(tenant_id, &dev_eui)
                .await
                .map(|outcome| AdoptResponse::from_outcome(request_id, outcome)),
        ),
    };
    Ok(response)
}
