//! Handler for the gateway endpoint.

use axum::{extract::State, response::Response, Json};
use tracing::info;
use uuid::Uuid;

use frostguard_core::GatewayEui;

use crate::error::{respond, ApiResult};
use crate::models::{
    Acknowledgement, GatewayAction, GatewayRequest, GatewayResponse, GatewayStatusResponse,
};
use crate::router::ProvisioningState;

/// Dispatch a gateway provisioning action.
///
/// `create` walks the credential strategy ladder and mints the LNS key
/// with the winning credential; `delete` deregisters, purges and
/// verifies the EUI is released; `refresh_status` polls the gateway's
/// connection stats.
#[utoipa::path(
    post,
    path = "/provisioning/gateways",
    tag = "Gateways",
    request_body = GatewayRequest,
    responses(
        (status = 200, description = "Action outcome or failure envelope", body = GatewayResponse),
        (status = 400, description = "Malformed request or invalid EUI")
    )
)]
pub async fn gateway_action(
    State(state): State<ProvisioningState>,
    Json(request): Json<GatewayRequest>,
) -> ApiResult<Response> {
    let request_id = Uuid::new_v4();
    let tenant_id = request.tenant_id;
    let gateway_eui = GatewayEui::parse(&request.gateway_eui)?;
    info!(request_id = %request_id, tenant_id = %tenant_id, gateway_eui = %gateway_eui,
        action = ?request.action, "gateway action received");

    let response = match request.action {
        GatewayAction::Create => {
            let location = match (request.latitude, request.longitude) {
                (Some(lat), Some(lon)) => Some((lat, lon, request.altitude)),
                _ => None,
            };
            respond(
                request_id,
                state
                    .gateways
                    .create(tenant_id, &gateway_eui, request.name.as_deref(), location)
                    .await
                    .map(|report| GatewayResponse::from_report(request_id, report)),
            )
        }
        GatewayAction::Delete => respond(
            request_id,
            state
                .gateways
                .delete(tenant_id, &gateway_eui)
                .await
                .map(|()| Acknowledgement::new(request_id)),
        ),
        GatewayAction::RefreshStatus => respond(
            request_id,
            state
                .gateways
                .refresh_status(tenant_id, &gateway_eui)
                .await
                .map(|status| GatewayStatusResponse {
                    success: true,
                    request_id,
                    gateway_eui: gateway_eui.as_str().to_string(),
                    status: status.to_string(),
                }),
        ),
    };
    Ok(response)
}
