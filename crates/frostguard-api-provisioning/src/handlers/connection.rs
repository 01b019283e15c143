//! Handler for the tenant connection endpoint.

use axum::{extract::State, response::Response, Json};
use tracing::info;
use uuid::Uuid;

use frostguard_ttn::Region;

use crate::error::{respond, ApiError, ApiResult};
use crate::models::{
    Acknowledgement, ConnectionAction, ConnectionRequest, ConnectionStatusResponse,
    ProvisionResponse,
};
use crate::router::ProvisioningState;

/// Dispatch a connection lifecycle action.
///
/// `provision`, `retry` and `start_fresh` return the run outcome;
/// `status` and `regenerate_webhook_secret` return the connection
/// status; `delete` returns a bare acknowledgement. Application-level
/// failures come back as the HTTP 200 failure envelope.
#[utoipa::path(
    post,
    path = "/provisioning/connection",
    tag = "Connection",
    request_body = ConnectionRequest,
    responses(
        (status = 200, description = "Action outcome or failure envelope", body = ProvisionResponse),
        (status = 400, description = "Malformed request")
    )
)]
pub async fn connection_action(
    State(state): State<ProvisioningState>,
    Json(request): Json<ConnectionRequest>,
) -> ApiResult<Response> {
    let request_id = Uuid::new_v4();
    let tenant_id = request.tenant_id;
    info!(request_id = %request_id, tenant_id = %tenant_id, action = ?request.action,
        "connection action received");

    let response = match request.action {
        ConnectionAction::Provision => {
            let region = parse_region(request.region.as_deref())?;
            respond(
                request_id,
                state
                    .connections
                    .provision(tenant_id, region)
                    .await
                    .map(|outcome| ProvisionResponse::from_outcome(request_id, outcome)),
            )
        }
        ConnectionAction::Retry => respond(
            request_id,
            state
                .connections
                .retry(tenant_id)
                .await
                .map(|outcome| ProvisionResponse::from_outcome(request_id, outcome)),
        ),
        ConnectionAction::StartFresh => respond(
            request_id,
            state
                .connections
                .start_fresh(tenant_id)
                .await
                .map(|outcome| ProvisionResponse::from_outcome(request_id, outcome)),
        ),
        ConnectionAction::Status => respond(
            request_id,
            state
                .connections
                .status(tenant_id)
                .await
                .map(|report| ConnectionStatusResponse::from_report(request_id, report)),
        ),
        ConnectionAction::Delete => respond(
            request_id,
            state
                .connections
                .delete(tenant_id)
                .await
                .map(|()| Acknowledgement::new(request_id)),
        ),
        ConnectionAction::RegenerateWebhookSecret => respond(
            request_id,
            state
                .connections
                .regenerate_webhook_secret(tenant_id)
                .await
                .map(|report| ConnectionStatusResponse::from_report(request_id, report)),
        ),
    };
    Ok(response)
}

fn parse_region(raw: Option<&str>) -> ApiResult<Option<Region>> {
    raw.map(str::parse::<Region>)
        .transpose()
        .map_err(ApiError::InvalidRegion)
}
