//! Provisioning API error types.
//!
//! Two kinds of failure leave this crate: malformed requests, which are
//! transport-level and get a 400 before any service runs, and
//! provisioning outcomes, which are application-level and always travel
//! as an HTTP 200 [`ErrorEnvelope`] so client UIs act on the category
//! and the retry hints instead of parsing status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use frostguard_core::EuiError;
use frostguard_provisioning::{ProvisionError, ProvisionResult};

use crate::models::ErrorEnvelope;

/// Request validation failure.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A hardware identifier in the request failed to parse.
    #[error("invalid EUI: {0}")]
    InvalidEui(#[from] EuiError),

    /// The requested cluster region is not one we operate in.
    #[error("{0}")]
    InvalidRegion(String),

    /// A field the action needs was not supplied.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Result alias for handler functions.
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match &self {
            ApiError::InvalidEui(_) => "invalid_eui",
            ApiError::InvalidRegion(_) => "invalid_region",
            ApiError::MissingField(_) => "missing_field",
        };
        let body = json!({ "error": error, "message": self.to_string() });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Convert a provisioner result into the wire response.
///
/// Success serializes the typed payload; failure serializes the
/// envelope. Both are HTTP 200.
pub(crate) fn respond<T: serde::Serialize>(
    request_id: Uuid,
    result: ProvisionResult<T>,
) -> Response {
    match result {
        Ok(payload) => Json(payload).into_response(),
        Err(err) => {
            match &err {
                ProvisionError::Store(_)
                | ProvisionError::Secrets(_)
                | ProvisionError::Internal { .. } => {
                    error!(request_id = %request_id, category = err.category(), error = %err,
                        "provisioning infrastructure failure");
                }
                _ => {
                    warn!(request_id = %request_id, category = err.category(), error = %err,
                        "provisioning failed");
                }
            }
            Json(ErrorEnvelope::from_error(request_id, &err)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use frostguard_db::models::StepName;
    use frostguard_provisioning::error::RightsTarget;
    use frostguard_ttn::TtnError;

    use crate::models::Acknowledgement;

    fn body_of(response: Response) -> serde_json::Value {
        let bytes = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(axum::body::to_bytes(response.into_body(), 64 * 1024))
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_invalid_eui_is_a_400() {
        let err = ApiError::InvalidEui("zz".parse::<frostguard_core::DevEui>().unwrap_err());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response);
        assert_eq!(body["error"], "invalid_eui");
    }

    #[test]
    fn test_classified_failure_is_a_200_envelope() {
        let request_id = Uuid::new_v4();
        let ttn = TtnError::from_response("application fg-a-app", 403, "{}");
        let result: ProvisionResult<Acknowledgement> = Err(ProvisionError::from_ttn(
            StepName::VerifyApplicationRights,
            &RightsTarget::Application("fg-a-app".to_string()),
            ttn,
        ));
        let response = respond(request_id, result);
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response);
        assert_eq!(body["success"], false);
        assert_eq!(body["request_id"], request_id.to_string());
        assert_eq!(body["error"], "no_application_rights");
        assert_eq!(body["step"], "verify_application_rights");
        assert_eq!(body["retryable"], false);
        assert_eq!(body["use_start_fresh"], true);
    }

    #[test]
    fn test_infrastructure_failure_still_yields_the_envelope() {
        let result: ProvisionResult<Acknowledgement> = Err(ProvisionError::Internal {
            step: StepName::CreateOrganization,
            message: "key material missing from creation response".to_string(),
        });
        let response = respond(Uuid::new_v4(), result);
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "internal");
        assert_eq!(body["retryable"], false);
    }

    #[test]
    fn test_success_payload_passes_through() {
        let request_id = Uuid::new_v4();
        let response = respond(request_id, Ok(Acknowledgement::new(request_id)));
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response);
        assert_eq!(body["success"], true);
        assert_eq!(body["request_id"], request_id.to_string());
    }
}
