//! FrostGuard Provisioning API.
//!
//! HTTP surface over the tenant provisioning services: the TTN
//! connection lifecycle, end-device registration and repair, and
//! gateway registration. Each resource gets one action-dispatch
//! endpoint, matching how the provisioning UI drives the control
//! plane.
//!
//! # Endpoints
//!
//! - `POST /provisioning/connection` - `{ action: provision | retry |
//!   start_fresh | status | delete | regenerate_webhook_secret,
//!   tenant_id, region? }`
//! - `POST /provisioning/devices` - `{ action: create | delete |
//!   diagnose | adopt, tenant_id, dev_eui, join_eui?, name? }`
//! - `POST /provisioning/gateways` - `{ action: create | delete |
//!   refresh_status, tenant_id, gateway_eui, name?, latitude?,
//!   longitude?, altitude? }`
//!
//! Application-level failures are reported in-band: the response is an
//! HTTP 200 envelope with `success: false`, the stable failure
//! category, the `retryable`/`use_start_fresh` hints and the remote
//! correlation id, so callers never reverse-map transport status codes
//! into provisioning semantics. Only malformed requests (bad EUI,
//! unknown region or action, missing field) get a 400.

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;

pub use error::{ApiError, ApiResult};
pub use models::{
    Acknowledgement, AdoptResponse, ConnectionAction, ConnectionRequest, ConnectionStatusResponse,
    DeviceAction, DeviceRequest, DeviceResponse, DiagnoseResponse, ErrorEnvelope, GatewayAction,
    GatewayRequest, GatewayResponse, GatewayStatusResponse, ProvisionResponse,
};
pub use router::{provisioning_routes, ProvisioningState};
