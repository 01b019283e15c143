//! Router configuration for the provisioning API.

use std::sync::Arc;

use axum::{routing::post, Router};

use frostguard_provisioning::{ConnectionOrchestrator, DeviceProvisioner, GatewayProvisioner};

use crate::handlers::{connection, devices, gateways};

/// Shared state for provisioning routes.
#[derive(Clone)]
pub struct ProvisioningState {
    pub connections: Arc<ConnectionOrchestrator>,
    pub devices: Arc<DeviceProvisioner>,
    pub gateways: Arc<GatewayProvisioner>,
}

impl ProvisioningState {
    #[must_use]
    pub fn new(
        connections: Arc<ConnectionOrchestrator>,
        devices: Arc<DeviceProvisioner>,
        gateways: Arc<GatewayProvisioner>,
    ) -> Self {
        Self {
            connections,
            devices,
            gateways,
        }
    }
}

/// Create the provisioning API router.
pub fn provisioning_routes(state: ProvisioningState) -> Router {
    Router::new()
        .route("/provisioning/connection", post(connection::connection_action))
        .route("/provisioning/devices", post(devices::device_action))
        .route("/provisioning/gateways", post(gateways::gateway_action))
        .with_state(state)
}
