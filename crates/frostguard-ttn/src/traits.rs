//! Capability-based trait seams for the TTN client.
//!
//! The provisioners are generic over these traits rather than the concrete
//! HTTP client, which keeps the state machines testable against in-memory
//! fakes. Every method takes the bearer token explicitly because the
//! orchestrator deliberately switches credentials mid-sequence.

use async_trait::async_trait;

use crate::error::TtnResult;
use crate::types::{
    ApiKey, ApiKeyRequest, Application, AuthInfo, EndDevice, FieldMask, Gateway, Organization,
    Webhook,
};

/// Everything the provisioners need from the remote system, in one
/// bound. Implemented for free by any type carrying all six capability
/// traits, including [`crate::TtnClient`] and test fakes.
pub trait TtnApi:
    OrganizationOps + ApplicationOps + WebhookOps + AuthInfoOps + EndDeviceOps + GatewayOps
{
}

impl<T> TtnApi for T where
    T: OrganizationOps + ApplicationOps + WebhookOps + AuthInfoOps + EndDeviceOps + GatewayOps
{
}

/// Organization registry operations on the identity server.
#[async_trait]
pub trait OrganizationOps: Send + Sync {
    /// Create an organization owned by the given TTN user.
    async fn create_organization(
        &self,
        token: &str,
        user_id: &str,
        org: &Organization,
    ) -> TtnResult<Organization>;

    /// Read an organization back. Used as the ownership probe after create:
    /// 404/403 on an id we just claimed means someone else owns it.
    async fn get_organization(&self, token: &str, org_id: &str) -> TtnResult<Organization>;

    /// Mint an organization-scoped API key.
    async fn create_organization_api_key(
        &self,
        token: &str,
        org_id: &str,
        request: &ApiKeyRequest,
    ) -> TtnResult<ApiKey>;

    /// Delete the organization from the identity server.
    async fn delete_organization(&self, token: &str, org_id: &str) -> TtnResult<()>;
}

/// Application registry operations on the identity server.
#[async_trait]
pub trait ApplicationOps: Send + Sync {
    /// Create an application under an organization.
    async fn create_application(
        &self,
        token: &str,
        org_id: &str,
        app: &Application,
    ) -> TtnResult<Application>;

    /// Read an application back (also the rights probe for it).
    async fn get_application(&self, token: &str, app_id: &str) -> TtnResult<Application>;

    /// Mint an application-scoped API key.
    async fn create_application_api_key(
        &self,
        token: &str,
        app_id: &str,
        request: &ApiKeyRequest,
    ) -> TtnResult<ApiKey>;

    /// Delete the application from the identity server.
    async fn delete_application(&self, token: &str, app_id: &str) -> TtnResult<()>;
}

/// Application-server webhook operations (regional cluster).
#[async_trait]
pub trait WebhookOps: Send + Sync {
    /// Create or replace a webhook. Set semantics, safe to repeat.
    async fn set_webhook(&self, token: &str, app_id: &str, webhook: &Webhook)
        -> TtnResult<Webhook>;

    /// Delete a webhook.
    async fn delete_webhook(&self, token: &str, app_id: &str, webhook_id: &str) -> TtnResult<()>;
}

/// Rights introspection for a presented credential.
#[async_trait]
pub trait AuthInfoOps: Send + Sync {
    /// Fetch what the remote system knows about this credential.
    async fn auth_info(&self, token: &str) -> TtnResult<AuthInfo>;
}

/// End-device operations across the four remote planes.
///
/// `is_*` is the identity server (registry of record, global cluster);
/// `js_*`/`ns_*`/`as_*` are the join, network and application servers on
/// the regional cluster, each independently addressable by the same
/// logical device id.
#[async_trait]
pub trait EndDeviceOps: Send + Sync {
    /// True create on the identity server; 409 if the EUI is claimed.
    async fn is_create_device(
        &self,
        token: &str,
        app_id: &str,
        device: &EndDevice,
    ) -> TtnResult<EndDevice>;

    async fn is_get_device(&self, token: &str, app_id: &str, device_id: &str)
        -> TtnResult<EndDevice>;

    async fn is_delete_device(&self, token: &str, app_id: &str, device_id: &str) -> TtnResult<()>;

    /// Paginated identity-server listing (used by adoption scans).
    async fn is_list_devices(
        &self,
        token: &str,
        app_id: &str,
        page: u32,
        limit: u32,
    ) -> TtnResult<Vec<EndDevice>>;

    /// Join server: set/update root key material. Idempotent.
    async fn js_set_device(
        &self,
        token: &str,
        app_id: &str,
        device: &EndDevice,
        field_mask: &FieldMask,
    ) -> TtnResult<EndDevice>;

    async fn js_get_device(&self, token: &str, app_id: &str, device_id: &str)
        -> TtnResult<EndDevice>;

    async fn js_delete_device(&self, token: &str, app_id: &str, device_id: &str) -> TtnResult<()>;

    /// Network server: set/update MAC and radio parameters. Idempotent.
    async fn ns_set_device(
        &self,
        token: &str,
        app_id: &str,
        device: &EndDevice,
        field_mask: &FieldMask,
    ) -> TtnResult<EndDevice>;

    async fn ns_get_device(&self, token: &str, app_id: &str, device_id: &str)
        -> TtnResult<EndDevice>;

    async fn ns_delete_device(&self, token: &str, app_id: &str, device_id: &str) -> TtnResult<()>;

    /// Application server: register the device for data delivery. Idempotent.
    async fn as_set_device(
        &self,
        token: &str,
        app_id: &str,
        device: &EndDevice,
        field_mask: &FieldMask,
    ) -> TtnResult<EndDevice>;

    async fn as_get_device(&self, token: &str, app_id: &str, device_id: &str)
        -> TtnResult<EndDevice>;

    async fn as_delete_device(&self, token: &str, app_id: &str, device_id: &str) -> TtnResult<()>;
}

/// Gateway registry operations.
#[async_trait]
pub trait GatewayOps: Send + Sync {
    /// Register a gateway under a TTN user (identity server).
    async fn register_gateway_for_user(
        &self,
        token: &str,
        user_id: &str,
        gateway: &Gateway,
    ) -> TtnResult<Gateway>;

    /// Register a gateway under a TTN organization (identity server).
    async fn register_gateway_for_org(
        &self,
        token: &str,
        org_id: &str,
        gateway: &Gateway,
    ) -> TtnResult<Gateway>;

    async fn get_gateway(&self, token: &str, gateway_id: &str) -> TtnResult<Gateway>;

    /// Field-masked update (server address, antenna location).
    async fn update_gateway(
        &self,
        token: &str,
        gateway_id: &str,
        gateway: &Gateway,
        field_mask: &FieldMask,
    ) -> TtnResult<Gateway>;

    async fn delete_gateway(&self, token: &str, gateway_id: &str) -> TtnResult<()>;

    /// Hard delete, releasing the EUI for reuse.
    async fn purge_gateway(&self, token: &str, gateway_id: &str) -> TtnResult<()>;

    /// Mint a gateway-scoped API key (LNS/CUPS credentials).
    async fn create_gateway_api_key(
        &self,
        token: &str,
        gateway_id: &str,
        request: &ApiKeyRequest,
    ) -> TtnResult<ApiKey>;

    /// Connection stats from the regional gateway server. 404 means
    /// registered but not yet connected.
    async fn gateway_connection_stats(
        &self,
        token: &str,
        gateway_id: &str,
    ) -> TtnResult<serde_json::Value>;
}
