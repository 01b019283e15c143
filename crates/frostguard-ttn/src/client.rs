//! HTTP implementation of the TTN capability traits.

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ClusterConfig;
use crate::error::{TtnError, TtnResult};
use crate::traits::{
    ApplicationOps, AuthInfoOps, EndDeviceOps, GatewayOps, OrganizationOps, WebhookOps,
};
use crate::types::{
    ApiKey, ApiKeyRequest, Application, AuthInfo, EndDevice, EndDeviceList, FieldMask, Gateway,
    Organization, Webhook,
};

const USER_AGENT: &str = concat!("frostguard-control-plane/", env!("CARGO_PKG_VERSION"));

/// TTN v3 REST client with cross-cluster support.
///
/// One instance serves one tenant connection: identity-plane calls go to
/// the global registry, device-plane and webhook calls to the tenant's
/// regional cluster.
#[derive(Debug, Clone)]
pub struct TtnClient {
    http: Client,
    config: ClusterConfig,
}

impl TtnClient {
    /// Build a client for the given cluster pair.
    pub fn new(config: ClusterConfig) -> TtnResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TtnError::Transport {
                resource: "client".to_string(),
                message: format!("failed to build HTTP client: {e}"),
                source: Some(e),
            })?;

        Ok(Self { http, config })
    }

    /// The cluster configuration this client talks to.
    #[must_use]
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    fn identity_url(&self, path: &str) -> String {
        format!("{}/api/v3{path}", self.config.identity_base_url)
    }

    fn regional_url(&self, path: &str) -> String {
        format!("{}/api/v3{path}", self.config.regional_base_url)
    }

    /// Issue one request and map the response into the error taxonomy.
    async fn send(
        &self,
        method: Method,
        url: String,
        token: &str,
        body: Option<Value>,
        resource: &str,
    ) -> TtnResult<Value> {
        debug!(method = %method, url = %url, resource, "calling TTN");

        let mut request = self
            .http
            .request(method, &url)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::ACCEPT, "application/json");
        if let Some(payload) = &body {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("timeout after {:?}", self.config.timeout)
            } else {
                e.to_string()
            };
            TtnError::Transport {
                resource: resource.to_string(),
                message,
                source: Some(e),
            }
        })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let err = TtnError::from_response(resource, status.as_u16(), &text);
            warn!(
                resource,
                status = status.as_u16(),
                correlation_id = err.correlation_id().unwrap_or(""),
                "TTN call failed"
            );
            return Err(err);
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| TtnError::Decode {
            resource: resource.to_string(),
            message: e.to_string(),
        })
    }

    fn encode<T: serde::Serialize>(resource: &str, payload: &T) -> TtnResult<Value> {
        serde_json::to_value(payload).map_err(|e| TtnError::Decode {
            resource: resource.to_string(),
            message: format!("failed to encode request: {e}"),
        })
    }

    async fn send_as<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        token: &str,
        body: Option<Value>,
        resource: &str,
    ) -> TtnResult<T> {
        let value = self.send(method, url, token, body, resource).await?;
        serde_json::from_value(value).map_err(|e| TtnError::Decode {
            resource: resource.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl OrganizationOps for TtnClient {
    async fn create_organization(
        &self,
        token: &str,
        user_id: &str,
        org: &Organization,
    ) -> TtnResult<Organization> {
        let resource = format!("organization {}", org.ids.organization_id);
        self.send_as(
            Method::POST,
            self.identity_url(&format!("/users/{user_id}/organizations")),
            token,
            Some(json!({ "organization": org })),
            &resource,
        )
        .await
    }

    async fn get_organization(&self, token: &str, org_id: &str) -> TtnResult<Organization> {
        let resource = format!("organization {org_id}");
        self.send_as(
            Method::GET,
            self.identity_url(&format!("/organizations/{org_id}")),
            token,
            None,
            &resource,
        )
        .await
    }

    async fn create_organization_api_key(
        &self,
        token: &str,
        org_id: &str,
        request: &ApiKeyRequest,
    ) -> TtnResult<ApiKey> {
        let resource = format!("organization {org_id} api key");
        let body = Self::encode(&resource, request)?;
        self.send_as(
            Method::POST,
            self.identity_url(&format!("/organizations/{org_id}/api-keys")),
            token,
            Some(body),
            &resource,
        )
        .await
    }

    async fn delete_organization(&self, token: &str, org_id: &str) -> TtnResult<()> {
        let resource = format!("organization {org_id}");
        self.send(
            Method::DELETE,
            self.identity_url(&format!("/organizations/{org_id}")),
            token,
            None,
            &resource,
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl ApplicationOps for TtnClient {
    async fn create_application(
        &self,
        token: &str,
        org_id: &str,
        app: &Application,
    ) -> TtnResult<Application> {
        let resource = format!("application {}", app.ids.application_id);
        self.send_as(
            Method::POST,
            self.identity_url(&format!("/organizations/{org_id}/applications")),
            token,
            Some(json!({ "application": app })),
            &resource,
        )
        .await
    }

    async fn get_application(&self, token: &str, app_id: &str) -> TtnResult<Application> {
        let resource = format!("application {app_id}");
        self.send_as(
            Method::GET,
            self.identity_url(&format!("/applications/{app_id}")),
            token,
            None,
            &resource,
        )
        .await
    }

    async fn create_application_api_key(
        &self,
        token: &str,
        app_id: &str,
        request: &ApiKeyRequest,
    ) -> TtnResult<ApiKey> {
        let resource = format!("application {app_id} api key");
        let body = Self::encode(&resource, request)?;
        self.send_as(
            Method::POST,
            self.identity_url(&format!("/applications/{app_id}/api-keys")),
            token,
            Some(body),
            &resource,
        )
        .await
    }

    async fn delete_application(&self, token: &str, app_id: &str) -> TtnResult<()> {
        let resource = format!("application {app_id}");
        self.send(
            Method::DELETE,
            self.identity_url(&format!("/applications/{app_id}")),
            token,
            None,
            &resource,
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl WebhookOps for TtnClient {
    async fn set_webhook(
        &self,
        token: &str,
        app_id: &str,
        webhook: &Webhook,
    ) -> TtnResult<Webhook> {
        let resource = format!("webhook {}", webhook.ids.webhook_id);
        let mask = FieldMask::of(&[
            "base_url",
            "format",
            "headers",
            "uplink_message",
            "join_accept",
        ]);
        self.send_as(
            Method::PUT,
            self.regional_url(&format!(
                "/as/webhooks/{app_id}/{}",
                webhook.ids.webhook_id
            )),
            token,
            Some(json!({ "webhook": webhook, "field_mask": mask })),
            &resource,
        )
        .await
    }

    async fn delete_webhook(&self, token: &str, app_id: &str, webhook_id: &str) -> TtnResult<()> {
        let resource = format!("webhook {webhook_id}");
        self.send(
            Method::DELETE,
            self.regional_url(&format!("/as/webhooks/{app_id}/{webhook_id}")),
            token,
            None,
            &resource,
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl AuthInfoOps for TtnClient {
    async fn auth_info(&self, token: &str) -> TtnResult<AuthInfo> {
        self.send_as(
            Method::GET,
            self.identity_url("/auth_info"),
            token,
            None,
            "auth info",
        )
        .await
    }
}

#[async_trait]
impl EndDeviceOps for TtnClient {
    async fn is_create_device(
        &self,
        token: &str,
        app_id: &str,
        device: &EndDevice,
    ) -> TtnResult<EndDevice> {
        let resource = format!("device {}", device.ids.device_id);
        self.send_as(
            Method::POST,
            self.identity_url(&format!("/applications/{app_id}/devices")),
            token,
            Some(json!({ "end_device": device })),
            &resource,
        )
        .await
    }

    async fn is_get_device(
        &self,
        token: &str,
        app_id: &str,
        device_id: &str,
    ) -> TtnResult<EndDevice> {
        let resource = format!("device {device_id}");
        self.send_as(
            Method::GET,
            self.identity_url(&format!("/applications/{app_id}/devices/{device_id}")),
            token,
            None,
            &resource,
        )
        .await
    }

    async fn is_delete_device(&self, token: &str, app_id: &str, device_id: &str) -> TtnResult<()> {
        let resource = format!("device {device_id}");
        self.send(
            Method::DELETE,
            self.identity_url(&format!("/applications/{app_id}/devices/{device_id}")),
            token,
            None,
            &resource,
        )
        .await
        .map(|_| ())
    }

    async fn is_list_devices(
        &self,
        token: &str,
        app_id: &str,
        page: u32,
        limit: u32,
    ) -> TtnResult<Vec<EndDevice>> {
        let resource = format!("application {app_id} device list");
        let list: EndDeviceList = self
            .send_as(
                Method::GET,
                self.identity_url(&format!(
                    "/applications/{app_id}/devices?page={page}&limit={limit}&field_mask=ids"
                )),
                token,
                None,
                &resource,
            )
            .await?;
        Ok(list.end_devices)
    }

    async fn js_set_device(
        &self,
        token: &str,
        app_id: &str,
        device: &EndDevice,
        field_mask: &FieldMask,
    ) -> TtnResult<EndDevice> {
        self.plane_set("js", token, app_id, device, field_mask).await
    }

    async fn js_get_device(
        &self,
        token: &str,
        app_id: &str,
        device_id: &str,
    ) -> TtnResult<EndDevice> {
        self.plane_get("js", token, app_id, device_id).await
    }

    async fn js_delete_device(&self, token: &str, app_id: &str, device_id: &str) -> TtnResult<()> {
        self.plane_delete("js", token, app_id, device_id).await
    }

    async fn ns_set_device(
        &self,
        token: &str,
        app_id: &str,
        device: &EndDevice,
        field_mask: &FieldMask,
    ) -> TtnResult<EndDevice> {
        self.plane_set("ns", token, app_id, device, field_mask).await
    }

    async fn ns_get_device(
        &self,
        token: &str,
        app_id: &str,
        device_id: &str,
    ) -> TtnResult<EndDevice> {
        self.plane_get("ns", token, app_id, device_id).await
    }

    async fn ns_delete_device(&self, token: &str, app_id: &str, device_id: &str) -> TtnResult<()> {
        self.plane_delete("ns", token, app_id, device_id).await
    }

    async fn as_set_device(
        &self,
        token: &str,
        app_id: &str,
        device: &EndDevice,
        field_mask: &FieldMask,
    ) -> TtnResult<EndDevice> {
        self.plane_set("as", token, app_id, device, field_mask).await
    }

    async fn as_get_device(
        &self,
        token: &str,
        app_id: &str,
        device_id: &str,
    ) -> TtnResult<EndDevice> {
        self.plane_get("as", token, app_id, device_id).await
    }

    async fn as_delete_device(&self, token: &str, app_id: &str, device_id: &str) -> TtnResult<()> {
        self.plane_delete("as", token, app_id, device_id).await
    }
}

impl TtnClient {
    /// Set/update a device on one regional plane (`js`, `ns` or `as`).
    async fn plane_set(
        &self,
        plane: &str,
        token: &str,
        app_id: &str,
        device: &EndDevice,
        field_mask: &FieldMask,
    ) -> TtnResult<EndDevice> {
        let resource = format!("{plane} device {}", device.ids.device_id);
        self.send_as(
            Method::PUT,
            self.regional_url(&format!(
                "/{plane}/applications/{app_id}/devices/{}",
                device.ids.device_id
            )),
            token,
            Some(json!({ "end_device": device, "field_mask": field_mask })),
            &resource,
        )
        .await
    }

    async fn plane_get(
        &self,
        plane: &str,
        token: &str,
        app_id: &str,
        device_id: &str,
    ) -> TtnResult<EndDevice> {
        let resource = format!("{plane} device {device_id}");
        self.send_as(
            Method::GET,
            self.regional_url(&format!("/{plane}/applications/{app_id}/devices/{device_id}")),
            token,
            None,
            &resource,
        )
        .await
    }

    async fn plane_delete(
        &self,
        plane: &str,
        token: &str,
        app_id: &str,
        device_id: &str,
    ) -> TtnResult<()> {
        let resource = format!("{plane} device {device_id}");
        self.send(
            Method::DELETE,
            self.regional_url(&format!("/{plane}/applications/{app_id}/devices/{device_id}")),
            token,
            None,
            &resource,
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl GatewayOps for TtnClient {
    async fn register_gateway_for_user(
        &self,
        token: &str,
        user_id: &str,
        gateway: &Gateway,
    ) -> TtnResult<Gateway> {
        let resource = format!("gateway {}", gateway.ids.gateway_id);
        self.send_as(
            Method::POST,
            self.identity_url(&format!("/users/{user_id}/gateways")),
            token,
            Some(json!({ "gateway": gateway })),
            &resource,
        )
        .await
    }

    async fn register_gateway_for_org(
        &self,
        token: &str,
        org_id: &str,
        gateway: &Gateway,
    ) -> TtnResult<Gateway> {
        let resource = format!("gateway {}", gateway.ids.gateway_id);
        self.send_as(
            Method::POST,
            self.identity_url(&format!("/organizations/{org_id}/gateways")),
            token,
            Some(json!({ "gateway": gateway })),
            &resource,
        )
        .await
    }

    async fn get_gateway(&self, token: &str, gateway_id: &str) -> TtnResult<Gateway> {
        let resource = format!("gateway {gateway_id}");
        self.send_as(
            Method::GET,
            self.identity_url(&format!(
                "/gateways/{gateway_id}?field_mask=ids,name,frequency_plan_ids,gateway_server_address,antennas"
            )),
            token,
            None,
            &resource,
        )
        .await
    }

    async fn update_gateway(
        &self,
        token: &str,
        gateway_id: &str,
        gateway: &Gateway,
        field_mask: &FieldMask,
    ) -> TtnResult<Gateway> {
        let resource = format!("gateway {gateway_id}");
        self.send_as(
            Method::PUT,
            self.identity_url(&format!("/gateways/{gateway_id}")),
            token,
            Some(json!({ "gateway": gateway, "field_mask": field_mask })),
            &resource,
        )
        .await
    }

    async fn delete_gateway(&self, token: &str, gateway_id: &str) -> TtnResult<()> {
        let resource = format!("gateway {gateway_id}");
        self.send(
            Method::DELETE,
            self.identity_url(&format!("/gateways/{gateway_id}")),
            token,
            None,
            &resource,
        )
        .await
        .map(|_| ())
    }

    async fn purge_gateway(&self, token: &str, gateway_id: &str) -> TtnResult<()> {
        let resource = format!("gateway {gateway_id} purge");
        self.send(
            Method::DELETE,
            self.identity_url(&format!("/gateways/{gateway_id}/purge")),
            token,
            None,
            &resource,
        )
        .await
        .map(|_| ())
    }

    async fn create_gateway_api_key(
        &self,
        token: &str,
        gateway_id: &str,
        request: &ApiKeyRequest,
    ) -> TtnResult<ApiKey> {
        let resource = format!("gateway {gateway_id} api key");
        let body = Self::encode(&resource, request)?;
        self.send_as(
            Method::POST,
            self.identity_url(&format!("/gateways/{gateway_id}/api-keys")),
            token,
            Some(body),
            &resource,
        )
        .await
    }

    async fn gateway_connection_stats(
        &self,
        token: &str,
        gateway_id: &str,
    ) -> TtnResult<serde_json::Value> {
        let resource = format!("gateway {gateway_id} connection stats");
        self.send(
            Method::GET,
            self.regional_url(&format!("/gs/gateways/{gateway_id}/connection/stats")),
            token,
            None,
            &resource,
        )
        .await
    }
}
