//! Shared fixture: an in-memory TTN fake and in-memory stores.
//!
//! The fake models just enough remote behavior for the provisioner
//! state machines: ownership (ours vs foreign), per-plane device
//! registries, one-shot injected failures, and per-operation call and
//! token accounting so tests can assert which credential was used
//! where.

// Each integration test binary compiles this module separately and
// uses a different subset of it.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::types::Json;
use uuid::Uuid;

use frostguard_db::models::{
    ConnectionStatus, Device, DeviceProvisioningState, DeviceStatus, Gateway as GatewayRow,
    GatewayStatus, NewDevice, NewGateway, NewLogEntry, NewTenantConnection, ProvisioningLogEntry,
    RightsCheckStatus, StepLedger, TenantConnection,
};
use frostguard_db::{ConnectionStore, DbError, DeviceStore, GatewayStore, ProvisioningLogStore};
use frostguard_secrets::SecretVault;
use frostguard_ttn::types::{
    ApiKey, ApiKeyRequest, Application, ApplicationIds, AuthInfo, AuthInfoApiKey, EndDevice,
    EntityIds, FieldMask, Gateway, Organization, OrganizationIds, Webhook,
};
use frostguard_ttn::{
    ApplicationOps, AuthInfoOps, EndDeviceOps, GatewayOps, OrganizationOps, TtnError, TtnResult,
    WebhookOps,
};
use frostguard_provisioning::ProvisioningSettings;

pub const ADMIN_TOKEN: &str = "NNSXS.ADMIN";
pub const TTN_USER: &str = "frostguard-admin";

pub fn settings() -> ProvisioningSettings {
    ProvisioningSettings::new(ADMIN_TOKEN, TTN_USER, "https://ingest.frostguard.example")
}

pub fn vault() -> SecretVault {
    SecretVault::new([7u8; 32])
}

fn remote_err(resource: &str, status: u16, body: &str) -> TtnError {
    TtnError::from_response(resource, status, body)
}

fn conflict_with_owner(resource: &str, key: &str, owner: &str) -> TtnError {
    let body = format!(
        r#"{{"details":[{{"namespace":"pkg/identityserver","name":"id_taken","attributes":{{"{key}":"{owner}"}}}}]}}"#
    );
    remote_err(resource, 409, &body)
}

/// What scope a fake-minted key was created under.
#[derive(Debug, Clone)]
pub enum KeyScope {
    Org(String),
    App(String),
    Gateway(String),
}

#[derive(Debug, Clone)]
pub struct MintedKey {
    pub scope: KeyScope,
    pub rights: Vec<String>,
}

#[derive(Default)]
pub struct RemoteState {
    pub orgs: BTreeSet<String>,
    pub foreign_orgs: BTreeSet<String>,
    pub apps: BTreeSet<String>,
    pub foreign_apps: BTreeSet<String>,
    pub webhooks: BTreeMap<String, Webhook>,
    pub is_devices: BTreeMap<String, EndDevice>,
    pub js_devices: BTreeSet<String>,
    pub ns_devices: BTreeSet<String>,
    pub as_devices: BTreeSet<String>,
    /// DevEUI (uppercase) -> application id owning it elsewhere.
    pub foreign_device_euis: BTreeMap<String, String>,
    pub gateways: BTreeSet<String>,
    pub foreign_gateway_euis: BTreeSet<String>,
    pub connected_gateways: BTreeSet<String>,
    /// Tokens that get a 403 from org-parented gateway registration.
    pub forbid_org_gateway_tokens: BTreeSet<String>,
    pub minted: BTreeMap<String, MintedKey>,
    /// One-shot failures keyed by operation name.
    pub fail_next: BTreeMap<&'static str, u16>,
    pub calls: BTreeMap<&'static str, u32>,
    pub tokens: BTreeMap<&'static str, Vec<String>>,
    pub key_seq: u32,
}

pub struct MockTtn {
    pub state: Mutex<RemoteState>,
}

impl MockTtn {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RemoteState::default()),
        })
    }

    pub fn calls(&self, op: &str) -> u32 {
        *self.state.lock().unwrap().calls.get(op).unwrap_or(&0)
    }

    pub fn total_calls(&self) -> u32 {
        self.state.lock().unwrap().calls.values().sum()
    }

    pub fn tokens_for(&self, op: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tokens
            .get(op)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_next(&self, op: &'static str, status: u16) {
        self.state.lock().unwrap().fail_next.insert(op, status);
    }

    fn begin(&self, op: &'static str, token: &str) -> Result<(), TtnError> {
        let mut s = self.state.lock().unwrap();
        *s.calls.entry(op).or_default() += 1;
        s.tokens.entry(op).or_default().push(token.to_string());
        if let Some(status) = s.fail_next.remove(op) {
            return Err(remote_err(op, status, "{}"));
        }
        Ok(())
    }

    fn mint(&self, scope: KeyScope, rights: Vec<String>) -> ApiKey {
        let mut s = self.state.lock().unwrap();
        s.key_seq += 1;
        let seq = s.key_seq;
        let token = format!("NNSXS.KEY-{seq}");
        s.minted.insert(token.clone(), MintedKey { scope, rights: rights.clone() });
        ApiKey {
            id: format!("KEYID-{seq}"),
            key: Some(token),
            name: None,
            rights,
        }
    }
}

#[async_trait]
impl OrganizationOps for MockTtn {
    async fn create_organization(
        &self,
        token: &str,
        _user_id: &str,
        org: &Organization,
    ) -> TtnResult<Organization> {
        self.begin("create_organization", token)?;
        let mut s = self.state.lock().unwrap();
        let id = org.ids.organization_id.clone();
        if s.foreign_orgs.contains(&id) || s.orgs.contains(&id) {
            return Err(remote_err(&format!("organization {id}"), 409, "{}"));
        }
        s.orgs.insert(id);
        Ok(org.clone())
    }

    async fn get_organization(&self, token: &str, org_id: &str) -> TtnResult<Organization> {
        self.begin("get_organization", token)?;
        let s = self.state.lock().unwrap();
        if s.orgs.contains(org_id) {
            Ok(Organization::new(org_id, "fixture"))
        } else if s.foreign_orgs.contains(org_id) {
            Err(remote_err(&format!("organization {org_id}"), 403, "{}"))
        } else {
            Err(remote_err(&format!("organization {org_id}"), 404, "{}"))
        }
    }

    async fn create_organization_api_key(
        &self,
        token: &str,
        org_id: &str,
        request: &ApiKeyRequest,
    ) -> TtnResult<ApiKey> {
        self.begin("create_organization_api_key", token)?;
        {
            let s = self.state.lock().unwrap();
            if !s.orgs.contains(org_id) {
                let status = if s.foreign_orgs.contains(org_id) { 403 } else { 404 };
                return Err(remote_err(&format!("organization {org_id}"), status, "{}"));
            }
        }
        Ok(self.mint(KeyScope::Org(org_id.to_string()), request.rights.clone()))
    }

    async fn delete_organization(&self, token: &str, org_id: &str) -> TtnResult<()> {
        self.begin("delete_organization", token)?;
        let mut s = self.state.lock().unwrap();
        if s.orgs.remove(org_id) {
            Ok(())
        } else if s.foreign_orgs.contains(org_id) {
            Err(remote_err(&format!("organization {org_id}"), 403, "{}"))
        } else {
            Err(remote_err(&format!("organization {org_id}"), 404, "{}"))
        }
    }
}

#[async_trait]
impl ApplicationOps for MockTtn {
    async fn create_application(
        &self,
        token: &str,
        _org_id: &str,
        app: &Application,
    ) -> TtnResult<Application> {
        self.begin("create_application", token)?;
        let mut s = self.state.lock().unwrap();
        let id = app.ids.application_id.clone();
        if s.foreign_apps.contains(&id) || s.apps.contains(&id) {
            return Err(remote_err(&format!("application {id}"), 409, "{}"));
        }
        s.apps.insert(id);
        Ok(app.clone())
    }

    async fn get_application(&self, token: &str, app_id: &str) -> TtnResult<Application> {
        self.begin("get_application", token)?;
        let s = self.state.lock().unwrap();
        if s.apps.contains(app_id) {
            Ok(Application::new(app_id, "fixture"))
        } else if s.foreign_apps.contains(app_id) {
            Err(remote_err(&format!("application {app_id}"), 403, "{}"))
        } else {
            Err(remote_err(&format!("application {app_id}"), 404, "{}"))
        }
    }

    async fn create_application_api_key(
        &self,
        token: &str,
        app_id: &str,
        request: &ApiKeyRequest,
    ) -> TtnResult<ApiKey> {
        self.begin("create_application_api_key", token)?;
        {
            let s = self.state.lock().unwrap();
            if !s.apps.contains(app_id) {
                let status = if s.foreign_apps.contains(app_id) { 403 } else { 404 };
                return Err(remote_err(&format!("application {app_id}"), status, "{}"));
            }
        }
        Ok(self.mint(KeyScope::App(app_id.to_string()), request.rights.clone()))
    }

    async fn delete_application(&self, token: &str, app_id: &str) -> TtnResult<()> {
        self.begin("delete_application", token)?;
        let mut s = self.state.lock().unwrap();
        if s.apps.remove(app_id) {
            s.webhooks.retain(|key, _| !key.starts_with(&format!("{app_id}:")));
            Ok(())
        } else if s.foreign_apps.contains(app_id) {
            Err(remote_err(&format!("application {app_id}"), 403, "{}"))
        } else {
            Err(remote_err(&format!("application {app_id}"), 404, "{}"))
        }
    }
}

#[async_trait]
impl WebhookOps for MockTtn {
    async fn set_webhook(
        &self,
        token: &str,
        app_id: &str,
        webhook: &Webhook,
    ) -> TtnResult<Webhook> {
        self.begin("set_webhook", token)?;
        let mut s = self.state.lock().unwrap();
        if !s.apps.contains(app_id) {
            return Err(remote_err(&format!("application {app_id}"), 404, "{}"));
        }
        s.webhooks
            .insert(format!("{app_id}:{}", webhook.ids.webhook_id), webhook.clone());
        Ok(webhook.clone())
    }

    async fn delete_webhook(&self, token: &str, app_id: &str, webhook_id: &str) -> TtnResult<()> {
        self.begin("delete_webhook", token)?;
        let mut s = self.state.lock().unwrap();
        if s.webhooks.remove(&format!("{app_id}:{webhook_id}")).is_some() {
            Ok(())
        } else {
            Err(remote_err(&format!("webhook {webhook_id}"), 404, "{}"))
        }
    }
}

#[async_trait]
impl AuthInfoOps for MockTtn {
    async fn auth_info(&self, token: &str) -> TtnResult<AuthInfo> {
        self.begin("auth_info", token)?;
        if token == ADMIN_TOKEN {
            return Ok(AuthInfo {
                api_key: None,
                universal_rights: None,
                is_admin: Some(true),
            });
        }
        let s = self.state.lock().unwrap();
        let Some(minted) = s.minted.get(token) else {
            return Err(remote_err("auth_info", 401, "{}"));
        };
        let entity_ids = match &minted.scope {
            KeyScope::Org(id) => EntityIds {
                organization_ids: Some(OrganizationIds::new(id)),
                ..EntityIds::default()
            },
            KeyScope::App(id) => EntityIds {
                application_ids: Some(ApplicationIds::new(id)),
                ..EntityIds::default()
            },
            KeyScope::Gateway(_) => EntityIds::default(),
        };
        Ok(AuthInfo {
            api_key: Some(AuthInfoApiKey {
                api_key: ApiKey {
                    id: "KEYID".to_string(),
                    key: None,
                    name: None,
                    rights: minted.rights.clone(),
                },
                entity_ids: Some(entity_ids),
            }),
            universal_rights: None,
            is_admin: None,
        })
    }
}

#[async_trait]
impl EndDeviceOps for MockTtn {
    async fn is_create_device(
        &self,
        token: &str,
        _app_id: &str,
        device: &EndDevice,
    ) -> TtnResult<EndDevice> {
        self.begin("is_create_device", token)?;
        let mut s = self.state.lock().unwrap();
        if let Some(eui) = device.ids.dev_eui.as_deref() {
            if let Some(owner) = s.foreign_device_euis.get(&eui.to_uppercase()) {
                return Err(conflict_with_owner(
                    &format!("end device {eui}"),
                    "application_id",
                    owner,
                ));
            }
        }
        let id = device.ids.device_id.clone();
        if s.is_devices.contains_key(&id) {
            return Err(remote_err(&format!("end device {id}"), 409, "{}"));
        }
        s.is_devices.insert(id, device.clone());
        Ok(device.clone())
    }

    async fn is_get_device(
        &self,
        token: &str,
        _app_id: &str,
        device_id: &str,
    ) -> TtnResult<EndDevice> {
        self.begin("is_get_device", token)?;
        let s = self.state.lock().unwrap();
        s.is_devices
            .get(device_id)
            .cloned()
            .ok_or_else(|| remote_err(&format!("end device {device_id}"), 404, "{}"))
    }

    async fn is_delete_device(
        &self,
        token: &str,
        _app_id: &str,
        device_id: &str,
    ) -> TtnResult<()> {
        self.begin("is_delete_device", token)?;
        let mut s = self.state.lock().unwrap();
        if s.is_devices.remove(device_id).is_some() {
            Ok(())
        } else {
            Err(remote_err(&format!("end device {device_id}"), 404, "{}"))
        }
    }

    async fn is_list_devices(
        &self,
        token: &str,
        _app_id: &str,
        page: u32,
        limit: u32,
    ) -> TtnResult<Vec<EndDevice>> {
        self.begin("is_list_devices", token)?;
        let s = self.state.lock().unwrap();
        let skip = ((page.max(1) - 1) * limit) as usize;
        Ok(s.is_devices
            .values()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn js_set_device(
        &self,
        token: &str,
        _app_id: &str,
        device: &EndDevice,
        _field_mask: &FieldMask,
    ) -> TtnResult<EndDevice> {
        self.begin("js_set_device", token)?;
        let mut s = self.state.lock().unwrap();
        s.js_devices.insert(device.ids.device_id.clone());
        Ok(device.clone())
    }

    async fn js_get_device(
        &self,
        token: &str,
        _app_id: &str,
        device_id: &str,
    ) -> TtnResult<EndDevice> {
        self.begin("js_get_device", token)?;
        plane_get(&self.state.lock().unwrap().js_devices, device_id)
    }

    async fn js_delete_device(
        &self,
        token: &str,
        _app_id: &str,
        device_id: &str,
    ) -> TtnResult<()> {
        self.begin("js_delete_device", token)?;
        plane_delete(&mut self.state.lock().unwrap().js_devices, device_id)
    }

    async fn ns_set_device(
        &self,
        token: &str,
        _app_id: &str,
        device: &EndDevice,
        _field_mask: &FieldMask,
    ) -> TtnResult<EndDevice> {
        self.begin("ns_set_device", token)?;
        let mut s = self.state.lock().unwrap();
        s.ns_devices.insert(device.ids.device_id.clone());
        Ok(device.clone())
    }

    async fn ns_get_device(
        &self,
        token: &str,
        _app_id: &str,
        device_id: &str,
    ) -> TtnResult<EndDevice> {
        self.begin("ns_get_device", token)?;
        plane_get(&self.state.lock().unwrap().ns_devices, device_id)
    }

    async fn ns_delete_device(
        &self,
        token: &str,
        _app_id: &str,
        device_id: &str,
    ) -> TtnResult<()> {
        self.begin("ns_delete_device", token)?;
        plane_delete(&mut self.state.lock().unwrap().ns_devices, device_id)
    }

    async fn as_set_device(
        &self,
        token: &str,
        _app_id: &str,
        device: &EndDevice,
        _field_mask: &FieldMask,
    ) -> TtnResult<EndDevice> {
        self.begin("as_set_device", token)?;
        let mut s = self.state.lock().unwrap();
        s.as_devices.insert(device.ids.device_id.clone());
        Ok(device.clone())
    }

    async fn as_get_device(
        &self,
        token: &str,
        _app_id: &str,
        device_id: &str,
    ) -> TtnResult<EndDevice> {
        self.begin("as_get_device", token)?;
        plane_get(&self.state.lock().unwrap().as_devices, device_id)
    }

    async fn as_delete_device(
        &self,
        token: &str,
        _app_id: &str,
        device_id: &str,
    ) -> TtnResult<()> {
        self.begin("as_delete_device", token)?;
        plane_delete(&mut self.state.lock().unwrap().as_devices, device_id)
    }
}

fn plane_get(set: &BTreeSet<String>, device_id: &str) -> TtnResult<EndDevice> {
    if set.contains(device_id) {
        let mut device = EndDevice::default();
        device.ids.device_id = device_id.to_string();
        Ok(device)
    } else {
        Err(remote_err(&format!("end device {device_id}"), 404, "{}"))
    }
}

fn plane_delete(set: &mut BTreeSet<String>, device_id: &str) -> TtnResult<()> {
    if set.remove(device_id) {
        Ok(())
    } else {
        Err(remote_err(&format!("end device {device_id}"), 404, "{}"))
    }
}

#[async_trait]
impl GatewayOps for MockTtn {
    async fn register_gateway_for_user(
        &self,
        token: &str,
        _user_id: &str,
        gateway: &Gateway,
    ) -> TtnResult<Gateway> {
        self.begin("register_gateway_for_user", token)?;
        self.register(gateway)
    }

    async fn register_gateway_for_org(
        &self,
        token: &str,
        _org_id: &str,
        gateway: &Gateway,
    ) -> TtnResult<Gateway> {
        self.begin("register_gateway_for_org", token)?;
        {
            let s = self.state.lock().unwrap();
            if s.forbid_org_gateway_tokens.contains(token) {
                return Err(remote_err(
                    &format!("gateway {}", gateway.ids.gateway_id),
                    403,
                    "{}",
                ));
            }
        }
        self.register(gateway)
    }

    async fn get_gateway(&self, token: &str, gateway_id: &str) -> TtnResult<Gateway> {
        self.begin("get_gateway", token)?;
        let s = self.state.lock().unwrap();
        if s.gateways.contains(gateway_id) {
            let mut gateway = Gateway::default();
            gateway.ids.gateway_id = gateway_id.to_string();
            Ok(gateway)
        } else {
            Err(remote_err(&format!("gateway {gateway_id}"), 404, "{}"))
        }
    }

    async fn update_gateway(
        &self,
        token: &str,
        gateway_id: &str,
        gateway: &Gateway,
        _field_mask: &FieldMask,
    ) -> TtnResult<Gateway> {
        self.begin("update_gateway", token)?;
        let s = self.state.lock().unwrap();
        if s.gateways.contains(gateway_id) {
            Ok(gateway.clone())
        } else {
            Err(remote_err(&format!("gateway {gateway_id}"), 404, "{}"))
        }
    }

    async fn delete_gateway(&self, token: &str, gateway_id: &str) -> TtnResult<()> {
        self.begin("delete_gateway", token)?;
        let s = self.state.lock().unwrap();
        if s.gateways.contains(gateway_id) {
            Ok(())
        } else {
            Err(remote_err(&format!("gateway {gateway_id}"), 404, "{}"))
        }
    }

    async fn purge_gateway(&self, token: &str, gateway_id: &str) -> TtnResult<()> {
        self.begin("purge_gateway", token)?;
        let mut s = self.state.lock().unwrap();
        if s.gateways.remove(gateway_id) {
            s.connected_gateways.remove(gateway_id);
            Ok(())
        } else {
            Err(remote_err(&format!("gateway {gateway_id}"), 404, "{}"))
        }
    }

    async fn create_gateway_api_key(
        &self,
        token: &str,
        gateway_id: &str,
        request: &ApiKeyRequest,
    ) -> TtnResult<ApiKey> {
        self.begin("create_gateway_api_key", token)?;
        {
            let s = self.state.lock().unwrap();
            if !s.gateways.contains(gateway_id) {
                return Err(remote_err(&format!("gateway {gateway_id}"), 404, "{}"));
            }
        }
        Ok(self.mint(KeyScope::Gateway(gateway_id.to_string()), request.rights.clone()))
    }

    async fn gateway_connection_stats(
        &self,
        token: &str,
        gateway_id: &str,
    ) -> TtnResult<serde_json::Value> {
        self.begin("gateway_connection_stats", token)?;
        let s = self.state.lock().unwrap();
        if s.connected_gateways.contains(gateway_id) {
            Ok(json!({"last_status_received_at": "2026-08-27T00:00:00Z"}))
        } else {
            Err(remote_err(&format!("gateway {gateway_id}"), 404, "{}"))
        }
    }
}

impl MockTtn {
    fn register(&self, gateway: &Gateway) -> TtnResult<Gateway> {
        let mut s = self.state.lock().unwrap();
        if let Some(eui) = gateway.ids.eui.as_deref() {
            if s.foreign_gateway_euis.contains(&eui.to_uppercase()) {
                return Err(conflict_with_owner(
                    &format!("gateway {eui}"),
                    "gateway_id",
                    "someone-elses-gw",
                ));
            }
        }
        let id = gateway.ids.gateway_id.clone();
        if s.gateways.contains(&id) {
            return Err(remote_err(&format!("gateway {id}"), 409, "{}"));
        }
        s.gateways.insert(id);
        Ok(gateway.clone())
    }
}

// ── In-memory stores ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStore {
    pub connections: Mutex<BTreeMap<Uuid, TenantConnection>>,
    pub devices: Mutex<BTreeMap<(Uuid, String), Device>>,
    pub gateways: Mutex<BTreeMap<(Uuid, String), GatewayRow>>,
    pub log: Mutex<Vec<ProvisioningLogEntry>>,
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn log_entries(&self, step: &str) -> Vec<ProvisioningLogEntry> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.step == step)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ConnectionStore for MemStore {
    async fn find_by_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantConnection>, DbError> {
        Ok(self.connections.lock().unwrap().get(&tenant_id).cloned())
    }

    async fn create(&self, new: NewTenantConnection) -> Result<TenantConnection, DbError> {
        let now = Utc::now();
        let conn = TenantConnection {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            status: ConnectionStatus::Idle,
            region: new.region,
            current_step: None,
            ttn_org_id: None,
            ttn_app_id: None,
            webhook_id: None,
            org_key: None,
            app_key: None,
            gateway_key: None,
            webhook_secret: None,
            step_ledger: Json(StepLedger::default()),
            rights_status: RightsCheckStatus::Unknown,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.connections
            .lock()
            .unwrap()
            .insert(new.tenant_id, conn.clone());
        Ok(conn)
    }

    async fn save(&self, connection: &TenantConnection) -> Result<(), DbError> {
        let mut saved = connection.clone();
        saved.updated_at = Utc::now();
        self.connections
            .lock()
            .unwrap()
            .insert(connection.tenant_id, saved);
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid) -> Result<(), DbError> {
        self.connections.lock().unwrap().remove(&tenant_id);
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for MemStore {
    async fn find_by_eui(
        &self,
        tenant_id: Uuid,
        dev_eui: &str,
    ) -> Result<Option<Device>, DbError> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .get(&(tenant_id, dev_eui.to_string()))
            .cloned())
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<Device>, DbError> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn create(&self, new: NewDevice) -> Result<Device, DbError> {
        let now = Utc::now();
        let device = Device {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            dev_eui: new.dev_eui.clone(),
            join_eui: new.join_eui,
            ttn_device_id: None,
            name: new.name,
            app_key: None,
            provisioning_state: DeviceProvisioningState::NotProvisioned,
            status: DeviceStatus::Pending,
            last_seen_at: None,
            created_at: now,
            updated_at: now,
        };
        self.devices
            .lock()
            .unwrap()
            .insert((new.tenant_id, new.dev_eui), device.clone());
        Ok(device)
    }

    async fn save(&self, device: &Device) -> Result<(), DbError> {
        self.devices
            .lock()
            .unwrap()
            .insert((device.tenant_id, device.dev_eui.clone()), device.clone());
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
        self.devices
            .lock()
            .unwrap()
            .retain(|_, d| !(d.tenant_id == tenant_id && d.id == id));
        Ok(())
    }
}

#[async_trait]
impl GatewayStore for MemStore {
    async fn find_by_eui(
        &self,
        tenant_id: Uuid,
        gateway_eui: &str,
    ) -> Result<Option<GatewayRow>, DbError> {
        Ok(self
            .gateways
            .lock()
            .unwrap()
            .get(&(tenant_id, gateway_eui.to_string()))
            .cloned())
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<GatewayRow>, DbError> {
        Ok(self
            .gateways
            .lock()
            .unwrap()
            .values()
            .filter(|g| g.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn create(&self, new: NewGateway) -> Result<GatewayRow, DbError> {
        let now = Utc::now();
        let gateway = GatewayRow {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            gateway_eui: new.gateway_eui.clone(),
            ttn_gateway_id: None,
            name: new.name,
            owner: None,
            frequency_plan_id: new.frequency_plan_id,
            lns_key: None,
            status: GatewayStatus::Pending,
            latitude: new.latitude,
            longitude: new.longitude,
            altitude: new.altitude,
            last_seen_at: None,
            created_at: now,
            updated_at: now,
        };
        self.gateways
            .lock()
            .unwrap()
            .insert((new.tenant_id, new.gateway_eui), gateway.clone());
        Ok(gateway)
    }

    async fn save(&self, gateway: &GatewayRow) -> Result<(), DbError> {
        self.gateways
            .lock()
            .unwrap()
            .insert((gateway.tenant_id, gateway.gateway_eui.clone()), gateway.clone());
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
        self.gateways
            .lock()
            .unwrap()
            .retain(|_, g| !(g.tenant_id == tenant_id && g.id == id));
        Ok(())
    }
}

#[async_trait]
impl ProvisioningLogStore for MemStore {
    async fn append(&self, entry: NewLogEntry) -> Result<ProvisioningLogEntry, DbError> {
        let stored = ProvisioningLogEntry {
            id: Uuid::new_v4(),
            tenant_id: entry.tenant_id,
            connection_id: entry.connection_id,
            step: entry.step,
            outcome: entry.outcome,
            attempt: entry.attempt,
            detail: entry.detail.map(Json),
            created_at: Utc::now(),
        };
        self.log.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn recent(
        &self,
        connection_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ProvisioningLogEntry>, DbError> {
        let log = self.log.lock().unwrap();
        Ok(log
            .iter()
            .rev()
            .filter(|entry| entry.connection_id == connection_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
