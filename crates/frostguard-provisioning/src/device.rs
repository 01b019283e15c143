//! End-device provisioning across the four remote planes.
//!
//! A device exists four times on TTN: once in the global identity
//! registry and once each on the regional join, network and application
//! servers. The planes are independently replicated, so any operation
//! can succeed partially; everything here is written to be safely
//! re-runnable, and `diagnose` names the split-brain shapes that arise
//! when a previous run (or a human in the console) left the planes
//! disagreeing.
//!
//! All remote calls use the tenant's application-scoped key, never the
//! account credential.

use std::sync::Arc;

use rand::RngCore;
use sqlx::types::Json;
use tracing::{info, warn};
use uuid::Uuid;

use frostguard_core::{DevEui, JoinEui, TenantId};
use frostguard_db::models::{
    AttemptOutcome, ConnectionStatus, CredentialSlot, DeviceProvisioningState, DeviceStatus,
    NewDevice, StepName,
};
use frostguard_db::{ConnectionStore, DeviceStore};
use frostguard_secrets::{SealedSecret, SecretVault};
use frostguard_ttn::types::{
    ApplicationIds, EndDevice, EndDeviceIds, FieldMask, KeyEnvelope, RootKeys,
};
use frostguard_ttn::{Region, TtnApi, TtnError};

use crate::error::{ProvisionError, ProvisionResult, RightsTarget};
use crate::naming;
use crate::outcome::{AdoptOutcome, DeviceClassification, DeviceReport, DiagnoseReport, PlaneReport};
use crate::settings::ProvisioningSettings;

const PLANE_IDENTITY: &str = "identity";
const PLANE_JOIN: &str = "join";
const PLANE_NETWORK: &str = "network";
const PLANE_APPLICATION: &str = "application";

const LORAWAN_VERSION: &str = "1.0.3";
const LORAWAN_PHY_VERSION: &str = "1.0.3-a";

const STEP: StepName = StepName::ProvisionDevice;

/// Resolved per-call context: a ready connection and the opened
/// application key.
struct AppContext {
    app_id: String,
    token: String,
    region: Region,
}

/// Provisions sensors onto the tenant's TTN application.
pub struct DeviceProvisioner {
    ttn: Arc<dyn TtnApi>,
    connections: Arc<dyn ConnectionStore>,
    devices: Arc<dyn DeviceStore>,
    vault: SecretVault,
    settings: ProvisioningSettings,
}

impl DeviceProvisioner {
    pub fn new(
        ttn: Arc<dyn TtnApi>,
        connections: Arc<dyn ConnectionStore>,
        devices: Arc<dyn DeviceStore>,
        vault: SecretVault,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            ttn,
            connections,
            devices,
            vault,
            settings,
        }
    }

    /// Register a device on all four planes.
    ///
    /// Safe to re-run: planes already holding the device are updated in
    /// place, and the root key is generated once and persisted sealed
    /// before it is ever pushed to the join server.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        dev_eui: &DevEui,
        join_eui: &JoinEui,
        name: Option<&str>,
    ) -> ProvisionResult<DeviceReport> {
        let ctx = self.app_context(tenant_id).await?;

        // Connectivity probe against the owning application before any
        // registry write: a revoked key or a vanished application
        // surfaces here, classified, instead of mid-sequence.
        self.ttn
            .get_application(&ctx.token, &ctx.app_id)
            .await
            .map_err(|e| self.classify(&ctx, e))?;

        let mut planes = Vec::new();

        let mut row = match self.devices.find_by_eui(tenant_id, dev_eui.as_str()).await? {
            Some(row) => row,
            None => {
                self.devices
                    .create(NewDevice {
                        tenant_id,
                        dev_eui: dev_eui.as_str().to_string(),
                        join_eui: join_eui.as_str().to_string(),
                        name: name.map(str::to_string),
                    })
                    .await?
            }
        };

        let device_id = row
            .ttn_device_id
            .clone()
            .unwrap_or_else(|| naming::device_id(&dev_eui.to_lowercase()));

        // Identity registry first; it is the registry of record and the
        // only plane that can reject the EUI as already claimed.
        let exists = match self.ttn.is_get_device(&ctx.token, &ctx.app_id, &device_id).await {
            Ok(_) => true,
            Err(TtnError::NotFound { .. }) => false,
            Err(err) => return Err(self.classify(&ctx, err)),
        };
        if exists {
            planes.push(PlaneReport::new(PLANE_IDENTITY, AttemptOutcome::Skipped));
        } else {
            let identity = self.identity_payload(&ctx, &device_id, dev_eui, join_eui, name);
            match self.ttn.is_create_device(&ctx.token, &ctx.app_id, &identity).await {
                Ok(_) => planes.push(PlaneReport::new(PLANE_IDENTITY, AttemptOutcome::Success)),
                Err(err @ TtnError::Conflict { .. }) => {
                    // The EUI is claimed under an application we cannot
                    // read. Record the conflict and stop before any
                    // dependent-plane write.
                    warn!(
                        tenant_id = %tenant_id,
                        dev_eui = %dev_eui,
                        "device EUI claimed by another application"
                    );
                    row.provisioning_state = DeviceProvisioningState::Conflict;
                    row.status = DeviceStatus::Fault;
                    self.devices.save(&row).await?;
                    return Err(ProvisionError::from_ttn(
                        STEP,
                        &RightsTarget::Application(ctx.app_id),
                        err,
                    ));
                }
                Err(err) => return Err(self.classify(&ctx, err)),
            }
        }

        // Root key: generate once, seal and persist before the join
        // server ever sees it. A crash after this point re-pushes the
        // same key instead of minting a second one.
        let app_key = match row.app_key.as_deref() {
            Some(slot) => self.open_slot(tenant_id, slot)?,
            None => {
                let generated = random_app_key();
                row.app_key = Some(Json(self.seal_slot(tenant_id, &generated)?));
                self.devices.save(&row).await?;
                generated
            }
        };

        let js_device = self.join_payload(&ctx, &device_id, dev_eui, join_eui, &app_key);
        let js_mask = FieldMask::of(&[
            "ids.device_id",
            "ids.dev_eui",
            "ids.join_eui",
            "network_server_address",
            "application_server_address",
            "root_keys.app_key.key",
        ]);
        self.ttn
            .js_set_device(&ctx.token, &ctx.app_id, &js_device, &js_mask)
            .await
            .map_err(|e| self.classify(&ctx, e))?;
        planes.push(PlaneReport::new(PLANE_JOIN, AttemptOutcome::Success));

        let ns_device = self.network_payload(&device_id, dev_eui, join_eui);
        let ns_mask = FieldMask::of(&[
            "ids.device_id",
            "ids.dev_eui",
            "ids.join_eui",
            "lorawan_version",
            "lorawan_phy_version",
            "frequency_plan_id",
            "supports_join",
        ]);
        self.ttn
            .ns_set_device(&ctx.token, &ctx.app_id, &ns_device, &ns_mask)
            .await
            .map_err(|e| self.classify(&ctx, e))?;
        planes.push(PlaneReport::new(PLANE_NETWORK, AttemptOutcome::Success));

        let as_device = self.bare_payload(&device_id, dev_eui, join_eui);
        let as_mask = FieldMask::of(&["ids.device_id", "ids.dev_eui", "ids.join_eui"]);
        self.ttn
            .as_set_device(&ctx.token, &ctx.app_id, &as_device, &as_mask)
            .await
            .map_err(|e| self.classify(&ctx, e))?;
        planes.push(PlaneReport::new(PLANE_APPLICATION, AttemptOutcome::Success));

        // Read-back confirms the registry of record still agrees before
        // the local row claims full provisioning.
        self.ttn
            .is_get_device(&ctx.token, &ctx.app_id, &device_id)
            .await
            .map_err(|e| self.classify(&ctx, e))?;

        row.ttn_device_id = Some(device_id);
        row.provisioning_state = DeviceProvisioningState::Provisioned;
        if row.status == DeviceStatus::Fault {
            row.status = DeviceStatus::Pending;
        }
        self.devices.save(&row).await?;
        info!(tenant_id = %tenant_id, dev_eui = %dev_eui, "device provisioned on all planes");

        Ok(DeviceReport {
            dev_eui: dev_eui.as_str().to_string(),
            ttn_device_id: row.ttn_device_id.clone(),
            provisioning_state: row.provisioning_state,
            planes,
        })
    }

    /// Remove the device from all four planes, dependents first so the
    /// identity record is the last thing standing.
    pub async fn delete(&self, tenant_id: Uuid, dev_eui: &DevEui) -> ProvisionResult<DeviceReport> {
        let ctx = self.app_context(tenant_id).await?;
        let mut row = self
            .devices
            .find_by_eui(tenant_id, dev_eui.as_str())
            .await?
            .ok_or_else(|| ProvisionError::InvalidState {
                message: format!("device {dev_eui} is not registered"),
                use_start_fresh: false,
            })?;
        let device_id = row
            .ttn_device_id
            .clone()
            .unwrap_or_else(|| naming::device_id(&dev_eui.to_lowercase()));

        let mut planes = Vec::new();
        for (plane, result) in [
            (
                PLANE_APPLICATION,
                self.ttn.as_delete_device(&ctx.token, &ctx.app_id, &device_id).await,
            ),
            (
                PLANE_NETWORK,
                self.ttn.ns_delete_device(&ctx.token, &ctx.app_id, &device_id).await,
            ),
            (
                PLANE_JOIN,
                self.ttn.js_delete_device(&ctx.token, &ctx.app_id, &device_id).await,
            ),
            (
                PLANE_IDENTITY,
                self.ttn.is_delete_device(&ctx.token, &ctx.app_id, &device_id).await,
            ),
        ] {
            match result {
                Ok(()) => planes.push(PlaneReport::new(plane, AttemptOutcome::Success)),
                Err(TtnError::NotFound { .. }) => {
                    planes.push(PlaneReport::new(plane, AttemptOutcome::Skipped));
                }
                Err(err) => return Err(self.classify(&ctx, err)),
            }
        }

        row.ttn_device_id = None;
        row.app_key = None;
        row.provisioning_state = DeviceProvisioningState::NotProvisioned;
        row.status = DeviceStatus::Pending;
        self.devices.save(&row).await?;
        info!(tenant_id = %tenant_id, dev_eui = %dev_eui, "device removed from all planes");

        Ok(DeviceReport {
            dev_eui: dev_eui.as_str().to_string(),
            ttn_device_id: None,
            provisioning_state: row.provisioning_state,
            planes,
        })
    }

    /// Probe all four planes and classify the device's remote shape.
    /// Read-only: never mutates local state or remote registrations.
    pub async fn diagnose(
        &self,
        tenant_id: Uuid,
        dev_eui: &DevEui,
    ) -> ProvisionResult<DiagnoseReport> {
        let ctx = self.app_context(tenant_id).await?;
        let device_id = match self.devices.find_by_eui(tenant_id, dev_eui.as_str()).await? {
            Some(row) => row
                .ttn_device_id
                .unwrap_or_else(|| naming::device_id(&dev_eui.to_lowercase())),
            None => naming::device_id(&dev_eui.to_lowercase()),
        };

        let identity = self
            .probe(self.ttn.is_get_device(&ctx.token, &ctx.app_id, &device_id).await, &ctx)?;
        let join = self
            .probe(self.ttn.js_get_device(&ctx.token, &ctx.app_id, &device_id).await, &ctx)?;
        let network = self
            .probe(self.ttn.ns_get_device(&ctx.token, &ctx.app_id, &device_id).await, &ctx)?;
        let application = self
            .probe(self.ttn.as_get_device(&ctx.token, &ctx.app_id, &device_id).await, &ctx)?;

        let classification =
            DeviceClassification::from_presence(identity, join, network, application);
        Ok(DiagnoseReport {
            dev_eui: dev_eui.as_str().to_string(),
            classification,
            present_identity: identity,
            present_join: join,
            present_network: network,
            present_application: application,
            hint: classification.hint(),
        })
    }

    /// Bring a device that already exists on TTN under local management.
    ///
    /// Tries the conventional id first, then a bounded scan of the
    /// identity registry by EUI, then an orphan probe of the dependent
    /// planes.
    pub async fn adopt(&self, tenant_id: Uuid, dev_eui: &DevEui) -> ProvisionResult<AdoptOutcome> {
        let ctx = self.app_context(tenant_id).await?;
        let conventional = naming::device_id(&dev_eui.to_lowercase());

        match self.ttn.is_get_device(&ctx.token, &ctx.app_id, &conventional).await {
            Ok(_) => {
                self.record_adoption(tenant_id, dev_eui, &conventional).await?;
                return Ok(AdoptOutcome::AdoptedExactId {
                    ttn_device_id: conventional,
                });
            }
            Err(TtnError::NotFound { .. }) => {}
            Err(err) => return Err(self.classify(&ctx, err)),
        }

        for page in 1..=self.settings.adopt_max_pages {
            let devices = self
                .ttn
                .is_list_devices(&ctx.token, &ctx.app_id, page, self.settings.adopt_page_limit)
                .await
                .map_err(|e| self.classify(&ctx, e))?;
            let count = devices.len();
            for device in devices {
                let matches = device
                    .ids
                    .dev_eui
                    .as_deref()
                    .is_some_and(|eui| eui.eq_ignore_ascii_case(dev_eui.as_str()));
                if matches {
                    let ttn_device_id = device.ids.device_id;
                    self.record_adoption(tenant_id, dev_eui, &ttn_device_id).await?;
                    return Ok(AdoptOutcome::AdoptedByScan { ttn_device_id, page });
                }
            }
            if (count as u32) < self.settings.adopt_page_limit {
                break;
            }
        }

        // Not in the identity registry. Dependent-plane remnants mean
        // eventual consistency or a stalled deletion, not absence.
        let mut orphan_planes = Vec::new();
        for (plane, result) in [
            (
                PLANE_JOIN,
                self.ttn.js_get_device(&ctx.token, &ctx.app_id, &conventional).await,
            ),
            (
                PLANE_NETWORK,
                self.ttn.ns_get_device(&ctx.token, &ctx.app_id, &conventional).await,
            ),
            (
                PLANE_APPLICATION,
                self.ttn.as_get_device(&ctx.token, &ctx.app_id, &conventional).await,
            ),
        ] {
            if self.probe(result, &ctx)? {
                orphan_planes.push(plane.to_string());
            }
        }
        if !orphan_planes.is_empty() {
            warn!(
                tenant_id = %tenant_id,
                dev_eui = %dev_eui,
                planes = ?orphan_planes,
                "device absent from identity registry but present on dependent planes"
            );
            return Ok(AdoptOutcome::OrphanWarning {
                planes: orphan_planes,
            });
        }
        Ok(AdoptOutcome::NotFound)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn app_context(&self, tenant_id: Uuid) -> ProvisionResult<AppContext> {
        let conn = self
            .connections
            .find_by_tenant(tenant_id)
            .await?
            .ok_or_else(|| ProvisionError::InvalidState {
                message: format!("no connection exists for tenant {tenant_id}"),
                use_start_fresh: false,
            })?;
        if conn.status != ConnectionStatus::Ready {
            return Err(ProvisionError::InvalidState {
                message: "tenant connection is not ready; provision it first".to_string(),
                use_start_fresh: false,
            });
        }
        let app_id = conn.ttn_app_id.clone().ok_or_else(missing_artifact)?;
        let slot = conn.app_key.as_deref().ok_or_else(missing_artifact)?;
        let token = self.open_slot(tenant_id, slot)?;
        let region = conn.region.parse::<Region>().map_err(|e| {
            ProvisionError::InvalidState {
                message: e,
                use_start_fresh: false,
            }
        })?;
        Ok(AppContext {
            app_id,
            token,
            region,
        })
    }

    fn classify(&self, ctx: &AppContext, err: TtnError) -> ProvisionError {
        ProvisionError::from_ttn(STEP, &RightsTarget::Application(ctx.app_id.clone()), err)
    }

    /// Presence probe: Ok is present, 404 is absent, anything else is a
    /// real failure.
    fn probe<T>(&self, result: Result<T, TtnError>, ctx: &AppContext) -> ProvisionResult<bool> {
        match result {
            Ok(_) => Ok(true),
            Err(TtnError::NotFound { .. }) => Ok(false),
            Err(err) => Err(self.classify(ctx, err)),
        }
    }

    async fn record_adoption(
        &self,
        tenant_id: Uuid,
        dev_eui: &DevEui,
        ttn_device_id: &str,
    ) -> ProvisionResult<()> {
        let mut row = match self.devices.find_by_eui(tenant_id, dev_eui.as_str()).await? {
            Some(row) => row,
            None => {
                self.devices
                    .create(NewDevice {
                        tenant_id,
                        dev_eui: dev_eui.as_str().to_string(),
                        join_eui: dev_eui.as_str().to_string(),
                        name: None,
                    })
                    .await?
            }
        };
        row.ttn_device_id = Some(ttn_device_id.to_string());
        row.provisioning_state = DeviceProvisioningState::ExistsInTtn;
        self.devices.save(&row).await?;
        info!(tenant_id = %tenant_id, dev_eui = %dev_eui, ttn_device_id, "device adopted");
        Ok(())
    }

    fn open_slot(&self, tenant_id: Uuid, slot: &CredentialSlot) -> ProvisionResult<String> {
        let sealed = SealedSecret {
            ciphertext: slot.ciphertext.clone(),
            fingerprint: slot.fingerprint.clone(),
        };
        Ok(self.vault.open(TenantId::from_uuid(tenant_id), &sealed)?)
    }

    fn seal_slot(&self, tenant_id: Uuid, plaintext: &str) -> ProvisionResult<CredentialSlot> {
        let sealed = self.vault.seal(TenantId::from_uuid(tenant_id), plaintext)?;
        Ok(CredentialSlot {
            key_id: None,
            ciphertext: sealed.ciphertext,
            fingerprint: sealed.fingerprint,
        })
    }

    fn ids(&self, device_id: &str, dev_eui: &DevEui, join_eui: &JoinEui, app_id: &str) -> EndDeviceIds {
        EndDeviceIds {
            device_id: device_id.to_string(),
            application_ids: Some(ApplicationIds::new(app_id)),
            dev_eui: Some(dev_eui.as_str().to_string()),
            join_eui: Some(join_eui.as_str().to_string()),
        }
    }

    /// Identity record: carries the cross-plane server addresses so the
    /// regional cluster knows it owns this device.
    fn identity_payload(
        &self,
        ctx: &AppContext,
        device_id: &str,
        dev_eui: &DevEui,
        join_eui: &JoinEui,
        name: Option<&str>,
    ) -> EndDevice {
        let cluster = ctx.region.gateway_server_address().to_string();
        EndDevice {
            ids: self.ids(device_id, dev_eui, join_eui, &ctx.app_id),
            name: name.map(str::to_string),
            join_server_address: Some(cluster.clone()),
            network_server_address: Some(cluster.clone()),
            application_server_address: Some(cluster),
            ..EndDevice::default()
        }
    }

    fn join_payload(
        &self,
        ctx: &AppContext,
        device_id: &str,
        dev_eui: &DevEui,
        join_eui: &JoinEui,
        app_key: &str,
    ) -> EndDevice {
        let cluster = ctx.region.gateway_server_address().to_string();
        EndDevice {
            ids: self.ids(device_id, dev_eui, join_eui, &ctx.app_id),
            network_server_address: Some(cluster.clone()),
            application_server_address: Some(cluster),
            root_keys: Some(RootKeys {
                app_key: Some(KeyEnvelope {
                    key: app_key.to_string(),
                }),
            }),
            ..EndDevice::default()
        }
    }

    fn network_payload(&self, device_id: &str, dev_eui: &DevEui, join_eui: &JoinEui) -> EndDevice {
        EndDevice {
            ids: EndDeviceIds {
                device_id: device_id.to_string(),
                application_ids: None,
                dev_eui: Some(dev_eui.as_str().to_string()),
                join_eui: Some(join_eui.as_str().to_string()),
            },
            lorawan_version: Some(LORAWAN_VERSION.to_string()),
            lorawan_phy_version: Some(LORAWAN_PHY_VERSION.to_string()),
            frequency_plan_id: Some(self.settings.frequency_plan_id.clone()),
            supports_join: Some(true),
            ..EndDevice::default()
        }
    }

    fn bare_payload(&self, device_id: &str, dev_eui: &DevEui, join_eui: &JoinEui) -> EndDevice {
        EndDevice {
            ids: EndDeviceIds {
                device_id: device_id.to_string(),
                application_ids: None,
                dev_eui: Some(dev_eui.as_str().to_string()),
                join_eui: Some(join_eui.as_str().to_string()),
            },
            ..EndDevice::default()
        }
    }
}

fn missing_artifact() -> ProvisionError {
    ProvisionError::InvalidState {
        message: "connection is missing its application credentials; re-run provisioning"
            .to_string(),
        use_start_fresh: false,
    }
}

/// 16 random bytes, uppercase hex: a LoRaWAN 1.0.x root AppKey.
fn random_app_key() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}
