//! Gateway registration on the identity server.
//!
//! TTN accepts gateway writes under different parents depending on the
//! credential presented, so registration walks a strategy ladder:
//!
//! 1. the gateway-capable organization key minted during connection
//!    provisioning, registering under the tenant's organization;
//! 2. the account-level credential, registering under the admin user;
//! 3. the tenant's application key, as a last resort.
//!
//! A 403 advances the ladder; a 409 is terminal, because the EUI is a
//! hardware identifier and a second claim is always a real conflict.
//! Application-scoped keys can never create gateways regardless of the
//! rights bits they carry, so strategy 3 is gated on a rights check and
//! usually skipped.

use std::sync::Arc;

use chrono::Utc;
use sqlx::types::Json;
use tracing::{info, warn};
use uuid::Uuid;

use frostguard_core::{GatewayEui, TenantId};
use frostguard_db::models::{
    ConnectionStatus, CredentialSlot, Gateway as GatewayRow, GatewayOwner, GatewayStatus,
    NewGateway, StepName, TenantConnection,
};
use frostguard_db::{ConnectionStore, GatewayStore};
use frostguard_secrets::{SealedSecret, SecretVault};
use frostguard_ttn::types::{
    rights, Antenna, AntennaLocation, ApiKeyRequest, FieldMask, Gateway, GatewayIds,
};
use frostguard_ttn::{Capabilities, Region, TtnApi, TtnError};

use crate::error::{ProvisionError, ProvisionResult, RightsTarget};
use crate::naming;
use crate::outcome::{CredentialSummary, GatewayReport};
use crate::settings::ProvisioningSettings;

const STEP: StepName = StepName::RegisterGateway;

/// Rights minted onto the per-gateway LNS key.
const LNS_KEY_RIGHTS: &[&str] = &[
    rights::RIGHT_GATEWAY_LINK,
    rights::RIGHT_GATEWAY_INFO,
    rights::RIGHT_GATEWAY_SETTINGS_BASIC,
    rights::RIGHT_GATEWAY_READ_SECRETS,
];

/// One rung of the credential ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    OrganizationKey,
    AdminUser,
    ApplicationKey,
}

impl Strategy {
    fn label(self) -> &'static str {
        match self {
            Strategy::OrganizationKey => "organization_key",
            Strategy::AdminUser => "admin_user",
            Strategy::ApplicationKey => "application_key",
        }
    }

    fn owner(self) -> GatewayOwner {
        match self {
            Strategy::OrganizationKey | Strategy::ApplicationKey => GatewayOwner::Organization,
            Strategy::AdminUser => GatewayOwner::User,
        }
    }
}

/// Registers gateways and keeps their LNS credentials.
pub struct GatewayProvisioner {
    ttn: Arc<dyn TtnApi>,
    connections: Arc<dyn ConnectionStore>,
    gateways: Arc<dyn GatewayStore>,
    vault: SecretVault,
    settings: ProvisioningSettings,
}

impl GatewayProvisioner {
    pub fn new(
        ttn: Arc<dyn TtnApi>,
        connections: Arc<dyn ConnectionStore>,
        gateways: Arc<dyn GatewayStore>,
        vault: SecretVault,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            ttn,
            connections,
            gateways,
            vault,
            settings,
        }
    }

    /// Register a gateway, walking the credential ladder, and mint its
    /// LNS key with the credential that won.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        gateway_eui: &GatewayEui,
        name: Option<&str>,
        location: Option<(f64, f64, Option<f64>)>,
    ) -> ProvisionResult<GatewayReport> {
        let conn = self.ready_connection(tenant_id).await?;
        let org_id = conn.ttn_org_id.clone().ok_or_else(|| ProvisionError::InvalidState {
            message: "connection has no organization; re-run provisioning".to_string(),
            use_start_fresh: false,
        })?;
        let region = self.region_of(&conn)?;

        let mut row = match self.gateways.find_by_eui(tenant_id, gateway_eui.as_str()).await? {
            Some(row) => row,
            None => {
                self.gateways
                    .create(NewGateway {
                        tenant_id,
                        gateway_eui: gateway_eui.as_str().to_string(),
                        name: name.map(str::to_string),
                        frequency_plan_id: self.settings.frequency_plan_id.clone(),
                        latitude: location.map(|(lat, _, _)| lat),
                        longitude: location.map(|(_, lon, _)| lon),
                        altitude: location.and_then(|(_, _, alt)| alt),
                    })
                    .await?
            }
        };
        let gateway_id = row
            .ttn_gateway_id
            .clone()
            .unwrap_or_else(|| naming::gateway_id(gateway_eui.as_str()));
        let payload = self.gateway_payload(&gateway_id, gateway_eui, name, region, &row);

        // A re-run against our own registration is not a conflict:
        // refresh it in place instead of walking the ladder into a 409.
        match self
            .ttn
            .get_gateway(&self.settings.admin_api_key, &gateway_id)
            .await
        {
            Ok(_) => {
                return self
                    .refresh_registration(tenant_id, gateway_eui, &gateway_id, &org_id, row, &payload)
                    .await;
            }
            Err(TtnError::NotFound { .. }) => {}
            Err(err) => {
                return Err(ProvisionError::from_ttn(
                    STEP,
                    &RightsTarget::Organization(org_id),
                    err,
                ));
            }
        }

        let mut winner: Option<(Strategy, String)> = None;
        for strategy in [
            Strategy::OrganizationKey,
            Strategy::AdminUser,
            Strategy::ApplicationKey,
        ] {
            let Some(token) = self.token_for(&conn, strategy)? else {
                continue;
            };
            if strategy != Strategy::AdminUser && !self.can_create_gateways(&token, &org_id).await? {
                warn!(
                    tenant_id = %tenant_id,
                    strategy = strategy.label(),
                    "credential cannot register gateways, trying next strategy"
                );
                continue;
            }

            let attempt = match strategy {
                Strategy::AdminUser => {
                    self.ttn
                        .register_gateway_for_user(&token, &self.settings.ttn_user_id, &payload)
                        .await
                }
                _ => self.ttn.register_gateway_for_org(&token, &org_id, &payload).await,
            };
            match attempt {
                Ok(_) => {
                    winner = Some((strategy, token));
                    break;
                }
                Err(TtnError::Forbidden { .. }) => {
                    warn!(
                        tenant_id = %tenant_id,
                        strategy = strategy.label(),
                        "gateway registration forbidden, trying next strategy"
                    );
                }
                Err(err @ TtnError::Conflict { .. }) => {
                    // The EUI is already claimed somewhere. Unlike id
                    // collisions there is nothing to rotate: this is
                    // someone's hardware.
                    return Err(ProvisionError::from_ttn(
                        STEP,
                        &RightsTarget::Organization(org_id),
                        err,
                    ));
                }
                Err(err) => {
                    return Err(ProvisionError::from_ttn(
                        STEP,
                        &RightsTarget::Organization(org_id),
                        err,
                    ));
                }
            }
        }

        let Some((strategy, token)) = winner else {
            return Err(ProvisionError::NoOrganizationRights {
                step: STEP,
                org_id,
                detail: None,
            });
        };
        info!(
            tenant_id = %tenant_id,
            gateway_id = %gateway_id,
            strategy = strategy.label(),
            "gateway registered"
        );

        let request = ApiKeyRequest::new(naming::LNS_KEY_NAME, LNS_KEY_RIGHTS);
        let key = self
            .ttn
            .create_gateway_api_key(&token, &gateway_id, &request)
            .await
            .map_err(|e| {
                ProvisionError::from_ttn(STEP, &RightsTarget::Organization(org_id.clone()), e)
            })?;
        let secret = key.key.ok_or(ProvisionError::Internal {
            step: STEP,
            message: "key material missing from creation response".to_string(),
        })?;

        row.ttn_gateway_id = Some(gateway_id.clone());
        row.owner = Some(strategy.owner());
        row.lns_key = Some(Json(self.seal_slot(tenant_id, Some(key.id), &secret)?));
        row.status = GatewayStatus::Pending;
        self.gateways.save(&row).await?;

        Ok(GatewayReport {
            gateway_eui: gateway_eui.as_str().to_string(),
            ttn_gateway_id: gateway_id,
            owner: strategy.owner(),
            strategy: strategy.label(),
            status: row.status,
            lns_key: CredentialSummary::from_slot(row.lns_key.as_deref()),
        })
    }

    /// Re-run path for an already-registered gateway: push the current
    /// name and antenna state with a field mask, and mint the LNS key
    /// only if the slot is empty.
    async fn refresh_registration(
        &self,
        tenant_id: Uuid,
        gateway_eui: &GatewayEui,
        gateway_id: &str,
        org_id: &str,
        mut row: GatewayRow,
        payload: &Gateway,
    ) -> ProvisionResult<GatewayReport> {
        let admin = &self.settings.admin_api_key;
        let mask = FieldMask::of(&["name", "antennas", "gateway_server_address"]);
        self.ttn
            .update_gateway(admin, gateway_id, payload, &mask)
            .await
            .map_err(|e| {
                ProvisionError::from_ttn(STEP, &RightsTarget::Organization(org_id.to_string()), e)
            })?;

        if row.lns_key.is_none() {
            let request = ApiKeyRequest::new(naming::LNS_KEY_NAME, LNS_KEY_RIGHTS);
            let key = self
                .ttn
                .create_gateway_api_key(admin, gateway_id, &request)
                .await
                .map_err(|e| {
                    ProvisionError::from_ttn(
                        STEP,
                        &RightsTarget::Organization(org_id.to_string()),
                        e,
                    )
                })?;
            let secret = key.key.ok_or(ProvisionError::Internal {
                step: STEP,
                message: "key material missing from creation response".to_string(),
            })?;
            row.lns_key = Some(Json(self.seal_slot(tenant_id, Some(key.id), &secret)?));
        }

        let owner = row.owner.unwrap_or(GatewayOwner::Organization);
        row.ttn_gateway_id = Some(gateway_id.to_string());
        row.owner = Some(owner);
        self.gateways.save(&row).await?;
        info!(
            tenant_id = %tenant_id,
            gateway_id = %gateway_id,
            "gateway registration refreshed"
        );

        Ok(GatewayReport {
            gateway_eui: gateway_eui.as_str().to_string(),
            ttn_gateway_id: gateway_id.to_string(),
            owner,
            strategy: match owner {
                GatewayOwner::Organization => Strategy::OrganizationKey.label(),
                GatewayOwner::User => Strategy::AdminUser.label(),
            },
            status: row.status,
            lns_key: CredentialSummary::from_slot(row.lns_key.as_deref()),
        })
    }

    /// Delete and purge the remote record, then verify the EUI is
    /// actually released before forgetting it locally.
    pub async fn delete(&self, tenant_id: Uuid, gateway_eui: &GatewayEui) -> ProvisionResult<()> {
        let conn = self.ready_connection(tenant_id).await?;
        let mut row = self.required_row(tenant_id, gateway_eui).await?;
        let admin = &self.settings.admin_api_key;

        if let Some(gateway_id) = row.ttn_gateway_id.clone() {
            for result in [
                self.ttn.delete_gateway(admin, &gateway_id).await,
                self.ttn.purge_gateway(admin, &gateway_id).await,
            ] {
                match result {
                    Ok(()) | Err(TtnError::NotFound { .. }) => {}
                    Err(err) => {
                        let org = conn.ttn_org_id.clone().unwrap_or_default();
                        return Err(ProvisionError::from_ttn(
                            STEP,
                            &RightsTarget::Organization(org),
                            err,
                        ));
                    }
                }
            }
            match self.ttn.get_gateway(admin, &gateway_id).await {
                Err(TtnError::NotFound { .. }) => {}
                Ok(_) => {
                    return Err(ProvisionError::Internal {
                        step: STEP,
                        message: format!("gateway {gateway_id} still present after purge"),
                    });
                }
                Err(err) => {
                    let org = conn.ttn_org_id.clone().unwrap_or_default();
                    return Err(ProvisionError::from_ttn(
                        STEP,
                        &RightsTarget::Organization(org),
                        err,
                    ));
                }
            }
        }

        row.ttn_gateway_id = None;
        row.owner = None;
        row.lns_key = None;
        row.status = GatewayStatus::Pending;
        self.gateways.save(&row).await?;
        info!(tenant_id = %tenant_id, gateway_eui = %gateway_eui, "gateway deregistered");
        Ok(())
    }

    /// Poll the regional gateway server's connection stats. A 404 means
    /// registered but never connected, which is not an error.
    pub async fn refresh_status(
        &self,
        tenant_id: Uuid,
        gateway_eui: &GatewayEui,
    ) -> ProvisionResult<GatewayStatus> {
        let conn = self.ready_connection(tenant_id).await?;
        let mut row = self.required_row(tenant_id, gateway_eui).await?;
        let gateway_id = row.ttn_gateway_id.clone().ok_or_else(|| {
            ProvisionError::InvalidState {
                message: format!("gateway {gateway_eui} is not registered remotely"),
                use_start_fresh: false,
            }
        })?;

        match self
            .ttn
            .gateway_connection_stats(&self.settings.admin_api_key, &gateway_id)
            .await
        {
            Ok(_) => {
                row.status = GatewayStatus::Online;
                row.last_seen_at = Some(Utc::now());
            }
            Err(TtnError::NotFound { .. }) => {
                row.status = GatewayStatus::Pending;
            }
            Err(err) => {
                let org = conn.ttn_org_id.clone().unwrap_or_default();
                return Err(ProvisionError::from_ttn(
                    STEP,
                    &RightsTarget::Organization(org),
                    err,
                ));
            }
        }
        self.gateways.save(&row).await?;
        Ok(row.status)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn ready_connection(&self, tenant_id: Uuid) -> ProvisionResult<TenantConnection> {
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
        Ok(conn)
    }

    async fn required_row(
        &self,
        tenant_id: Uuid,
        gateway_eui: &GatewayEui,
    ) -> ProvisionResult<GatewayRow> {
        self.gateways
            .find_by_eui(tenant_id, gateway_eui.as_str())
            .await?
            .ok_or_else(|| ProvisionError::InvalidState {
                message: format!("gateway {gateway_eui} is not registered"),
                use_start_fresh: false,
            })
    }

    fn region_of(&self, conn: &TenantConnection) -> ProvisionResult<Region> {
        conn.region.parse::<Region>().map_err(|e| ProvisionError::InvalidState {
            message: e,
            use_start_fresh: false,
        })
    }

    /// Token for a ladder rung, or `None` when the connection does not
    /// carry that credential.
    fn token_for(
        &self,
        conn: &TenantConnection,
        strategy: Strategy,
    ) -> ProvisionResult<Option<String>> {
        let slot = match strategy {
            Strategy::OrganizationKey => conn.gateway_key.as_deref(),
            Strategy::ApplicationKey => conn.app_key.as_deref(),
            Strategy::AdminUser => {
                return Ok(Some(self.settings.admin_api_key.clone()));
            }
        };
        match slot {
            Some(slot) => Ok(Some(self.open_slot(conn.tenant_id, slot)?)),
            None => Ok(None),
        }
    }

    /// Remote rights check for a minted key before spending a
    /// registration attempt on it.
    async fn can_create_gateways(&self, token: &str, org_id: &str) -> ProvisionResult<bool> {
        let info = self
            .ttn
            .auth_info(token)
            .await
            .map_err(|e| {
                ProvisionError::from_ttn(STEP, &RightsTarget::Organization(org_id.to_string()), e)
            })?;
        Ok(Capabilities::from_auth_info(&info).can_provision_gateways)
    }

    fn open_slot(&self, tenant_id: Uuid, slot: &CredentialSlot) -> ProvisionResult<String> {
        let sealed = SealedSecret {
            ciphertext: slot.ciphertext.clone(),
            fingerprint: slot.fingerprint.clone(),
        };
        Ok(self.vault.open(TenantId::from_uuid(tenant_id), &sealed)?)
    }

    fn seal_slot(
        &self,
        tenant_id: Uuid,
        key_id: Option<String>,
        plaintext: &str,
    ) -> ProvisionResult<CredentialSlot> {
        let sealed = self.vault.seal(TenantId::from_uuid(tenant_id), plaintext)?;
        Ok(CredentialSlot {
            key_id,
            ciphertext: sealed.ciphertext,
            fingerprint: sealed.fingerprint,
        })
    }

    fn gateway_payload(
        &self,
        gateway_id: &str,
        gateway_eui: &GatewayEui,
        name: Option<&str>,
        region: Region,
        row: &GatewayRow,
    ) -> Gateway {
        let antennas = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => vec![Antenna {
                location: AntennaLocation {
                    latitude,
                    longitude,
                    altitude: row.altitude.unwrap_or(0.0),
                    source: "SOURCE_REGISTRY".to_string(),
                },
            }],
            _ => Vec::new(),
        };
        Gateway {
            ids: GatewayIds {
                gateway_id: gateway_id.to_string(),
                eui: Some(gateway_eui.as_str().to_string()),
            },
            name: name.map(str::to_string).or_else(|| row.name.clone()),
            frequency_plan_ids: vec![row.frequency_plan_id.clone()],
            // Registration lives on the global identity server; this
            // pointer routes the radio traffic to the tenant's region.
            gateway_server_address: Some(region.gateway_server_address().to_string()),
            enforce_duty_cycle: Some(true),
            require_authenticated_connection: Some(true),
            status_public: Some(false),
            location_public: Some(false),
            antennas,
        }
    }
}
