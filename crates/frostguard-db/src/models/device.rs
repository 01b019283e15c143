//! Device model.
//!
//! Local registry of LoRaWAN sensors. `provisioning_state` tracks the
//! relationship between this row and the four remote device planes;
//! `status` tracks the radio lifecycle once traffic flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::tenant_connection::CredentialSlot;

/// Relationship between the local row and the remote planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceProvisioningState {
    /// Local row only; nothing registered remotely.
    NotProvisioned,
    /// Present on all four remote planes.
    Provisioned,
    /// The EUI is claimed remotely by someone else.
    Conflict,
    /// Found remotely and adopted into the local registry.
    ExistsInTtn,
}

impl std::fmt::Display for DeviceProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceProvisioningState::NotProvisioned => write!(f, "not_provisioned"),
            DeviceProvisioningState::Provisioned => write!(f, "provisioned"),
            DeviceProvisioningState::Conflict => write!(f, "conflict"),
            DeviceProvisioningState::ExistsInTtn => write!(f, "exists_in_ttn"),
        }
    }
}

impl std::str::FromStr for DeviceProvisioningState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "not_provisioned" => Ok(DeviceProvisioningState::NotProvisioned),
            "provisioned" => Ok(DeviceProvisioningState::Provisioned),
            "conflict" => Ok(DeviceProvisioningState::Conflict),
            "exists_in_ttn" => Ok(DeviceProvisioningState::ExistsInTtn),
            _ => Err(format!("Unknown device provisioning state: {s}")),
        }
    }
}

/// Radio lifecycle of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Registered, no join attempt seen yet.
    Pending,
    /// Join request seen, no uplink yet.
    Joining,
    /// Uplinks flowing.
    Active,
    /// Stopped reporting or failing to join.
    Fault,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Pending => write!(f, "pending"),
            DeviceStatus::Joining => write!(f, "joining"),
            DeviceStatus::Active => write!(f, "active"),
            DeviceStatus::Fault => write!(f, "fault"),
        }
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DeviceStatus::Pending),
            "joining" => Ok(DeviceStatus::Joining),
            "active" => Ok(DeviceStatus::Active),
            "fault" => Ok(DeviceStatus::Fault),
            _ => Err(format!("Unknown device status: {s}")),
        }
    }
}

/// A sensor in the local registry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Normalized DevEUI (16 uppercase hex characters). Unique per tenant.
    pub dev_eui: String,

    /// Normalized JoinEUI.
    pub join_eui: String,

    /// TTN device id, `fg-dev-<dev_eui lowercase>`.
    pub ttn_device_id: Option<String>,

    pub name: Option<String>,

    /// Sealed LoRaWAN AppKey (root key material).
    pub app_key: Option<Json<CredentialSlot>>,

    pub provisioning_state: DeviceProvisioningState,
    pub status: DeviceStatus,

    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub async fn find_by_eui(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        dev_eui: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM devices
            WHERE tenant_id = $1 AND dev_eui = $2
            "#,
        )
        .bind(tenant_id)
        .bind(dev_eui)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM devices
            WHERE tenant_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    pub async fn insert(pool: &sqlx::PgPool, new: &NewDevice) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO devices (id, tenant_id, dev_eui, join_eui, name, provisioning_state, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.tenant_id)
        .bind(&new.dev_eui)
        .bind(&new.join_eui)
        .bind(&new.name)
        .bind(DeviceProvisioningState::NotProvisioned)
        .bind(DeviceStatus::Pending)
        .fetch_one(pool)
        .await
    }

    pub async fn save(&self, pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE devices SET
                ttn_device_id = $2,
                name = $3,
                app_key = $4,
                provisioning_state = $5,
                status = $6,
                last_seen_at = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(&self.ttn_device_id)
        .bind(&self.name)
        .bind(&self.app_key)
        .bind(self.provisioning_state)
        .bind(self.status)
        .bind(self.last_seen_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &sqlx::PgPool, tenant_id: Uuid, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM devices WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

/// Request to register a device locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    pub tenant_id: Uuid,
    pub dev_eui: String,
    pub join_eui: String,
    pub name: Option<String>,
}
