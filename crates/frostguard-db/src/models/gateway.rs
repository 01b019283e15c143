//! Gateway model.
//!
//! Local registry of LoRaWAN gateways. The identity-plane registration
//! lives on the global cluster; `status` is derived from the regional
//! gateway server's connection stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::tenant_connection::CredentialSlot;

/// Which entity owns the gateway record on the identity server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GatewayOwner {
    /// Registered under the tenant's TTN organization.
    Organization,
    /// Registered under the admin account (fallback).
    User,
}

impl std::fmt::Display for GatewayOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayOwner::Organization => write!(f, "organization"),
            GatewayOwner::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for GatewayOwner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "organization" => Ok(GatewayOwner::Organization),
            "user" => Ok(GatewayOwner::User),
            _ => Err(format!("Unknown gateway owner: {s}")),
        }
    }
}

/// Operational status of a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    /// Registered but never connected.
    Pending,
    /// Connected and forwarding recently.
    Online,
    /// Connected but uplinks are stale.
    Degraded,
    /// Not connected.
    Offline,
    /// Taken out of service on purpose.
    Maintenance,
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayStatus::Pending => write!(f, "pending"),
            GatewayStatus::Online => write!(f, "online"),
            GatewayStatus::Degraded => write!(f, "degraded"),
            GatewayStatus::Offline => write!(f, "offline"),
            GatewayStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

impl std::str::FromStr for GatewayStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(GatewayStatus::Pending),
            "online" => Ok(GatewayStatus::Online),
            "degraded" => Ok(GatewayStatus::Degraded),
            "offline" => Ok(GatewayStatus::Offline),
            "maintenance" => Ok(GatewayStatus::Maintenance),
            _ => Err(format!("Unknown gateway status: {s}")),
        }
    }
}

/// A gateway in the local registry.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Gateway {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Normalized gateway EUI (16 uppercase hex characters). Unique per
    /// tenant.
    pub gateway_eui: String,

    /// TTN gateway id, `fg-gw-<last 8 of EUI, lowercase>`.
    pub ttn_gateway_id: Option<String>,

    pub name: Option<String>,

    /// Owner of the identity-plane record.
    pub owner: Option<GatewayOwner>,

    /// Frequency plan, e.g. `US_902_928_FSB_2`.
    pub frequency_plan_id: String,

    /// Sealed gateway API key for LNS authentication.
    pub lns_key: Option<Json<CredentialSlot>>,

    pub status: GatewayStatus,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,

    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Gateway {
    pub async fn find_by_eui(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
        gateway_eui: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM gateways
            WHERE tenant_id = $1 AND gateway_eui = $2
            "#,
        )
        .bind(tenant_id)
        .bind(gateway_eui)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_by_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM gateways
            WHERE tenant_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    pub async fn insert(pool: &sqlx::PgPool, new: &NewGateway) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO gateways
                (id, tenant_id, gateway_eui, name, frequency_plan_id, status,
                 latitude, longitude, altitude)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.tenant_id)
        .bind(&new.gateway_eui)
        .bind(&new.name)
        .bind(&new.frequency_plan_id)
        .bind(GatewayStatus::Pending)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(new.altitude)
        .fetch_one(pool)
        .await
    }

    pub async fn save(&self, pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE gateways SET
                ttn_gateway_id = $2,
                name = $3,
                owner = $4,
                frequency_plan_id = $5,
                lns_key = $6,
                status = $7,
                latitude = $8,
                longitude = $9,
                altitude = $10,
                last_seen_at = $11,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(&self.ttn_gateway_id)
        .bind(&self.name)
        .bind(self.owner)
        .bind(&self.frequency_plan_id)
        .bind(&self.lns_key)
        .bind(self.status)
        .bind(self.latitude)
        .bind(self.longitude)
        .bind(self.altitude)
        .bind(self.last_seen_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &sqlx::PgPool, tenant_id: Uuid, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM gateways WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

/// Request to register a gateway locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGateway {
    pub tenant_id: Uuid,
    pub gateway_eui: String,
    pub name: Option<String>,
    pub frequency_plan_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}
