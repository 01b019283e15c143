//! Tenant connection model.
//!
//! One row per tenant holding the TTN resource identifiers, sealed
//! credentials, the step ledger, and the last failure snapshot. The
//! orchestrator persists artifacts before marking their ledger flags, so
//! a crash between the two leaves the flag unset and the step re-runs
//! idempotently on the next attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a tenant connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Created but never provisioned.
    Idle,
    /// A provisioning run is underway.
    Provisioning,
    /// All steps finalized; identifiers are served from cache.
    Ready,
    /// The last run stopped on an error; see `last_error`.
    Failed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "idle"),
            ConnectionStatus::Provisioning => write!(f, "provisioning"),
            ConnectionStatus::Ready => write!(f, "ready"),
            ConnectionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(ConnectionStatus::Idle),
            "provisioning" => Ok(ConnectionStatus::Provisioning),
            "ready" => Ok(ConnectionStatus::Ready),
            "failed" => Ok(ConnectionStatus::Failed),
            _ => Err(format!("Unknown connection status: {s}")),
        }
    }
}

/// Result of the last application-rights verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RightsCheckStatus {
    /// Credential verified with the expected rights.
    Ok,
    /// Credential exists but lacks rights on the application.
    Forbidden,
    /// The application is invisible to the credential.
    NotFound,
    /// Never checked, or the check itself failed.
    Unknown,
}

impl std::fmt::Display for RightsCheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RightsCheckStatus::Ok => write!(f, "ok"),
            RightsCheckStatus::Forbidden => write!(f, "forbidden"),
            RightsCheckStatus::NotFound => write!(f, "not_found"),
            RightsCheckStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for RightsCheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ok" => Ok(RightsCheckStatus::Ok),
            "forbidden" => Ok(RightsCheckStatus::Forbidden),
            "not_found" => Ok(RightsCheckStatus::NotFound),
            "unknown" => Ok(RightsCheckStatus::Unknown),
            _ => Err(format!("Unknown rights status: {s}")),
        }
    }
}

/// Named steps of the org/application provisioning sequence, plus the
/// device and gateway operations that share the same failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Preflight,
    CreateOrganization,
    CreateOrgKey,
    CreateApplication,
    VerifyApplicationRights,
    CreateAppKey,
    CreateGatewayKey,
    CreateWebhook,
    Finalize,
    /// Not part of the connection ledger: device plane operations.
    ProvisionDevice,
    /// Not part of the connection ledger: gateway registration.
    RegisterGateway,
}

impl StepName {
    /// Full sequence in execution order.
    pub const SEQUENCE: [StepName; 9] = [
        StepName::Preflight,
        StepName::CreateOrganization,
        StepName::CreateOrgKey,
        StepName::CreateApplication,
        StepName::VerifyApplicationRights,
        StepName::CreateAppKey,
        StepName::CreateGatewayKey,
        StepName::CreateWebhook,
        StepName::Finalize,
    ];
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepName::Preflight => "preflight",
            StepName::CreateOrganization => "create_organization",
            StepName::CreateOrgKey => "create_org_key",
            StepName::CreateApplication => "create_application",
            StepName::VerifyApplicationRights => "verify_application_rights",
            StepName::CreateAppKey => "create_app_key",
            StepName::CreateGatewayKey => "create_gateway_key",
            StepName::CreateWebhook => "create_webhook",
            StepName::Finalize => "finalize",
            StepName::ProvisionDevice => "provision_device",
            StepName::RegisterGateway => "register_gateway",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preflight" => Ok(StepName::Preflight),
            "create_organization" => Ok(StepName::CreateOrganization),
            "create_org_key" => Ok(StepName::CreateOrgKey),
            "create_application" => Ok(StepName::CreateApplication),
            "verify_application_rights" => Ok(StepName::VerifyApplicationRights),
            "create_app_key" => Ok(StepName::CreateAppKey),
            "create_gateway_key" => Ok(StepName::CreateGatewayKey),
            "create_webhook" => Ok(StepName::CreateWebhook),
            "finalize" => Ok(StepName::Finalize),
            "provision_device" => Ok(StepName::ProvisionDevice),
            "register_gateway" => Ok(StepName::RegisterGateway),
            _ => Err(format!("Unknown step name: {s}")),
        }
    }
}

/// Per-step completion flags plus identifier-rotation bookkeeping.
///
/// Stored as JSONB. Every field defaults so rows written by older
/// versions deserialize cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLedger {
    #[serde(default)]
    pub org_created: bool,
    #[serde(default)]
    pub org_verified: bool,
    #[serde(default)]
    pub org_api_key_created: bool,
    #[serde(default)]
    pub app_created: bool,
    #[serde(default)]
    pub app_rights_verified: bool,
    #[serde(default)]
    pub app_api_key_created: bool,
    #[serde(default)]
    pub gateway_api_key_created: bool,
    #[serde(default)]
    pub webhook_created: bool,
    #[serde(default)]
    pub finalized: bool,

    /// Collision rotations consumed for the organization id.
    #[serde(default)]
    pub org_id_rotations: u32,
    /// Collision rotations consumed for the application id.
    #[serde(default)]
    pub app_id_rotations: u32,
    /// Organization ids abandoned to collisions.
    #[serde(default)]
    pub rotated_org_ids: Vec<String>,
    /// Application ids abandoned to collisions.
    #[serde(default)]
    pub rotated_app_ids: Vec<String>,
}

impl StepLedger {
    /// Whether every step through finalize has completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.org_created
            && self.org_verified
            && self.org_api_key_created
            && self.app_created
            && self.app_rights_verified
            && self.app_api_key_created
            && self.webhook_created
            && self.finalized
    }

    /// Reset every flag that depends on the application identity.
    ///
    /// Called when the application id rotates or the remote application
    /// disappears. The gateway key is organization-scoped and survives.
    pub fn clear_application_dependents(&mut self) {
        self.app_created = false;
        self.app_rights_verified = false;
        self.app_api_key_created = false;
        self.webhook_created = false;
        self.finalized = false;
    }

    /// Reset every flag that depends on the organization identity.
    ///
    /// Called when the organization id rotates. Rotation bookkeeping is
    /// deliberately preserved so the attempt budget stays bounded.
    pub fn clear_organization_dependents(&mut self) {
        self.org_created = false;
        self.org_verified = false;
        self.org_api_key_created = false;
        self.gateway_api_key_created = false;
        self.clear_application_dependents();
    }
}

/// A sealed credential as stored on the row: AEAD ciphertext plus a
/// plaintext fingerprint for operator display. Never the secret itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSlot {
    /// Remote key id (TTN API key id), when the credential is an API key.
    pub key_id: Option<String>,
    /// base64(nonce || ciphertext) under the tenant-derived key.
    pub ciphertext: String,
    /// Last characters of the plaintext, for support conversations.
    pub fingerprint: String,
}

/// Snapshot of the last failed remote call, stored as JSONB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastErrorSnapshot {
    /// Step that failed.
    pub step: Option<String>,
    /// HTTP status, when the failure came from a response.
    pub http_status: Option<u16>,
    /// Response body, truncated to 512 characters upstream.
    pub body_excerpt: Option<String>,
    /// TTN correlation id for support tickets.
    pub correlation_id: Option<String>,
    /// Remote error namespace, e.g. `pkg/identityserver`.
    pub error_namespace: Option<String>,
    /// Remote error name, e.g. `organization_id_taken`.
    pub error_name: Option<String>,
    /// Human-readable summary.
    pub message: String,
    /// When the failure was recorded.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// A tenant's connection to the network operator.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TenantConnection {
    pub id: Uuid,

    /// The FrostGuard tenant this connection belongs to. Unique.
    pub tenant_id: Uuid,

    pub status: ConnectionStatus,

    /// TTN region hosting the radio plane (`eu1`, `nam1`, `au1`).
    pub region: String,

    /// Step currently executing, or the step that failed.
    pub current_step: Option<String>,

    /// Provisioned TTN organization id.
    pub ttn_org_id: Option<String>,

    /// Provisioned TTN application id.
    pub ttn_app_id: Option<String>,

    /// Webhook id registered on the application server.
    pub webhook_id: Option<String>,

    /// Organization-scoped API key minted for delegation.
    pub org_key: Option<Json<CredentialSlot>>,

    /// Application-scoped API key handed to the ingest pipeline.
    pub app_key: Option<Json<CredentialSlot>>,

    /// Organization-level gateway provisioning key, when requested.
    pub gateway_key: Option<Json<CredentialSlot>>,

    /// Shared secret TTN signs webhook deliveries with.
    pub webhook_secret: Option<Json<CredentialSlot>>,

    /// Step ledger.
    pub step_ledger: Json<StepLedger>,

    /// Outcome of the last rights verification.
    pub rights_status: RightsCheckStatus,

    /// Snapshot of the last failure.
    pub last_error: Option<Json<LastErrorSnapshot>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TenantConnection {
    /// Find the connection for a tenant.
    pub async fn find_by_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM tenant_connections
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Insert a fresh idle connection.
    pub async fn insert(
        pool: &sqlx::PgPool,
        new: &NewTenantConnection,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO tenant_connections (id, tenant_id, status, region, step_ledger, rights_status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.tenant_id)
        .bind(ConnectionStatus::Idle)
        .bind(&new.region)
        .bind(Json(StepLedger::default()))
        .bind(RightsCheckStatus::Unknown)
        .fetch_one(pool)
        .await
    }

    /// Persist the mutable fields of the row.
    pub async fn save(&self, pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tenant_connections SET
                status = $2,
                region = $3,
                current_step = $4,
                ttn_org_id = $5,
                ttn_app_id = $6,
                webhook_id = $7,
                org_key = $8,
                app_key = $9,
                gateway_key = $10,
                webhook_secret = $11,
                step_ledger = $12,
                rights_status = $13,
                last_error = $14,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(self.status)
        .bind(&self.region)
        .bind(&self.current_step)
        .bind(&self.ttn_org_id)
        .bind(&self.ttn_app_id)
        .bind(&self.webhook_id)
        .bind(&self.org_key)
        .bind(&self.app_key)
        .bind(&self.gateway_key)
        .bind(&self.webhook_secret)
        .bind(&self.step_ledger)
        .bind(self.rights_status)
        .bind(&self.last_error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Remove the row entirely. Cascades to the provisioning log.
    pub async fn delete_by_tenant(
        pool: &sqlx::PgPool,
        tenant_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM tenant_connections WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

/// Request to create a connection row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTenantConnection {
    pub tenant_id: Uuid,
    pub region: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_defaults_from_empty_json() {
        let ledger: StepLedger = serde_json::from_str("{}").unwrap();
        assert!(!ledger.org_created);
        assert_eq!(ledger.org_id_rotations, 0);
        assert!(ledger.rotated_org_ids.is_empty());
    }

    #[test]
    fn test_ledger_completion() {
        let mut ledger = StepLedger {
            org_created: true,
            org_verified: true,
            org_api_key_created: true,
            app_created: true,
            app_rights_verified: true,
            app_api_key_created: true,
            webhook_created: true,
            finalized: true,
            ..StepLedger::default()
        };
        // The gateway key is optional and does not gate completion.
        assert!(ledger.is_complete());

        ledger.webhook_created = false;
        assert!(!ledger.is_complete());
    }

    #[test]
    fn test_application_reset_spares_org_flags() {
        let mut ledger = StepLedger {
            org_created: true,
            org_verified: true,
            org_api_key_created: true,
            gateway_api_key_created: true,
            app_created: true,
            app_rights_verified: true,
            app_api_key_created: true,
            webhook_created: true,
            finalized: true,
            ..StepLedger::default()
        };
        ledger.clear_application_dependents();
        assert!(ledger.org_created && ledger.org_verified && ledger.org_api_key_created);
        assert!(ledger.gateway_api_key_created);
        assert!(!ledger.app_created && !ledger.webhook_created && !ledger.finalized);
    }

    #[test]
    fn test_organization_reset_preserves_rotation_budget() {
        let mut ledger = StepLedger {
            org_created: true,
            org_verified: true,
            org_api_key_created: true,
            org_id_rotations: 2,
            rotated_org_ids: vec!["fg-acme".to_string(), "fg-acme-a1b2c3".to_string()],
            ..StepLedger::default()
        };
        ledger.clear_organization_dependents();
        assert!(!ledger.org_created);
        assert_eq!(ledger.org_id_rotations, 2);
        assert_eq!(ledger.rotated_org_ids.len(), 2);
    }

    #[test]
    fn test_step_name_roundtrip() {
        for step in StepName::SEQUENCE {
            let parsed: StepName = step.to_string().parse().unwrap();
            assert_eq!(parsed, step);
        }
    }
}
