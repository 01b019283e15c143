//! Deterministic TTN identifier derivation.
//!
//! Identifiers are derived from the tenant id so that re-running a
//! provisioning sequence lands on the same candidates, and collision
//! rotation is keyed by the attempt number so candidate N is the same
//! on every machine and every retry.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Webhook id registered on every tenant application.
pub const WEBHOOK_ID: &str = "frostguard-ingest";

/// Header TTN signs webhook deliveries with.
pub const WEBHOOK_SECRET_HEADER: &str = "x-frostguard-secret";

/// Display names of the keys minted during a run.
pub const ORG_KEY_NAME: &str = "frostguard-org-key";
pub const APP_KEY_NAME: &str = "frostguard-app-key";
pub const GATEWAY_KEY_NAME: &str = "frostguard-gateway-key";
pub const LNS_KEY_NAME: &str = "frostguard-lns-key";

/// Base slug for a tenant, from the first 8 hex characters of its uuid.
fn tenant_slug(tenant_id: Uuid) -> String {
    let hex = tenant_id.simple().to_string();
    format!("fg-{}", &hex[..8])
}

/// Rotation suffix: first 6 hex characters of SHA-256("<kind>:<tenant>:<attempt>").
fn rotation_suffix(kind: &str, tenant_id: Uuid, attempt: u32) -> String {
    let digest = Sha256::digest(format!("{kind}:{tenant_id}:{attempt}"));
    hex::encode(&digest[..3])
}

/// Candidate organization id for a rotation attempt. Attempt 0 is the
/// bare slug.
#[must_use]
pub fn org_id(tenant_id: Uuid, attempt: u32) -> String {
    let base = tenant_slug(tenant_id);
    if attempt == 0 {
        base
    } else {
        format!("{base}-{}", rotation_suffix("org", tenant_id, attempt))
    }
}

/// Candidate application id for a rotation attempt.
#[must_use]
pub fn app_id(tenant_id: Uuid, attempt: u32) -> String {
    let base = format!("{}-app", tenant_slug(tenant_id));
    if attempt == 0 {
        base
    } else {
        format!("{base}-{}", rotation_suffix("app", tenant_id, attempt))
    }
}

/// TTN device id for a DevEUI: `fg-dev-<eui lowercase>`.
#[must_use]
pub fn device_id(dev_eui: &str) -> String {
    format!("fg-dev-{}", dev_eui.to_lowercase())
}

/// TTN gateway id for a gateway EUI: `fg-gw-<last 8, lowercase>`.
#[must_use]
pub fn gateway_id(gateway_eui: &str) -> String {
    let eui = gateway_eui.to_lowercase();
    let suffix = if eui.len() > 8 { &eui[eui.len() - 8..] } else { &eui };
    format!("fg-gw-{suffix}")
}

/// Per-tenant webhook delivery URL under the ingest base.
#[must_use]
pub fn webhook_url(base_url: &str, tenant_id: Uuid) -> String {
    format!("{base_url}/ttn/{tenant_id}")
}
