//! Org/application provisioning orchestrator.
//!
//! Drives the fixed step sequence against TTN with the persisted step
//! ledger as the source of truth: a step whose ledger flag is set and
//! whose artifact is confirmed in storage is skipped without a remote
//! call; a flag set without its artifact is a consistency fault that
//! forces re-execution. Artifacts are always persisted before their
//! flags flip (write-then-mark), so a crash between the two re-runs the
//! step instead of losing it.
//!
//! Two invocations for the same tenant are not mutually excluded; both
//! can observe an unset flag and attempt the same step. The remote
//! calls are idempotent enough that this converges, but callers that
//! need stronger guarantees should serialize per tenant upstream.

use std::sync::Arc;
use std::time::Instant;

use rand::RngCore;
use sqlx::types::Json;
use tracing::{info, warn};
use uuid::Uuid;

use frostguard_core::TenantId;
use frostguard_db::models::{
    AttemptOutcome, ConnectionStatus, CredentialSlot, LogDetail, NewLogEntry,
    NewTenantConnection, RightsCheckStatus, StepName, TenantConnection,
};
use frostguard_db::{ConnectionStore, ProvisioningLogStore};
use frostguard_secrets::{SealedSecret, SecretVault};
use frostguard_ttn::types::{
    rights, ApiKeyRequest, Application, Organization, Webhook, WebhookIds, WebhookMessagePath,
};
use frostguard_ttn::{Region, TtnApi, TtnError};

use crate::error::{ProvisionError, ProvisionResult, RightsTarget};
use crate::naming;
use crate::outcome::{ProvisionOutcome, StatusReport, StepReport};
use crate::settings::ProvisioningSettings;

/// Rights granted to the application-scoped key handed to ingest.
const APP_KEY_RIGHTS: &[&str] = &[
    rights::RIGHT_APPLICATION_DEVICES_READ,
    rights::RIGHT_APPLICATION_DEVICES_WRITE,
    rights::RIGHT_APPLICATION_DEVICES_READ_KEYS,
    rights::RIGHT_APPLICATION_DEVICES_WRITE_KEYS,
    rights::RIGHT_APPLICATION_TRAFFIC_READ,
    rights::RIGHT_APPLICATION_TRAFFIC_DOWN_WRITE,
    rights::RIGHT_APPLICATION_SETTINGS_BASIC,
    rights::RIGHT_APPLICATION_LINK,
];

/// Orchestrates the tenant connection lifecycle.
pub struct ConnectionOrchestrator {
    ttn: Arc<dyn TtnApi>,
    connections: Arc<dyn ConnectionStore>,
    log: Arc<dyn ProvisioningLogStore>,
    vault: SecretVault,
    settings: ProvisioningSettings,
}

impl ConnectionOrchestrator {
    pub fn new(
        ttn: Arc<dyn TtnApi>,
        connections: Arc<dyn ConnectionStore>,
        log: Arc<dyn ProvisioningLogStore>,
        vault: SecretVault,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            ttn,
            connections,
            log,
            vault,
            settings,
        }
    }

    /// Provision the tenant's TTN resources, resuming from the ledger.
    ///
    /// A connection already `ready` with a complete ledger returns its
    /// cached identifiers without any remote call.
    pub async fn provision(
        &self,
        tenant_id: Uuid,
        region: Option<Region>,
    ) -> ProvisionResult<ProvisionOutcome> {
        let mut conn = self.load_or_create(tenant_id, region).await?;
        if conn.status == ConnectionStatus::Ready && conn.step_ledger.0.is_complete() {
            info!(tenant_id = %tenant_id, "connection already ready, serving cached identifiers");
            return Ok(self.outcome_from(&conn, Vec::new()));
        }
        self.run(&mut conn).await
    }

    /// Re-run the sequence after a failure.
    ///
    /// Refused when the last rights check came back `forbidden`: the
    /// identifiers are known to be owned elsewhere and retrying the same
    /// ids cannot succeed.
    pub async fn retry(&self, tenant_id: Uuid) -> ProvisionResult<ProvisionOutcome> {
        let mut conn = self.load_required(tenant_id).await?;
        if conn.rights_status == RightsCheckStatus::Forbidden {
            return Err(ProvisionError::InvalidState {
                message: "application rights are known-forbidden; retry cannot help, \
                          use start_fresh"
                    .to_string(),
                use_start_fresh: true,
            });
        }
        if conn.status == ConnectionStatus::Ready && conn.step_ledger.0.is_complete() {
            return Ok(self.outcome_from(&conn, Vec::new()));
        }
        self.run(&mut conn).await
    }

    /// Abandon the current application and restart from the divergence
    /// point.
    ///
    /// Tries to delete the previously-provisioned application first;
    /// when deletion is not permitted the application id is rotated
    /// instead, and every ledger flag that assumed the old id is
    /// cleared.
    pub async fn start_fresh(&self, tenant_id: Uuid) -> ProvisionResult<ProvisionOutcome> {
        let mut conn = self.load_required(tenant_id).await?;

        if let Some(app_id) = conn.ttn_app_id.clone() {
            match self.ttn.delete_application(&self.settings.admin_api_key, &app_id).await {
                Ok(()) => {
                    info!(tenant_id = %tenant_id, app_id = %app_id, "deleted previous application");
                }
                Err(TtnError::NotFound { .. }) => {
                    info!(tenant_id = %tenant_id, app_id = %app_id, "previous application already gone");
                }
                Err(TtnError::Forbidden { .. }) => {
                    let rotations = conn.step_ledger.0.app_id_rotations;
                    if rotations >= self.settings.max_id_rotations {
                        return Err(ProvisionError::RotationExhausted {
                            step: StepName::CreateApplication,
                            attempts: rotations,
                        });
                    }
                    warn!(
                        tenant_id = %tenant_id,
                        app_id = %app_id,
                        "cannot delete unowned application, rotating to a new id"
                    );
                    conn.step_ledger.0.app_id_rotations = rotations + 1;
                    conn.step_ledger.0.rotated_app_ids.push(app_id);
                    conn.ttn_app_id = None;
                }
                Err(err) => {
                    return Err(ProvisionError::from_ttn(
                        StepName::CreateApplication,
                        &RightsTarget::Application(app_id),
                        err,
                    ));
                }
            }
        }

        conn.step_ledger.0.clear_application_dependents();
        conn.app_key = None;
        conn.webhook_id = None;
        conn.webhook_secret = None;
        conn.rights_status = RightsCheckStatus::Unknown;
        conn.last_error = None;
        self.connections.save(&conn).await?;

        self.run(&mut conn).await
    }

    /// Current state of the connection, from storage only. Credentials
    /// are reported as presence booleans and fingerprints.
    pub async fn status(&self, tenant_id: Uuid) -> ProvisionResult<StatusReport> {
        let conn = self.load_required(tenant_id).await?;
        let webhook_url = conn
            .webhook_id
            .as_ref()
            .map(|_| naming::webhook_url(&self.settings.webhook_base_url, tenant_id));
        Ok(StatusReport::from_connection(&conn, webhook_url))
    }

    /// Tear down the remote resources and remove the connection row.
    ///
    /// Remote deletions are best-effort: resources already gone, or no
    /// longer ours, do not block local removal.
    pub async fn delete(&self, tenant_id: Uuid) -> ProvisionResult<()> {
        let conn = self.load_required(tenant_id).await?;
        let admin = &self.settings.admin_api_key;

        if let (Some(app_id), Some(webhook_id)) = (&conn.ttn_app_id, &conn.webhook_id) {
            let token = match conn.org_key.as_deref() {
                Some(slot) => self.open_slot(tenant_id, slot)?,
                None => admin.clone(),
            };
            if let Err(err) = self.ttn.delete_webhook(&token, app_id, webhook_id).await {
                warn!(tenant_id = %tenant_id, error = %err, "webhook teardown failed, continuing");
            }
        }
        if let Some(app_id) = &conn.ttn_app_id {
            if let Err(err) = self.ttn.delete_application(admin, app_id).await {
                warn!(tenant_id = %tenant_id, error = %err, "application teardown failed, continuing");
            }
        }
        if let Some(org_id) = &conn.ttn_org_id {
            if let Err(err) = self.ttn.delete_organization(admin, org_id).await {
                warn!(tenant_id = %tenant_id, error = %err, "organization teardown failed, continuing");
            }
        }

        self.connections.delete(tenant_id).await?;
        info!(tenant_id = %tenant_id, "connection deleted");
        Ok(())
    }

    /// Replace the webhook signing secret on a ready connection.
    pub async fn regenerate_webhook_secret(
        &self,
        tenant_id: Uuid,
    ) -> ProvisionResult<StatusReport> {
        let mut conn = self.load_required(tenant_id).await?;
        if conn.status != ConnectionStatus::Ready || conn.webhook_id.is_none() {
            return Err(ProvisionError::InvalidState {
                message: "webhook secret can only be regenerated on a ready connection"
                    .to_string(),
                use_start_fresh: false,
            });
        }
        let app_id = require(StepName::CreateWebhook, conn.ttn_app_id.clone(), "application id")?;
        let org_slot = conn.org_key.as_deref().cloned();
        let org_slot = require(StepName::CreateWebhook, org_slot, "organization key")?;
        let token = self.open_slot(tenant_id, &org_slot)?;

        let secret = random_secret();
        let webhook = self.webhook_payload(tenant_id, &app_id, &secret);
        self.ttn
            .set_webhook(&token, &app_id, &webhook)
            .await
            .map_err(|e| {
                ProvisionError::from_ttn(
                    StepName::CreateWebhook,
                    &RightsTarget::Application(app_id.clone()),
                    e,
                )
            })?;

        conn.webhook_secret = Some(Json(self.seal_slot(tenant_id, None, &secret)?));
        self.connections.save(&conn).await?;
        info!(tenant_id = %tenant_id, "webhook secret regenerated");

        let webhook_url = Some(naming::webhook_url(&self.settings.webhook_base_url, tenant_id));
        Ok(StatusReport::from_connection(&conn, webhook_url))
    }

    // ── Sequence runner ──────────────────────────────────────────────

    async fn run(&self, conn: &mut TenantConnection) -> ProvisionResult<ProvisionOutcome> {
        conn.status = ConnectionStatus::Provisioning;
        conn.last_error = None;
        self.connections.save(conn).await?;

        let mut steps = Vec::new();
        match self.run_sequence(conn, &mut steps).await {
            Ok(()) => {
                conn.status = ConnectionStatus::Ready;
                conn.current_step = None;
                self.connections.save(conn).await?;
                info!(tenant_id = %conn.tenant_id, org_id = ?conn.ttn_org_id, "provisioning complete");
                Ok(self.outcome_from(conn, steps))
            }
            Err(err) => {
                conn.status = ConnectionStatus::Failed;
                conn.last_error = Some(Json(err.snapshot()));
                self.connections.save(conn).await?;
                warn!(
                    tenant_id = %conn.tenant_id,
                    step = ?err.step(),
                    category = err.category(),
                    correlation_id = err.correlation_id().unwrap_or(""),
                    "provisioning failed"
                );
                Err(err)
            }
        }
    }

    async fn run_sequence(
        &self,
        conn: &mut TenantConnection,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        self.step_preflight(conn, steps).await?;
        self.step_ensure_organization(conn, steps).await?;
        self.step_org_key(conn, steps).await?;
        self.step_ensure_application(conn, steps).await?;
        self.step_verify_rights(conn, steps).await?;
        self.step_app_key(conn, steps).await?;
        self.step_gateway_key(conn, steps).await?;
        self.step_webhook(conn, steps).await?;
        self.step_finalize(conn, steps).await?;
        Ok(())
    }

    /// Local configuration checks. No remote calls, no ledger flag.
    async fn step_preflight(
        &self,
        conn: &mut TenantConnection,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        self.enter(conn, StepName::Preflight).await?;
        let started = Instant::now();
        if self.settings.admin_api_key.is_empty() || self.settings.ttn_user_id.is_empty() {
            return Err(ProvisionError::InvalidState {
                message: "admin credential or TTN user id not configured".to_string(),
                use_start_fresh: false,
            });
        }
        if conn.region.parse::<Region>().is_err() {
            return Err(ProvisionError::InvalidState {
                message: format!("unknown region on connection: {}", conn.region),
                use_start_fresh: false,
            });
        }
        self.record(conn, StepName::Preflight, AttemptOutcome::Success, 1, timing(started))
            .await?;
        steps.push(StepReport::new(StepName::Preflight, AttemptOutcome::Success));
        Ok(())
    }

    /// Create the organization and verify ownership, rotating the id on
    /// collision. Verification failing with not-found or forbidden on an
    /// id we just claimed means the id belongs to another account.
    async fn step_ensure_organization(
        &self,
        conn: &mut TenantConnection,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        let step = StepName::CreateOrganization;
        if conn.step_ledger.0.org_created && conn.step_ledger.0.org_verified {
            if conn.ttn_org_id.is_some() {
                self.skip(conn, step, steps).await?;
                return Ok(());
            }
            self.repair(conn, step, |l| {
                l.org_created = false;
                l.org_verified = false;
            })
            .await?;
        }
        self.enter(conn, step).await?;

        let tenant_id = conn.tenant_id;
        let admin = self.settings.admin_api_key.clone();
        let org_name = format!("FrostGuard {}", naming::org_id(tenant_id, 0));

        for attempt in conn.step_ledger.0.org_id_rotations..self.settings.max_id_rotations {
            let started = Instant::now();
            let candidate = conn
                .ttn_org_id
                .clone()
                .unwrap_or_else(|| naming::org_id(tenant_id, attempt));
            self.record(conn, step, AttemptOutcome::Started, attempt as i32 + 1, None)
                .await?;

            if !conn.step_ledger.0.org_created {
                let org = Organization::new(&candidate, &org_name);
                match self
                    .ttn
                    .create_organization(&admin, &self.settings.ttn_user_id, &org)
                    .await
                {
                    // A 409 is not a failure yet: verification decides
                    // whether the existing org is ours.
                    Ok(_) | Err(TtnError::Conflict { .. }) => {}
                    Err(err) => {
                        let failure = ProvisionError::from_ttn(
                            step,
                            &RightsTarget::Organization(candidate),
                            err,
                        );
                        self.fail_log(conn, step, attempt as i32 + 1, started, &failure)
                            .await?;
                        return Err(failure);
                    }
                }
                conn.ttn_org_id = Some(candidate.clone());
                self.connections.save(conn).await?;
                conn.step_ledger.0.org_created = true;
                self.connections.save(conn).await?;
            }

            match self.ttn.get_organization(&admin, &candidate).await {
                Ok(_) => {
                    conn.step_ledger.0.org_verified = true;
                    self.connections.save(conn).await?;
                    self.record(
                        conn,
                        step,
                        AttemptOutcome::Success,
                        attempt as i32 + 1,
                        timing(started),
                    )
                    .await?;
                    steps.push(StepReport::new(step, AttemptOutcome::Success));
                    return Ok(());
                }
                Err(err)
                    if matches!(
                        err,
                        TtnError::NotFound { .. } | TtnError::Forbidden { .. }
                    ) =>
                {
                    warn!(
                        tenant_id = %tenant_id,
                        org_id = %candidate,
                        attempt,
                        "organization id collision, rotating"
                    );
                    self.record(
                        conn,
                        step,
                        AttemptOutcome::Failed,
                        attempt as i32 + 1,
                        Some(LogDetail {
                            http_status: err.status(),
                            correlation_id: err.correlation_id().map(str::to_string),
                            message: Some(format!("id collision on {candidate}")),
                            endpoint: Some(err.resource().to_string()),
                            body_excerpt: err.detail().map(|d| d.body_excerpt.clone()),
                            duration_ms: Some(elapsed_ms(started)),
                            ..LogDetail::default()
                        }),
                    )
                    .await?;

                    let ledger = &mut conn.step_ledger.0;
                    ledger.org_id_rotations = attempt + 1;
                    ledger.rotated_org_ids.push(candidate);
                    ledger.clear_organization_dependents();
                    conn.ttn_org_id = None;
                    conn.ttn_app_id = None;
                    conn.org_key = None;
                    conn.app_key = None;
                    conn.gateway_key = None;
                    conn.webhook_id = None;
                    conn.webhook_secret = None;
                    conn.rights_status = RightsCheckStatus::Unknown;
                    self.connections.save(conn).await?;
                }
                Err(err) => {
                    let failure = ProvisionError::from_ttn(
                        step,
                        &RightsTarget::Organization(candidate),
                        err,
                    );
                    self.fail_log(conn, step, attempt as i32 + 1, started, &failure)
                        .await?;
                    return Err(failure);
                }
            }
        }

        Err(ProvisionError::RotationExhausted {
            step,
            attempts: self.settings.max_id_rotations,
        })
    }

    async fn step_org_key(
        &self,
        conn: &mut TenantConnection,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        let step = StepName::CreateOrgKey;
        if conn.step_ledger.0.org_api_key_created {
            if conn.org_key.is_some() {
                self.skip(conn, step, steps).await?;
                return Ok(());
            }
            self.repair(conn, step, |l| l.org_api_key_created = false).await?;
        }
        self.enter(conn, step).await?;
        let started = Instant::now();
        self.record(conn, step, AttemptOutcome::Started, 1, None).await?;

        let org_id = require(step, conn.ttn_org_id.clone(), "organization id")?;
        let request = ApiKeyRequest::new(naming::ORG_KEY_NAME, &[rights::RIGHT_ORGANIZATION_ALL]);
        let key = self
            .ttn
            .create_organization_api_key(&self.settings.admin_api_key, &org_id, &request)
            .await
            .map_err(|e| {
                ProvisionError::from_ttn(step, &RightsTarget::Organization(org_id.clone()), e)
            })?;
        let secret = key.key.ok_or(ProvisionError::Internal {
            step,
            message: "key material missing from creation response".to_string(),
        })?;

        conn.org_key = Some(Json(self.seal_slot(conn.tenant_id, Some(key.id), &secret)?));
        self.connections.save(conn).await?;
        conn.step_ledger.0.org_api_key_created = true;
        self.connections.save(conn).await?;

        self.record(conn, step, AttemptOutcome::Success, 1, timing(started)).await?;
        steps.push(StepReport::new(step, AttemptOutcome::Success));
        Ok(())
    }

    /// Create the application under the organization. A 409 triggers an
    /// ownership re-check; an application that exists but is unowned is
    /// a collision and rotates the id like the organization step.
    async fn step_ensure_application(
        &self,
        conn: &mut TenantConnection,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        let step = StepName::CreateApplication;
        if conn.step_ledger.0.app_created {
            if conn.ttn_app_id.is_some() {
                self.skip(conn, step, steps).await?;
                return Ok(());
            }
            self.repair(conn, step, |l| l.app_created = false).await?;
        }
        self.enter(conn, step).await?;

        let tenant_id = conn.tenant_id;
        let admin = self.settings.admin_api_key.clone();
        let org_id = require(step, conn.ttn_org_id.clone(), "organization id")?;

        for attempt in conn.step_ledger.0.app_id_rotations..self.settings.max_id_rotations {
            let started = Instant::now();
            let candidate = conn
                .ttn_app_id
                .clone()
                .unwrap_or_else(|| naming::app_id(tenant_id, attempt));
            self.record(conn, step, AttemptOutcome::Started, attempt as i32 + 1, None)
                .await?;

            let app = Application::new(&candidate, "FrostGuard cold chain telemetry");
            let created = self.ttn.create_application(&admin, &org_id, &app).await;
            match created {
                Ok(_) => {}
                Err(TtnError::Conflict { .. }) => {
                    // Exists. Ours, or someone else's?
                    match self.ttn.get_application(&admin, &candidate).await {
                        Ok(_) => {
                            info!(tenant_id = %tenant_id, app_id = %candidate, "application already ours");
                        }
                        Err(err)
                            if matches!(
                                err,
                                TtnError::NotFound { .. } | TtnError::Forbidden { .. }
                            ) =>
                        {
                            warn!(
                                tenant_id = %tenant_id,
                                app_id = %candidate,
                                attempt,
                                "application id collision, rotating"
                            );
                            self.record(
                                conn,
                                step,
                                AttemptOutcome::Failed,
                                attempt as i32 + 1,
                                Some(LogDetail {
                                    http_status: err.status(),
                                    correlation_id: err.correlation_id().map(str::to_string),
                                    message: Some(format!("id collision on {candidate}")),
                                    endpoint: Some(err.resource().to_string()),
                                    body_excerpt: err.detail().map(|d| d.body_excerpt.clone()),
                                    duration_ms: Some(elapsed_ms(started)),
                                    ..LogDetail::default()
                                }),
                            )
                            .await?;
                            let ledger = &mut conn.step_ledger.0;
                            ledger.app_id_rotations = attempt + 1;
                            ledger.rotated_app_ids.push(candidate);
                            ledger.clear_application_dependents();
                            conn.ttn_app_id = None;
                            conn.app_key = None;
                            conn.webhook_id = None;
                            conn.webhook_secret = None;
                            self.connections.save(conn).await?;
                            continue;
                        }
                        Err(err) => {
                            let failure = ProvisionError::from_ttn(
                                step,
                                &RightsTarget::Application(candidate),
                                err,
                            );
                            self.fail_log(conn, step, attempt as i32 + 1, started, &failure)
                                .await?;
                            return Err(failure);
                        }
                    }
                }
                Err(err) => {
                    let failure = ProvisionError::from_ttn(
                        step,
                        &RightsTarget::Application(candidate),
                        err,
                    );
                    self.fail_log(conn, step, attempt as i32 + 1, started, &failure)
                        .await?;
                    return Err(failure);
                }
            }

            conn.ttn_app_id = Some(candidate);
            self.connections.save(conn).await?;
            conn.step_ledger.0.app_created = true;
            self.connections.save(conn).await?;

            self.record(
                conn,
                step,
                AttemptOutcome::Success,
                attempt as i32 + 1,
                timing(started),
            )
            .await?;
            steps.push(StepReport::new(step, AttemptOutcome::Success));
            return Ok(());
        }

        Err(ProvisionError::RotationExhausted {
            step,
            attempts: self.settings.max_id_rotations,
        })
    }

    /// Verify the admin credential can still read the application. The
    /// last step executed with the account-level credential; everything
    /// after runs on the organization key minted this run.
    async fn step_verify_rights(
        &self,
        conn: &mut TenantConnection,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        let step = StepName::VerifyApplicationRights;
        if conn.step_ledger.0.app_rights_verified {
            if conn.rights_status == RightsCheckStatus::Ok {
                self.skip(conn, step, steps).await?;
                return Ok(());
            }
            self.repair(conn, step, |l| l.app_rights_verified = false).await?;
        }
        self.enter(conn, step).await?;
        let started = Instant::now();
        self.record(conn, step, AttemptOutcome::Started, 1, None).await?;

        let app_id = require(step, conn.ttn_app_id.clone(), "application id")?;
        match self
            .ttn
            .get_application(&self.settings.admin_api_key, &app_id)
            .await
        {
            Ok(_) => {
                conn.rights_status = RightsCheckStatus::Ok;
                self.connections.save(conn).await?;
                conn.step_ledger.0.app_rights_verified = true;
                self.connections.save(conn).await?;
                self.record(conn, step, AttemptOutcome::Success, 1, timing(started)).await?;
                steps.push(StepReport::new(step, AttemptOutcome::Success));
                Ok(())
            }
            Err(err @ TtnError::Forbidden { .. }) => {
                conn.rights_status = RightsCheckStatus::Forbidden;
                self.connections.save(conn).await?;
                let failure =
                    ProvisionError::from_ttn(step, &RightsTarget::Application(app_id), err);
                self.fail_log(conn, step, 1, started, &failure).await?;
                Err(failure)
            }
            Err(err @ TtnError::NotFound { .. }) => {
                // External drift: the application vanished. Clear the
                // creation flag so the next run recreates it.
                conn.rights_status = RightsCheckStatus::NotFound;
                conn.step_ledger.0.app_created = false;
                self.connections.save(conn).await?;
                let failure =
                    ProvisionError::from_ttn(step, &RightsTarget::Application(app_id), err);
                self.fail_log(conn, step, 1, started, &failure).await?;
                Err(failure)
            }
            Err(err) => {
                let failure =
                    ProvisionError::from_ttn(step, &RightsTarget::Application(app_id), err);
                self.fail_log(conn, step, 1, started, &failure).await?;
                Err(failure)
            }
        }
    }

    /// Mint the application key with the organization key, not the
    /// account credential: TTN grants a freshly-minted org-scoped key
    /// collaborator rights the account credential may itself lack right
    /// after creation.
    async fn step_app_key(
        &self,
        conn: &mut TenantConnection,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        let step = StepName::CreateAppKey;
        if conn.step_ledger.0.app_api_key_created {
            if conn.app_key.is_some() {
                self.skip(conn, step, steps).await?;
                return Ok(());
            }
            self.repair(conn, step, |l| l.app_api_key_created = false).await?;
        }
        self.enter(conn, step).await?;
        let started = Instant::now();
        self.record(conn, step, AttemptOutcome::Started, 1, None).await?;

        let app_id = require(step, conn.ttn_app_id.clone(), "application id")?;
        let token = self.org_token(conn, step)?;
        let request = ApiKeyRequest::new(naming::APP_KEY_NAME, APP_KEY_RIGHTS);
        let key = match self.ttn.create_application_api_key(&token, &app_id, &request).await {
            Ok(key) => key,
            Err(err) => return Err(self.app_failure(conn, step, app_id, err, started).await?),
        };
        let secret = key.key.ok_or(ProvisionError::Internal {
            step,
            message: "key material missing from creation response".to_string(),
        })?;

        conn.app_key = Some(Json(self.seal_slot(conn.tenant_id, Some(key.id), &secret)?));
        self.connections.save(conn).await?;
        conn.step_ledger.0.app_api_key_created = true;
        self.connections.save(conn).await?;

        self.record(conn, step, AttemptOutcome::Success, 1, timing(started)).await?;
        steps.push(StepReport::new(step, AttemptOutcome::Success));
        Ok(())
    }

    /// Optionally mint an organization key capable of gateway
    /// registration, used later by the gateway provisioner.
    async fn step_gateway_key(
        &self,
        conn: &mut TenantConnection,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        let step = StepName::CreateGatewayKey;
        if !self.settings.mint_gateway_key {
            steps.push(StepReport::with_message(
                step,
                AttemptOutcome::Skipped,
                "gateway key minting disabled",
            ));
            return Ok(());
        }
        if conn.step_ledger.0.gateway_api_key_created {
            if conn.gateway_key.is_some() {
                self.skip(conn, step, steps).await?;
                return Ok(());
            }
            self.repair(conn, step, |l| l.gateway_api_key_created = false).await?;
        }
        self.enter(conn, step).await?;
        let started = Instant::now();
        self.record(conn, step, AttemptOutcome::Started, 1, None).await?;

        let org_id = require(step, conn.ttn_org_id.clone(), "organization id")?;
        let token = self.org_token(conn, step)?;
        let request = ApiKeyRequest::new(
            naming::GATEWAY_KEY_NAME,
            &[rights::RIGHT_ORGANIZATION_GATEWAYS_CREATE],
        );
        let key = self
            .ttn
            .create_organization_api_key(&token, &org_id, &request)
            .await
            .map_err(|e| {
                ProvisionError::from_ttn(step, &RightsTarget::Organization(org_id.clone()), e)
            })?;
        let secret = key.key.ok_or(ProvisionError::Internal {
            step,
            message: "key material missing from creation response".to_string(),
        })?;

        conn.gateway_key = Some(Json(self.seal_slot(conn.tenant_id, Some(key.id), &secret)?));
        self.connections.save(conn).await?;
        conn.step_ledger.0.gateway_api_key_created = true;
        self.connections.save(conn).await?;

        self.record(conn, step, AttemptOutcome::Success, 1, timing(started)).await?;
        steps.push(StepReport::new(step, AttemptOutcome::Success));
        Ok(())
    }

    async fn step_webhook(
        &self,
        conn: &mut TenantConnection,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        let step = StepName::CreateWebhook;
        if conn.step_ledger.0.webhook_created {
            if conn.webhook_id.is_some() && conn.webhook_secret.is_some() {
                self.skip(conn, step, steps).await?;
                return Ok(());
            }
            self.repair(conn, step, |l| l.webhook_created = false).await?;
        }
        self.enter(conn, step).await?;
        let started = Instant::now();
        self.record(conn, step, AttemptOutcome::Started, 1, None).await?;

        let app_id = require(step, conn.ttn_app_id.clone(), "application id")?;
        let token = self.org_token(conn, step)?;

        let secret = random_secret();
        let webhook = self.webhook_payload(conn.tenant_id, &app_id, &secret);
        if let Err(err) = self.ttn.set_webhook(&token, &app_id, &webhook).await {
            return Err(self.app_failure(conn, step, app_id, err, started).await?);
        }

        conn.webhook_id = Some(naming::WEBHOOK_ID.to_string());
        conn.webhook_secret = Some(Json(self.seal_slot(conn.tenant_id, None, &secret)?));
        self.connections.save(conn).await?;
        conn.step_ledger.0.webhook_created = true;
        self.connections.save(conn).await?;

        self.record(conn, step, AttemptOutcome::Success, 1, timing(started)).await?;
        steps.push(StepReport::new(step, AttemptOutcome::Success));
        Ok(())
    }

    /// Confirm every artifact is in place and close out the run. No
    /// remote calls.
    async fn step_finalize(
        &self,
        conn: &mut TenantConnection,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        let step = StepName::Finalize;
        if conn.step_ledger.0.finalized {
            self.skip(conn, step, steps).await?;
            return Ok(());
        }
        self.enter(conn, step).await?;
        let started = Instant::now();

        for (present, what) in [
            (conn.ttn_org_id.is_some(), "organization id"),
            (conn.ttn_app_id.is_some(), "application id"),
            (conn.org_key.is_some(), "organization key"),
            (conn.app_key.is_some(), "application key"),
            (conn.webhook_id.is_some(), "webhook id"),
            (conn.webhook_secret.is_some(), "webhook secret"),
        ] {
            if !present {
                return Err(ProvisionError::Internal {
                    step,
                    message: format!("{what} missing at finalize"),
                });
            }
        }

        conn.step_ledger.0.finalized = true;
        self.connections.save(conn).await?;
        self.record(conn, step, AttemptOutcome::Success, 1, timing(started)).await?;
        steps.push(StepReport::new(step, AttemptOutcome::Success));
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn load_or_create(
        &self,
        tenant_id: Uuid,
        region: Option<Region>,
    ) -> ProvisionResult<TenantConnection> {
        if let Some(conn) = self.connections.find_by_tenant(tenant_id).await? {
            return Ok(conn);
        }
        let region = region.unwrap_or(self.settings.default_region);
        let conn = self
            .connections
            .create(NewTenantConnection {
                tenant_id,
                region: region.to_string(),
            })
            .await?;
        info!(tenant_id = %tenant_id, region = %region, "created tenant connection");
        Ok(conn)
    }

    async fn load_required(&self, tenant_id: Uuid) -> ProvisionResult<TenantConnection> {
        self.connections
            .find_by_tenant(tenant_id)
            .await?
            .ok_or_else(|| ProvisionError::InvalidState {
                message: format!("no connection exists for tenant {tenant_id}"),
                use_start_fresh: false,
            })
    }

    async fn enter(&self, conn: &mut TenantConnection, step: StepName) -> ProvisionResult<()> {
        conn.current_step = Some(step.to_string());
        self.connections.save(conn).await?;
        Ok(())
    }

    async fn skip(
        &self,
        conn: &TenantConnection,
        step: StepName,
        steps: &mut Vec<StepReport>,
    ) -> ProvisionResult<()> {
        self.record(conn, step, AttemptOutcome::Skipped, 1, None).await?;
        steps.push(StepReport::new(step, AttemptOutcome::Skipped));
        Ok(())
    }

    /// Ledger said done but the artifact is gone: clear the flag and
    /// re-execute, leaving a trace in the log.
    async fn repair(
        &self,
        conn: &mut TenantConnection,
        step: StepName,
        clear: impl FnOnce(&mut frostguard_db::models::StepLedger),
    ) -> ProvisionResult<()> {
        warn!(
            tenant_id = %conn.tenant_id,
            step = %step,
            "ledger marked complete but artifact missing, re-executing"
        );
        clear(&mut conn.step_ledger.0);
        self.connections.save(conn).await?;
        self.record(
            conn,
            step,
            AttemptOutcome::Started,
            1,
            Some(LogDetail {
                message: Some("consistency repair: artifact missing, flag cleared".to_string()),
                ..LogDetail::default()
            }),
        )
        .await?;
        Ok(())
    }

    async fn record(
        &self,
        conn: &TenantConnection,
        step: StepName,
        outcome: AttemptOutcome,
        attempt: i32,
        detail: Option<LogDetail>,
    ) -> ProvisionResult<()> {
        self.log
            .append(NewLogEntry {
                tenant_id: conn.tenant_id,
                connection_id: conn.id,
                step: step.to_string(),
                outcome,
                attempt,
                detail,
            })
            .await?;
        Ok(())
    }

    /// Failed-attempt log entry carrying the classified failure: status,
    /// category, targeted resource, remote body excerpt and timing.
    async fn fail_log(
        &self,
        conn: &TenantConnection,
        step: StepName,
        attempt: i32,
        started: Instant,
        failure: &ProvisionError,
    ) -> ProvisionResult<()> {
        let detail = failure.detail();
        self.record(
            conn,
            step,
            AttemptOutcome::Failed,
            attempt,
            Some(LogDetail {
                http_status: detail.map(|d| d.status),
                correlation_id: detail.and_then(|d| d.correlation_id.clone()),
                message: Some(failure.to_string()),
                endpoint: failure.endpoint(),
                body_excerpt: detail.map(|d| d.body_excerpt.clone()),
                category: Some(failure.category().to_string()),
                duration_ms: Some(elapsed_ms(started)),
            }),
        )
        .await
    }

    /// Classify a failure on an application-scoped call. A 404 here is
    /// external drift: the application vanished after the ledger marked
    /// it created, so the creation flag is cleared and the next run
    /// recreates it.
    async fn app_failure(
        &self,
        conn: &mut TenantConnection,
        step: StepName,
        app_id: String,
        err: TtnError,
        started: Instant,
    ) -> ProvisionResult<ProvisionError> {
        if matches!(err, TtnError::NotFound { .. }) {
            conn.step_ledger.0.app_created = false;
            conn.step_ledger.0.app_rights_verified = false;
            conn.rights_status = RightsCheckStatus::NotFound;
            self.connections.save(conn).await?;
        }
        let failure = ProvisionError::from_ttn(step, &RightsTarget::Application(app_id), err);
        self.fail_log(conn, step, 1, started, &failure).await?;
        Ok(failure)
    }

    fn org_token(&self, conn: &TenantConnection, step: StepName) -> ProvisionResult<String> {
        let slot = conn
            .org_key
            .as_deref()
            .ok_or(ProvisionError::Internal {
                step,
                message: "organization key missing for delegated call".to_string(),
            })?;
        self.open_slot(conn.tenant_id, slot)
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

    fn webhook_payload(&self, tenant_id: Uuid, app_id: &str, secret: &str) -> Webhook {
        let mut headers = std::collections::BTreeMap::new();
        headers.insert(naming::WEBHOOK_SECRET_HEADER.to_string(), secret.to_string());
        Webhook {
            ids: WebhookIds {
                webhook_id: naming::WEBHOOK_ID.to_string(),
                application_ids: Some(frostguard_ttn::types::ApplicationIds::new(app_id)),
            },
            base_url: naming::webhook_url(&self.settings.webhook_base_url, tenant_id),
            format: "json".to_string(),
            headers,
            uplink_message: Some(WebhookMessagePath {
                path: Some(String::new()),
            }),
            join_accept: Some(WebhookMessagePath {
                path: Some(String::new()),
            }),
        }
    }

    fn outcome_from(&self, conn: &TenantConnection, steps: Vec<StepReport>) -> ProvisionOutcome {
        ProvisionOutcome {
            status: conn.status,
            ttn_org_id: conn.ttn_org_id.clone(),
            ttn_app_id: conn.ttn_app_id.clone(),
            webhook_id: conn.webhook_id.clone(),
            webhook_url: conn
                .webhook_id
                .as_ref()
                .map(|_| naming::webhook_url(&self.settings.webhook_base_url, conn.tenant_id)),
            steps,
            org_id_rotations: conn.step_ledger.0.org_id_rotations,
            app_id_rotations: conn.step_ledger.0.app_id_rotations,
        }
    }
}

fn require<T>(step: StepName, value: Option<T>, what: &str) -> ProvisionResult<T> {
    value.ok_or_else(|| ProvisionError::Internal {
        step,
        message: format!("{what} missing from connection record"),
    })
}

/// Success detail: how long the attempt took.
fn timing(started: Instant) -> Option<LogDetail> {
    Some(LogDetail {
        duration_ms: Some(elapsed_ms(started)),
        ..LogDetail::default()
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// 32 random bytes, hex-encoded. Used for webhook signing secrets.
fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
