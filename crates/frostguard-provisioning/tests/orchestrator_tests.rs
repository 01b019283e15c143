mod common;

use std::sync::Arc;

use uuid::Uuid;

use common::{settings, vault, MemStore, MockTtn, ADMIN_TOKEN};
use frostguard_db::models::{AttemptOutcome, ConnectionStatus, RightsCheckStatus};
use frostguard_provisioning::{naming, ConnectionOrchestrator, ProvisionError};

fn orchestrator(ttn: &Arc<MockTtn>, store: &Arc<MemStore>) -> ConnectionOrchestrator {
    ConnectionOrchestrator::new(
        ttn.clone(),
        store.clone(),
        store.clone(),
        vault(),
        settings(),
    )
}

fn connection_of(store: &MemStore, tenant: Uuid) -> frostguard_db::models::TenantConnection {
    store
        .connections
        .lock()
        .unwrap()
        .get(&tenant)
        .cloned()
        .expect("connection row")
}

#[tokio::test]
async fn test_happy_path_provisions_org_app_keys_and_webhook() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    let outcome = orch.provision(tenant, None).await.unwrap();

    assert_eq!(outcome.status, ConnectionStatus::Ready);
    let org_id = outcome.ttn_org_id.clone().unwrap();
    let app_id = outcome.ttn_app_id.clone().unwrap();
    assert_eq!(org_id, naming::org_id(tenant, 0));
    assert_eq!(app_id, naming::app_id(tenant, 0));
    assert_eq!(outcome.webhook_id.as_deref(), Some("frostguard-ingest"));
    assert_eq!(
        outcome.webhook_url.as_deref(),
        Some(format!("https://ingest.frostguard.example/ttn/{tenant}").as_str())
    );

    let state = ttn.state.lock().unwrap();
    assert!(state.orgs.contains(&org_id));
    assert!(state.apps.contains(&app_id));
    let webhook = state
        .webhooks
        .get(&format!("{app_id}:frostguard-ingest"))
        .expect("webhook registered");
    assert_eq!(webhook.format, "json");
    assert!(webhook.headers.contains_key("x-frostguard-secret"));
    drop(state);

    let conn = connection_of(&store, tenant);
    assert!(conn.step_ledger.0.is_complete());
    assert_eq!(conn.rights_status, RightsCheckStatus::Ok);
    assert!(conn.org_key.is_some());
    assert!(conn.app_key.is_some());
    assert!(conn.gateway_key.is_some());
    assert!(conn.webhook_secret.is_some());
    assert!(conn.current_step.is_none());
}

#[tokio::test]
async fn test_sequence_switches_from_admin_key_to_org_key_after_rights_check() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    orch.provision(tenant, None).await.unwrap();

    // Everything through rights verification runs on the account key.
    assert_eq!(ttn.tokens_for("create_organization"), vec![ADMIN_TOKEN]);
    assert_eq!(ttn.tokens_for("create_application"), vec![ADMIN_TOKEN]);
    assert_eq!(ttn.tokens_for("get_application"), vec![ADMIN_TOKEN]);

    // The org key (first key minted) takes over for everything after.
    let org_key_mints = ttn.tokens_for("create_organization_api_key");
    assert_eq!(org_key_mints[0], ADMIN_TOKEN); // the org key itself
    assert_eq!(org_key_mints[1], "NNSXS.KEY-1"); // the gateway key
    assert_eq!(ttn.tokens_for("create_application_api_key"), vec!["NNSXS.KEY-1"]);
    assert_eq!(ttn.tokens_for("set_webhook"), vec!["NNSXS.KEY-1"]);
}

#[tokio::test]
async fn test_ready_connection_serves_cached_ids_with_zero_remote_calls() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    let first = orch.provision(tenant, None).await.unwrap();
    let calls_after_first = ttn.total_calls();

    let second = orch.provision(tenant, None).await.unwrap();
    assert_eq!(ttn.total_calls(), calls_after_first);
    assert_eq!(second.ttn_org_id, first.ttn_org_id);
    assert_eq!(second.ttn_app_id, first.ttn_app_id);
    assert!(second.steps.is_empty());
}

#[tokio::test]
async fn test_resume_after_transient_failure_skips_completed_steps() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    ttn.fail_next("set_webhook", 503);
    let err = orch.provision(tenant, None).await.unwrap_err();
    assert!(err.retryable());

    let conn = connection_of(&store, tenant);
    assert_eq!(conn.status, ConnectionStatus::Failed);
    assert_eq!(conn.current_step.as_deref(), Some("create_webhook"));
    let snapshot = conn.last_error.as_deref().cloned().unwrap();
    assert_eq!(snapshot.step.as_deref(), Some("create_webhook"));
    assert_eq!(snapshot.http_status, Some(503));

    let outcome = orch.provision(tenant, None).await.unwrap();
    assert_eq!(outcome.status, ConnectionStatus::Ready);

    // Completed steps were not re-executed on resume.
    assert_eq!(ttn.calls("create_organization"), 1);
    assert_eq!(ttn.calls("create_application"), 1);
    assert_eq!(ttn.calls("create_organization_api_key"), 2);
    assert_eq!(ttn.calls("create_application_api_key"), 1);
    assert_eq!(ttn.calls("set_webhook"), 2);
}

#[tokio::test]
async fn test_org_id_rotation_stops_after_three_attempts() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    {
        let mut state = ttn.state.lock().unwrap();
        for attempt in 0..3 {
            state.foreign_orgs.insert(naming::org_id(tenant, attempt));
        }
    }

    let err = orch.provision(tenant, None).await.unwrap_err();
    match &err {
        ProvisionError::RotationExhausted { attempts, .. } => assert_eq!(*attempts, 3),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(err.use_start_fresh());
    assert_eq!(ttn.calls("create_organization"), 3);
    assert_eq!(ttn.calls("get_organization"), 3);

    let conn = connection_of(&store, tenant);
    assert_eq!(conn.status, ConnectionStatus::Failed);
    assert_eq!(conn.step_ledger.0.org_id_rotations, 3);
    assert_eq!(conn.step_ledger.0.rotated_org_ids.len(), 3);

    // The budget is spent; another attempt burns no further rotations.
    let err = orch.retry(tenant).await.unwrap_err();
    assert!(matches!(err, ProvisionError::RotationExhausted { .. }));
    assert_eq!(ttn.calls("create_organization"), 3);
}

#[tokio::test]
async fn test_forbidden_rights_block_retry_and_start_fresh_rotates_the_app() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();
    let first_app = naming::app_id(tenant, 0);

    ttn.fail_next("get_application", 403);
    let err = orch.provision(tenant, None).await.unwrap_err();
    assert!(matches!(err, ProvisionError::NoApplicationRights { .. }));
    assert!(err.use_start_fresh());
    assert_eq!(
        connection_of(&store, tenant).rights_status,
        RightsCheckStatus::Forbidden
    );

    // Retrying the same identifiers cannot help.
    let err = orch.retry(tenant).await.unwrap_err();
    match err {
        ProvisionError::InvalidState { use_start_fresh, .. } => assert!(use_start_fresh),
        other => panic!("unexpected: {other:?}"),
    }

    // The application really does belong to another account now.
    {
        let mut state = ttn.state.lock().unwrap();
        state.apps.remove(&first_app);
        state.foreign_apps.insert(first_app.clone());
    }

    let outcome = orch.start_fresh(tenant).await.unwrap();
    assert_eq!(outcome.status, ConnectionStatus::Ready);
    let new_app = outcome.ttn_app_id.unwrap();
    assert_ne!(new_app, first_app);
    assert_eq!(outcome.app_id_rotations, 1);

    let conn = connection_of(&store, tenant);
    assert!(conn.step_ledger.0.rotated_app_ids.contains(&first_app));
    assert_eq!(conn.rights_status, RightsCheckStatus::Ok);
}

#[tokio::test]
async fn test_vanished_application_reports_drift_then_self_heals() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();
    let app_id = naming::app_id(tenant, 0);

    ttn.fail_next("create_application_api_key", 503);
    let err = orch.provision(tenant, None).await.unwrap_err();
    assert!(err.retryable());

    // Someone deletes the application in the TTN console.
    ttn.state.lock().unwrap().apps.remove(&app_id);

    let err = orch.retry(tenant).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Drift { .. }));
    assert!(!connection_of(&store, tenant).step_ledger.0.app_created);

    // The cleared flag makes the next run recreate the same id.
    let outcome = orch.retry(tenant).await.unwrap();
    assert_eq!(outcome.status, ConnectionStatus::Ready);
    assert_eq!(outcome.ttn_app_id.as_deref(), Some(app_id.as_str()));
    assert!(ttn.state.lock().unwrap().apps.contains(&app_id));
}

#[tokio::test]
async fn test_status_reports_fingerprints_never_key_material() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    orch.provision(tenant, None).await.unwrap();
    let report = orch.status(tenant).await.unwrap();

    assert_eq!(report.status, ConnectionStatus::Ready);
    assert!(report.org_key.present);
    assert!(report.app_key.present);
    assert!(report.webhook_secret.present);
    assert_eq!(report.org_key.fingerprint.as_deref().map(str::len), Some(4));

    let rendered = serde_json::to_string(&report).unwrap();
    assert!(!rendered.contains("NNSXS."));
    let conn = connection_of(&store, tenant);
    let ciphertext = conn.org_key.as_deref().unwrap().ciphertext.clone();
    assert!(!rendered.contains(&ciphertext));
}

#[tokio::test]
async fn test_step_log_records_started_and_success() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    orch.provision(tenant, None).await.unwrap();

    let entries = store.log_entries("create_organization");
    let outcomes: Vec<AttemptOutcome> = entries.iter().map(|e| e.outcome).collect();
    assert_eq!(outcomes, vec![AttemptOutcome::Started, AttemptOutcome::Success]);
    assert!(entries.iter().all(|e| e.attempt == 1));
}

#[tokio::test]
async fn test_failed_attempts_log_category_endpoint_and_timing() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    ttn.fail_next("get_application", 403);
    let _ = orch.provision(tenant, None).await.unwrap_err();

    let entries = store.log_entries("verify_application_rights");
    let failed = entries
        .iter()
        .find(|e| e.outcome == AttemptOutcome::Failed)
        .expect("failed entry");
    let detail = failed.detail.as_deref().cloned().expect("failure detail");
    assert_eq!(detail.http_status, Some(403));
    assert_eq!(detail.category.as_deref(), Some("no_application_rights"));
    assert_eq!(
        detail.endpoint.as_deref(),
        Some(format!("application {}", naming::app_id(tenant, 0)).as_str())
    );
    assert!(detail.body_excerpt.is_some());
    assert!(detail.duration_ms.is_some());

    // Successful attempts carry their timing too.
    let entries = store.log_entries("create_organization");
    let success = entries
        .iter()
        .find(|e| e.outcome == AttemptOutcome::Success)
        .expect("success entry");
    let detail = success.detail.as_deref().cloned().expect("success detail");
    assert!(detail.duration_ms.is_some());
    assert!(detail.category.is_none());
}

#[tokio::test]
async fn test_delete_tears_down_remote_resources_and_local_row() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    orch.provision(tenant, None).await.unwrap();
    orch.delete(tenant).await.unwrap();

    let state = ttn.state.lock().unwrap();
    assert!(state.orgs.is_empty());
    assert!(state.apps.is_empty());
    assert!(state.webhooks.is_empty());
    drop(state);

    assert!(store.connections.lock().unwrap().is_empty());
    let err = orch.status(tenant).await.unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidState { .. }));
}

#[tokio::test]
async fn test_regenerate_webhook_secret_replaces_the_sealed_secret() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    orch.provision(tenant, None).await.unwrap();
    let before = connection_of(&store, tenant)
        .webhook_secret
        .as_deref()
        .unwrap()
        .ciphertext
        .clone();

    let report = orch.regenerate_webhook_secret(tenant).await.unwrap();
    assert!(report.webhook_secret.present);

    let after = connection_of(&store, tenant)
        .webhook_secret
        .as_deref()
        .unwrap()
        .ciphertext
        .clone();
    assert_ne!(before, after);
    assert_eq!(ttn.calls("set_webhook"), 2);
}

#[tokio::test]
async fn test_regenerate_webhook_secret_requires_ready_connection() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let orch = orchestrator(&ttn, &store);
    let tenant = Uuid::new_v4();

    ttn.fail_next("create_organization", 503);
    let _ = orch.provision(tenant, None).await.unwrap_err();

    let err = orch.regenerate_webhook_secret(tenant).await.unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidState { .. }));
}
