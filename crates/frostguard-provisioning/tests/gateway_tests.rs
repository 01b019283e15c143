mod common;

use std::sync::Arc;

use uuid::Uuid;

use common::{settings, vault, MemStore, MockTtn, ADMIN_TOKEN};
use frostguard_core::GatewayEui;
use frostguard_db::models::{GatewayOwner, GatewayStatus};
use frostguard_provisioning::{
    naming, ConnectionOrchestrator, GatewayProvisioner, ProvisionError, ProvisioningSettings,
};

const GATEWAY_KEY_TOKEN: &str = "NNSXS.KEY-3";

fn provisioner(
    ttn: &Arc<MockTtn>,
    store: &Arc<MemStore>,
    settings: ProvisioningSettings,
) -> GatewayProvisioner {
    GatewayProvisioner::new(ttn.clone(), store.clone(), store.clone(), vault(), settings)
}

async fn ready_tenant(
    ttn: &Arc<MockTtn>,
    store: &Arc<MemStore>,
    settings: ProvisioningSettings,
) -> Uuid {
    let orch = ConnectionOrchestrator::new(
        ttn.clone(),
        store.clone(),
        store.clone(),
        vault(),
        settings,
    );
    let tenant = Uuid::new_v4();
    orch.provision(tenant, None).await.unwrap();
    tenant
}

fn gateway_eui() -> GatewayEui {
    GatewayEui::parse("AA555A0000000101").unwrap()
}

#[tokio::test]
async fn test_gateway_registers_under_the_org_with_the_gateway_key() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let tenant = ready_tenant(&ttn, &store, settings()).await;
    let gateways = provisioner(&ttn, &store, settings());

    let report = gateways
        .create(tenant, &gateway_eui(), Some("warehouse roof"), None)
        .await
        .unwrap();

    let gateway_id = naming::gateway_id(gateway_eui().as_str());
    assert_eq!(report.ttn_gateway_id, gateway_id);
    assert_eq!(report.strategy, "organization_key");
    assert_eq!(report.owner, GatewayOwner::Organization);
    assert_eq!(report.status, GatewayStatus::Pending);
    assert!(report.lns_key.present);

    assert!(ttn.state.lock().unwrap().gateways.contains(&gateway_id));
    assert_eq!(ttn.tokens_for("register_gateway_for_org"), vec![GATEWAY_KEY_TOKEN]);
    assert_eq!(ttn.calls("register_gateway_for_user"), 0);
    assert_eq!(ttn.tokens_for("create_gateway_api_key"), vec![GATEWAY_KEY_TOKEN]);

    let row = store
        .gateways
        .lock()
        .unwrap()
        .get(&(tenant, gateway_eui().as_str().to_string()))
        .cloned()
        .unwrap();
    assert_eq!(row.owner, Some(GatewayOwner::Organization));
    assert!(row.lns_key.is_some());
}

#[tokio::test]
async fn test_rerunning_create_refreshes_the_registration_in_place() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let tenant = ready_tenant(&ttn, &store, settings()).await;
    let gateways = provisioner(&ttn, &store, settings());

    gateways.create(tenant, &gateway_eui(), None, None).await.unwrap();
    let report = gateways
        .create(tenant, &gateway_eui(), Some("moved to the north wall"), None)
        .await
        .unwrap();

    assert_eq!(report.strategy, "organization_key");
    assert!(report.lns_key.present);

    // One registration, one field-masked refresh, and the sealed LNS
    // key is kept rather than re-minted.
    assert_eq!(ttn.calls("register_gateway_for_org"), 1);
    assert_eq!(ttn.calls("update_gateway"), 1);
    assert_eq!(ttn.calls("create_gateway_api_key"), 1);
}

#[tokio::test]
async fn test_forbidden_org_registration_falls_back_to_the_admin_user() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let tenant = ready_tenant(&ttn, &store, settings()).await;
    let gateways = provisioner(&ttn, &store, settings());

    ttn.state
        .lock()
        .unwrap()
        .forbid_org_gateway_tokens
        .insert(GATEWAY_KEY_TOKEN.to_string());

    let report = gateways
        .create(tenant, &gateway_eui(), None, None)
        .await
        .unwrap();

    assert_eq!(report.strategy, "admin_user");
    assert_eq!(report.owner, GatewayOwner::User);
    assert_eq!(ttn.tokens_for("register_gateway_for_user"), vec![ADMIN_TOKEN]);
    // The LNS key is minted with the credential that won.
    assert_eq!(ttn.tokens_for("create_gateway_api_key"), vec![ADMIN_TOKEN]);
}

#[tokio::test]
async fn test_missing_gateway_key_skips_straight_to_the_admin_user() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let no_gateway_key = settings().with_gateway_key(false);
    let tenant = ready_tenant(&ttn, &store, no_gateway_key.clone()).await;
    let gateways = provisioner(&ttn, &store, no_gateway_key);

    let report = gateways
        .create(tenant, &gateway_eui(), None, None)
        .await
        .unwrap();

    assert_eq!(report.strategy, "admin_user");
    assert_eq!(ttn.calls("register_gateway_for_org"), 0);
}

#[tokio::test]
async fn test_claimed_gateway_eui_is_terminal() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let tenant = ready_tenant(&ttn, &store, settings()).await;
    let gateways = provisioner(&ttn, &store, settings());

    ttn.state
        .lock()
        .unwrap()
        .foreign_gateway_euis
        .insert(gateway_eui().as_str().to_string());

    let err = gateways
        .create(tenant, &gateway_eui(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::OwnershipConflict { .. }));
    assert!(err.use_start_fresh());

    // A hardware EUI conflict is never retried on another rung.
    assert_eq!(ttn.calls("register_gateway_for_org"), 1);
    assert_eq!(ttn.calls("register_gateway_for_user"), 0);
}

#[tokio::test]
async fn test_refresh_status_treats_stats_404_as_registered_not_connected() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let tenant = ready_tenant(&ttn, &store, settings()).await;
    let gateways = provisioner(&ttn, &store, settings());

    gateways.create(tenant, &gateway_eui(), None, None).await.unwrap();
    let gateway_id = naming::gateway_id(gateway_eui().as_str());

    let status = gateways.refresh_status(tenant, &gateway_eui()).await.unwrap();
    assert_eq!(status, GatewayStatus::Pending);

    ttn.state.lock().unwrap().connected_gateways.insert(gateway_id);
    let status = gateways.refresh_status(tenant, &gateway_eui()).await.unwrap();
    assert_eq!(status, GatewayStatus::Online);

    let row = store
        .gateways
        .lock()
        .unwrap()
        .get(&(tenant, gateway_eui().as_str().to_string()))
        .cloned()
        .unwrap();
    assert!(row.last_seen_at.is_some());
}

#[tokio::test]
async fn test_delete_purges_and_verifies_the_eui_is_released() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let tenant = ready_tenant(&ttn, &store, settings()).await;
    let gateways = provisioner(&ttn, &store, settings());

    gateways.create(tenant, &gateway_eui(), None, None).await.unwrap();
    gateways.delete(tenant, &gateway_eui()).await.unwrap();

    assert!(ttn.state.lock().unwrap().gateways.is_empty());
    assert_eq!(ttn.calls("purge_gateway"), 1);

    let row = store
        .gateways
        .lock()
        .unwrap()
        .get(&(tenant, gateway_eui().as_str().to_string()))
        .cloned()
        .unwrap();
    assert!(row.ttn_gateway_id.is_none());
    assert!(row.lns_key.is_none());
    assert!(row.owner.is_none());
}

#[tokio::test]
async fn test_location_is_persisted_on_the_local_row() {
    let ttn = MockTtn::new();
    let store = MemStore::new();
    let tenant = ready_tenant(&ttn, &store, settings()).await;
    let gateways = provisioner(&ttn, &store, settings());

    gateways
        .create(tenant, &gateway_eui(), None, Some((37.77, -122.42, Some(12.0))))
        .await
        .unwrap();

    let row = store
        .gateways
        .lock()
        .unwrap()
        .get(&(tenant, gateway_eui().as_str().to_string()))
        .cloned()
        .unwrap();
    assert_eq!(row.latitude, Some(37.77));
    assert_eq!(row.longitude, Some(-122.42));
    assert_eq!(row.altitude, Some(12.0));
}
