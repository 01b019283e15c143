//! Store traits over the models.
//!
//! The provisioners hold `Arc<dyn ...Store>` so orchestration tests run
//! against in-memory implementations. [`PgStore`] is the production
//! implementation, delegating to the model query methods.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{
    Device, Gateway, NewDevice, NewGateway, NewLogEntry, NewTenantConnection,
    ProvisioningLogEntry, TenantConnection,
};
use crate::pool::DbPool;

/// Persistence for tenant connection rows.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn find_by_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantConnection>, DbError>;

    async fn create(&self, new: NewTenantConnection) -> Result<TenantConnection, DbError>;

    /// Persist the row as-is. The orchestrator calls this once per
    /// artifact write and once per ledger mark, in that order.
    async fn save(&self, connection: &TenantConnection) -> Result<(), DbError>;

    /// Hard-delete the row. Only the explicit delete action uses this.
    async fn delete(&self, tenant_id: Uuid) -> Result<(), DbError>;
}

/// Persistence for the device registry.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn find_by_eui(&self, tenant_id: Uuid, dev_eui: &str)
        -> Result<Option<Device>, DbError>;

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<Device>, DbError>;

    async fn create(&self, new: NewDevice) -> Result<Device, DbError>;

    async fn save(&self, device: &Device) -> Result<(), DbError>;

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError>;
}

/// Persistence for the gateway registry.
#[async_trait]
pub trait GatewayStore: Send + Sync {
    async fn find_by_eui(
        &self,
        tenant_id: Uuid,
        gateway_eui: &str,
    ) -> Result<Option<Gateway>, DbError>;

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<Gateway>, DbError>;

    async fn create(&self, new: NewGateway) -> Result<Gateway, DbError>;

    async fn save(&self, gateway: &Gateway) -> Result<(), DbError>;

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError>;
}

/// Append-only provisioning log.
#[async_trait]
pub trait ProvisioningLogStore: Send + Sync {
    async fn append(&self, entry: NewLogEntry) -> Result<ProvisioningLogEntry, DbError>;

    async fn recent(
        &self,
        connection_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ProvisioningLogEntry>, DbError>;
}

/// Postgres-backed implementation of every store trait.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionStore for PgStore {
    async fn find_by_tenant(&self, tenant_id: Uuid) -> Result<Option<TenantConnection>, DbError> {
        TenantConnection::find_by_tenant(self.pool.inner(), tenant_id)
            .await
            .map_err(DbError::from)
    }

    async fn create(&self, new: NewTenantConnection) -> Result<TenantConnection, DbError> {
        TenantConnection::insert(self.pool.inner(), &new)
            .await
            .map_err(DbError::from)
    }

    async fn save(&self, connection: &TenantConnection) -> Result<(), DbError> {
        connection.save(self.pool.inner()).await.map_err(DbError::from)
    }

    async fn delete(&self, tenant_id: Uuid) -> Result<(), DbError> {
        TenantConnection::delete_by_tenant(self.pool.inner(), tenant_id)
            .await
            .map_err(DbError::from)
    }
}

#[async_trait]
impl DeviceStore for PgStore {
    async fn find_by_eui(
        &self,
        tenant_id: Uuid,
        dev_eui: &str,
    ) -> Result<Option<Device>, DbError> {
        Device::find_by_eui(self.pool.inner(), tenant_id, dev_eui)
            .await
            .map_err(DbError::from)
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<Device>, DbError> {
        Device::list_by_tenant(self.pool.inner(), tenant_id)
            .await
            .map_err(DbError::from)
    }

    async fn create(&self, new: NewDevice) -> Result<Device, DbError> {
        Device::insert(self.pool.inner(), &new)
            .await
            .map_err(DbError::from)
    }

    async fn save(&self, device: &Device) -> Result<(), DbError> {
        device.save(self.pool.inner()).await.map_err(DbError::from)
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
        Device::delete(self.pool.inner(), tenant_id, id)
            .await
            .map_err(DbError::from)
    }
}

#[async_trait]
impl GatewayStore for PgStore {
    async fn find_by_eui(
        &self,
        tenant_id: Uuid,
        gateway_eui: &str,
    ) -> Result<Option<Gateway>, DbError> {
        Gateway::find_by_eui(self.pool.inner(), tenant_id, gateway_eui)
            .await
            .map_err(DbError::from)
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<Gateway>, DbError> {
        Gateway::list_by_tenant(self.pool.inner(), tenant_id)
            .await
            .map_err(DbError::from)
    }

    async fn create(&self, new: NewGateway) -> Result<Gateway, DbError> {
        Gateway::insert(self.pool.inner(), &new)
            .await
            .map_err(DbError::from)
    }

    async fn save(&self, gateway: &Gateway) -> Result<(), DbError> {
        gateway.save(self.pool.inner()).await.map_err(DbError::from)
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> Result<(), DbError> {
        Gateway::delete(self.pool.inner(), tenant_id, id)
            .await
            .map_err(DbError::from)
    }
}

#[async_trait]
impl ProvisioningLogStore for PgStore {
    async fn append(&self, entry: NewLogEntry) -> Result<ProvisioningLogEntry, DbError> {
        ProvisioningLogEntry::insert(self.pool.inner(), &entry)
            .await
            .map_err(DbError::from)
    }

    async fn recent(
        &self,
        connection_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ProvisioningLogEntry>, DbError> {
        ProvisioningLogEntry::list_for_connection(self.pool.inner(), connection_id, limit)
            .await
            .map_err(DbError::from)
    }
}
