//! Postgres persistence for the FrostGuard control plane.
//!
//! Holds the tenant connection record (status, step ledger, sealed
//! credentials), the per-step provisioning log, and the device and
//! gateway registries. Models follow the one-file-per-table convention
//! with query methods on the model type; the [`store`] module wraps them
//! in trait objects so the provisioners stay testable without a
//! database.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod store;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;
pub use store::{ConnectionStore, DeviceStore, GatewayStore, PgStore, ProvisioningLogStore};
