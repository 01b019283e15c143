//! Database models for the control plane.

pub mod device;
pub mod gateway;
pub mod provisioning_log;
pub mod tenant_connection;

pub use device::{Device, DeviceProvisioningState, DeviceStatus, NewDevice};
pub use gateway::{Gateway, GatewayOwner, GatewayStatus, NewGateway};
pub use provisioning_log::{AttemptOutcome, LogDetail, NewLogEntry, ProvisioningLogEntry};
pub use tenant_connection::{
    ConnectionStatus, CredentialSlot, LastErrorSnapshot, NewTenantConnection, RightsCheckStatus,
    StepLedger, StepName, TenantConnection,
};
