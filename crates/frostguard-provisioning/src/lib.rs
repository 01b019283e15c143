//! Provisioning orchestration for FrostGuard tenant resources on TTN.
//!
//! Three provisioners share one discipline: every remote side effect is
//! guarded by the persisted step ledger, artifacts are written to
//! storage before their completion flags flip, and any step can be
//! re-run safely after a crash or a lost response.
//!
//! - [`ConnectionOrchestrator`] drives the org/application sequence,
//!   including identifier-collision rotation and the two-credential
//!   delegation handoff.
//! - [`DeviceProvisioner`] keeps one device identity consistent across
//!   the four remote device planes, and can diagnose or adopt devices
//!   it did not create.
//! - [`GatewayProvisioner`] registers gateways by walking a credential
//!   strategy ladder, since TTN routes gateway writes differently per
//!   credential scope.

pub mod device;
pub mod error;
pub mod gateway;
pub mod naming;
pub mod orchestrator;
pub mod outcome;
pub mod settings;

pub use device::DeviceProvisioner;
pub use error::{ProvisionError, ProvisionResult};
pub use gateway::GatewayProvisioner;
pub use orchestrator::ConnectionOrchestrator;
pub use outcome::{
    AdoptOutcome, CredentialSummary, DeviceClassification, DeviceReport, DiagnoseReport,
    GatewayReport, PlaneReport, ProvisionOutcome, StatusReport, StepReport,
};
pub use settings::ProvisioningSettings;
