//! FrostGuard Core Library
//!
//! Shared types and traits for the FrostGuard control plane.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (`TenantId`, `DeviceId`, `GatewayId`)
//! - [`eui`] - LoRaWAN hardware identifiers (`DevEui`, `JoinEui`, `GatewayEui`)
//! - [`traits`] - Multi-tenant traits (`TenantAware`)
//!
//! # Example
//!
//! ```
//! use frostguard_core::{TenantId, DevEui, TenantAware};
//!
//! let tenant_id = TenantId::new();
//! let eui: DevEui = "00800000A00009EF".parse().unwrap();
//! assert_eq!(eui.as_str(), "00800000A00009EF");
//! ```

pub mod eui;
pub mod ids;
pub mod traits;

pub use eui::{DevEui, EuiError, GatewayEui, JoinEui};
pub use ids::{DeviceId, GatewayId, ParseIdError, TenantId};
pub use traits::TenantAware;
