//! The Things Network v3 API client.
//!
//! FrostGuard provisions per-tenant resources (organization, application,
//! API keys, webhook, end devices, gateways) against The Things Network.
//! The network is split across independently-replicated planes:
//!
//! - the **identity server** (global, EU1) is the registry of record for
//!   organizations, applications, devices and gateways;
//! - the **join/network/application servers** live on the tenant's regional
//!   cluster and each hold their own copy of a device;
//! - the **gateway server** on the regional cluster terminates radio
//!   traffic, pointed at by `gateway_server_address` on the identity record.
//!
//! Every operation takes the bearer token explicitly: the orchestrator
//! switches between the account-level credential and keys minted during the
//! same run, and that sequencing must stay visible at the call site.
//!
//! Capability traits ([`OrganizationOps`], [`ApplicationOps`],
//! [`WebhookOps`], [`EndDeviceOps`], [`GatewayOps`], [`AuthInfoOps`]) are
//! the seams the provisioners are generic over; [`TtnClient`] implements
//! all of them over HTTP.

pub mod client;
pub mod config;
pub mod error;
pub mod rights;
pub mod traits;
pub mod types;

pub use client::TtnClient;
pub use config::{ClusterConfig, Region};
pub use error::{RemoteErrorDetail, TtnError, TtnResult};
pub use rights::{Capabilities, KeyScope, RightsCheck};
pub use traits::{
    ApplicationOps, AuthInfoOps, EndDeviceOps, GatewayOps, OrganizationOps, TtnApi, WebhookOps,
};
