//! HTTP handlers for the provisioning API.

pub mod connection;
pub mod devices;
pub mod gateways;
