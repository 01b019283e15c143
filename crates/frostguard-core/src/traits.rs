//! Multi-Tenant Traits
//!
//! Traits for tenant-scoped entities in FrostGuard.

use crate::ids::TenantId;

/// Trait for entities that belong to a specific tenant.
///
/// Implementing this trait marks an entity as tenant-scoped, enabling
/// compile-time verification that tenant isolation is properly implemented.
///
/// # Example
///
/// ```
/// use frostguard_core::{TenantId, TenantAware};
///
/// struct SensorRecord {
///     tenant_id: TenantId,
///     name: String,
/// }
///
/// impl TenantAware for SensorRecord {
///     fn tenant_id(&self) -> TenantId {
///         self.tenant_id
///     }
/// }
/// ```
pub trait TenantAware {
    /// Returns the tenant ID associated with this entity.
    fn tenant_id(&self) -> TenantId;
}
