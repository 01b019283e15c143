//! Strongly Typed Identifiers
//!
//! Type-safe identifier types for FrostGuard records. Using the newtype
//! pattern, these types prevent accidental misuse of different ID types at
//! compile time.
//!
//! # Example
//!
//! ```
//! use frostguard_core::{TenantId, DeviceId};
//!
//! let tenant = TenantId::new();
//! let device = DeviceId::new();
//!
//! fn requires_tenant(id: TenantId) -> String {
//!     id.to_string()
//! }
//!
//! let result = requires_tenant(tenant);
//! // requires_tenant(device); // This would not compile!
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The underlying UUID parse error message
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the underlying UUID by value.
            #[must_use]
            pub fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_id!(
    /// Strongly typed identifier for tenants.
    ///
    /// Identifies a FrostGuard customer organization. Every provisioning
    /// operation is scoped to exactly one tenant.
    TenantId
);

define_id!(
    /// Strongly typed identifier for sensor device records.
    ///
    /// Identifies the FrostGuard-side device row, not the remote
    /// network-operator device identity (which is a derived string id).
    DeviceId
);

define_id!(
    /// Strongly typed identifier for gateway records.
    GatewayId
);
