//! Cluster configuration for the TTN client.
//!
//! The identity server is global and lives on EU1 regardless of where a
//! tenant's radio traffic terminates; the join/network/application/gateway
//! servers are addressed per region.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

/// Host of the global identity server.
const IDENTITY_BASE_URL: &str = "https://eu1.cloud.thethings.network";

/// Default timeout for a single remote call.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// TTN cluster region hosting a tenant's radio plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// Europe (also hosts the identity server).
    Eu1,
    /// North America.
    Nam1,
    /// Australia.
    Au1,
}

impl Region {
    /// Base URL of the regional cluster.
    #[must_use]
    pub fn regional_base_url(&self) -> &'static str {
        match self {
            Region::Eu1 => "https://eu1.cloud.thethings.network",
            Region::Nam1 => "https://nam1.cloud.thethings.network",
            Region::Au1 => "https://au1.cloud.thethings.network",
        }
    }

    /// Host name the identity-plane gateway record must point at so radio
    /// traffic lands on this region.
    #[must_use]
    pub fn gateway_server_address(&self) -> &'static str {
        match self {
            Region::Eu1 => "eu1.cloud.thethings.network",
            Region::Nam1 => "nam1.cloud.thethings.network",
            Region::Au1 => "au1.cloud.thethings.network",
        }
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Eu1 => write!(f, "eu1"),
            Region::Nam1 => write!(f, "nam1"),
            Region::Au1 => write!(f, "au1"),
        }
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eu1" => Ok(Region::Eu1),
            "nam1" => Ok(Region::Nam1),
            "au1" => Ok(Region::Au1),
            other => Err(format!("unknown TTN region: {other}")),
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Region::Nam1
    }
}

/// Connection settings for one tenant's cluster pair.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Identity-plane base URL (global registry).
    pub identity_base_url: String,
    /// Radio-plane base URL (regional cluster).
    pub regional_base_url: String,
    /// Region selector persisted on the tenant connection.
    pub region: Region,
    /// Timeout applied to every remote call.
    pub timeout: Duration,
}

impl ClusterConfig {
    /// Standard configuration for a production region.
    #[must_use]
    pub fn for_region(region: Region) -> Self {
        Self {
            identity_base_url: IDENTITY_BASE_URL.to_string(),
            regional_base_url: region.regional_base_url().to_string(),
            region,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override both base URLs. Used by tests pointing at a mock server.
    #[must_use]
    pub fn with_base_urls(mut self, identity: &str, regional: &str) -> Self {
        self.identity_base_url = identity.trim_end_matches('/').to_string();
        self.regional_base_url = regional.trim_end_matches('/').to_string();
        self
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
