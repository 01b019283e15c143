//! Provisioner configuration.
//!
//! Everything is injected explicitly; nothing in this crate reads the
//! environment. The binary layer assembles this from its own config.

use frostguard_ttn::Region;

/// Hard cap on identifier rotation attempts per entity.
pub const DEFAULT_MAX_ID_ROTATIONS: u32 = 3;

/// Page size for adoption scans of the remote device registry.
pub const DEFAULT_ADOPT_PAGE_LIMIT: u32 = 100;

/// Page cap for adoption scans, bounding the total listing work.
pub const DEFAULT_ADOPT_MAX_PAGES: u32 = 10;

/// Injected configuration shared by the provisioners.
#[derive(Clone)]
pub struct ProvisioningSettings {
    /// Account-level TTN API key. Used through rights verification and
    /// as the gateway registration fallback.
    pub admin_api_key: String,
    /// TTN user id owning created organizations and fallback gateways.
    pub ttn_user_id: String,
    /// Base URL TTN webhooks deliver uplinks to, without trailing slash.
    pub webhook_base_url: String,
    /// Default region for new connections.
    pub default_region: Region,
    /// Frequency plan for devices and gateways.
    pub frequency_plan_id: String,
    /// Whether the sequence mints the optional gateway-capable key.
    pub mint_gateway_key: bool,
    /// Rotation attempt budget.
    pub max_id_rotations: u32,
    /// Adoption scan page size.
    pub adopt_page_limit: u32,
    /// Adoption scan page cap.
    pub adopt_max_pages: u32,
}

impl ProvisioningSettings {
    /// Settings with production defaults for the US radio plan.
    #[must_use]
    pub fn new(admin_api_key: &str, ttn_user_id: &str, webhook_base_url: &str) -> Self {
        Self {
            admin_api_key: admin_api_key.to_string(),
            ttn_user_id: ttn_user_id.to_string(),
            webhook_base_url: webhook_base_url.trim_end_matches('/').to_string(),
            default_region: Region::Nam1,
            frequency_plan_id: "US_902_928_FSB_2".to_string(),
            mint_gateway_key: true,
            max_id_rotations: DEFAULT_MAX_ID_ROTATIONS,
            adopt_page_limit: DEFAULT_ADOPT_PAGE_LIMIT,
            adopt_max_pages: DEFAULT_ADOPT_MAX_PAGES,
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: Region) -> Self {
        self.default_region = region;
        self
    }

    #[must_use]
    pub fn with_gateway_key(mut self, mint: bool) -> Self {
        self.mint_gateway_key = mint;
        self
    }
}

// The admin key never appears in logs.
impl std::fmt::Debug for ProvisioningSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningSettings")
            .field("admin_api_key", &"<redacted>")
            .field("ttn_user_id", &self.ttn_user_id)
            .field("webhook_base_url", &self.webhook_base_url)
            .field("default_region", &self.default_region)
            .field("frequency_plan_id", &self.frequency_plan_id)
            .field("mint_gateway_key", &self.mint_gateway_key)
            .field("max_id_rotations", &self.max_id_rotations)
            .finish_non_exhaustive()
    }
}
