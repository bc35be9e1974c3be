// ── Runtime configuration ──
//
// Plain data passed to the controller and preference manager at
// construction. Loading these from disk is `pulsemon-config`'s job.

use serde::{Deserialize, Serialize};

use pulsemon_api::Endpoints;

use crate::error::CoreError;
use crate::theme::ColorMode;

pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_SCHEME: &str = "default";
pub const DEFAULT_STORAGE_KEY: &str = "dashboard-theme-preference";

/// Polling behaviour of the [`PollingDataController`](crate::PollingDataController).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Auto-refresh period. Must be non-zero.
    pub refresh_interval_ms: u64,
    /// Whether the timer is armed at startup and re-armed when the host
    /// comes back online.
    pub auto_refresh: bool,
    pub endpoints: Endpoints,
    /// Number of requests fetched by the initial load. Must be non-zero.
    pub page_size: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            auto_refresh: true,
            endpoints: Endpoints::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl DashboardConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.refresh_interval_ms == 0 {
            return Err(CoreError::validation(
                "refresh_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.page_size == 0 {
            return Err(CoreError::validation("page_size", "must be greater than zero"));
        }
        for (field, path) in [
            ("endpoints.stats", &self.endpoints.stats),
            ("endpoints.requests", &self.endpoints.requests),
            ("endpoints.analytics", &self.endpoints.analytics),
        ] {
            if path.trim().is_empty() {
                return Err(CoreError::validation(field, "must not be empty"));
            }
        }
        Ok(())
    }

    /// Shallow merge: every field set in `patch` replaces the current one.
    pub fn merged(&self, patch: DashboardConfigPatch) -> Self {
        Self {
            refresh_interval_ms: patch.refresh_interval_ms.unwrap_or(self.refresh_interval_ms),
            auto_refresh: patch.auto_refresh.unwrap_or(self.auto_refresh),
            endpoints: patch.endpoints.unwrap_or_else(|| self.endpoints.clone()),
            page_size: patch.page_size.unwrap_or(self.page_size),
        }
    }
}

/// Partial update for [`DashboardConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfigPatch {
    pub refresh_interval_ms: Option<u64>,
    pub auto_refresh: Option<bool>,
    pub endpoints: Option<Endpoints>,
    pub page_size: Option<u32>,
}

/// Construction options for the [`PreferenceManager`](crate::PreferenceManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceOptions {
    pub default_mode: ColorMode,
    pub default_scheme: String,
    /// Follow the host's light/dark signal until the user picks a mode.
    pub respect_system_preference: bool,
    /// Slot name in the [`PreferenceStore`](crate::PreferenceStore).
    pub storage_key: String,
}

impl Default for PreferenceOptions {
    fn default() -> Self {
        Self {
            default_mode: ColorMode::Light,
            default_scheme: DEFAULT_SCHEME.into(),
            respect_system_preference: true,
            storage_key: DEFAULT_STORAGE_KEY.into(),
        }
    }
}
