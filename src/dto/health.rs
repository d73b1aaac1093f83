use serde::Serialize;
use utoipa::ToSchema;

use crate::services::network_monitor::NetworkQuality;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Last measured link quality to the datastore, once measured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkQuality>,
}

impl HealthResponse {
    /// Create a health response indicating the datastore is reachable.
    pub fn ok(network: Option<NetworkQuality>) -> Self {
        Self {
            status: "ok".to_string(),
            network,
        }
    }

    /// Create a health response indicating the device is in degraded mode.
    pub fn degraded(network: Option<NetworkQuality>) -> Self {
        Self {
            status: "degraded".to_string(),
            network,
        }
    }
}
