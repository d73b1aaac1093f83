use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report the degraded flag, logging a failing datastore along the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let network = state.network().await.map(|report| report.quality);
    if state.is_degraded() {
        HealthResponse::degraded(network)
    } else {
        HealthResponse::ok(network)
    }
}
